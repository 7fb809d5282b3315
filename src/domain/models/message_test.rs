use super::ChatMessage;
use super::Role;
use super::PLACEHOLDER_TEXT;

#[test]
fn it_executes_new() {
    let msg = ChatMessage::new(Role::User, "How does auth flow work?");
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.role.to_string(), "user");
    assert_eq!(msg.content, "How does auth flow work?".to_string());
    assert!(!msg.is_placeholder());
}

#[test]
fn it_executes_new_replacing_tabs() {
    let msg = ChatMessage::new(Role::Assistant, "\t\tIt uses token X.");
    assert_eq!(msg.content, "    It uses token X.".to_string());
}

#[test]
fn it_builds_placeholders() {
    let msg = ChatMessage::placeholder();
    assert_eq!(msg.role, Role::Assistant);
    assert_eq!(msg.content, PLACEHOLDER_TEXT);
    assert!(msg.is_placeholder());
}

#[test]
fn it_wraps_lines() {
    let msg = ChatMessage::new(
        Role::Assistant,
        "The session token is refreshed by the gateway\n\nthen cached",
    );

    assert_eq!(
        msg.as_string_lines(20),
        vec![
            "The session token".to_string(),
            "is refreshed by the".to_string(),
            "gateway".to_string(),
            " ".to_string(),
            "then cached".to_string(),
        ]
    );
}

#[test]
fn it_keeps_long_words_on_their_own_line() {
    let msg = ChatMessage::new(Role::Assistant, "see src/domain/services/chat_session.rs");
    assert_eq!(
        msg.as_string_lines(10),
        vec!["see".to_string(), "src/domain/services/chat_session.rs".to_string()]
    );
}
