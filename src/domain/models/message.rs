#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

pub const PLACEHOLDER_TEXT: &str = "Exploring codebase...";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    placeholder: bool,
}

impl ChatMessage {
    pub fn new(role: Role, text: &str) -> ChatMessage {
        return ChatMessage {
            role,
            content: text.to_string().replace('\t', "  "),
            placeholder: false,
        };
    }

    /// The "thinking" bubble shown while the assistant is answering.
    pub fn placeholder() -> ChatMessage {
        return ChatMessage {
            role: Role::Assistant,
            content: PLACEHOLDER_TEXT.to_string(),
            placeholder: true,
        };
    }

    pub fn is_placeholder(&self) -> bool {
        return self.placeholder;
    }

    pub fn as_string_lines(&self, line_max_width: usize) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();

        for full_line in self.content.split('\n') {
            if full_line.trim().is_empty() {
                lines.push(" ".to_string());
                continue;
            }

            let mut char_count = 0;
            let mut current_lines: Vec<&str> = vec![];

            for word in full_line.split(' ') {
                if word.len() + char_count + 1 > line_max_width && !current_lines.is_empty() {
                    lines.push(current_lines.join(" ").trim_end().to_string());
                    current_lines = vec![word];
                    char_count = word.len() + 1;
                } else {
                    current_lines.push(word);
                    char_count += word.len() + 1;
                }
            }
            if !current_lines.is_empty() {
                lines.push(current_lines.join(" ").trim_end().to_string());
            }
        }

        return lines;
    }
}
