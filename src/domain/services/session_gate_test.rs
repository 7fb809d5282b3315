use std::sync::Arc;

use super::GateOutcome;
use super::SessionGate;
use crate::domain::fakes::session;
use crate::domain::fakes::FakeIdentity;

#[tokio::test]
async fn it_authenticates_with_a_stored_session() {
    let gate = SessionGate::new(Arc::new(FakeIdentity::new(Ok(Some(session())))));

    assert_eq!(gate.resolve_session().await, GateOutcome::Authenticated(session()));
    assert_eq!(gate.require().await.unwrap().user_id, "user-1");
}

#[tokio::test]
async fn it_rejects_a_missing_session() {
    let gate = SessionGate::new(Arc::new(FakeIdentity::new(Ok(None))));

    assert_eq!(gate.resolve_session().await, GateOutcome::NotAuthenticated);

    let err = gate.require().await.unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Not signed in. Run `lumis login` first.");
}

#[tokio::test]
async fn it_treats_provider_errors_as_signed_out() {
    let gate = SessionGate::new(Arc::new(FakeIdentity::new(Err(
        "refresh token revoked".to_string()
    ))));

    assert_eq!(gate.resolve_session().await, GateOutcome::NotAuthenticated);
}
