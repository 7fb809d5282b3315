#[cfg(test)]
#[path = "session_gate_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;

use crate::domain::models::IdentityBox;
use crate::domain::models::Session;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Authenticated(Session),
    NotAuthenticated,
}

/// One-shot authentication check made when a view or command starts.
pub struct SessionGate {
    identity: IdentityBox,
}

impl SessionGate {
    pub fn new(identity: IdentityBox) -> SessionGate {
        return SessionGate { identity };
    }

    pub async fn resolve_session(&self) -> GateOutcome {
        return match self.identity.get_session().await {
            Ok(Some(session)) => {
                tracing::debug!(user_id = session.user_id, "Session resolved");
                GateOutcome::Authenticated(session)
            }
            Ok(None) => GateOutcome::NotAuthenticated,
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to resolve session");
                GateOutcome::NotAuthenticated
            }
        };
    }

    pub async fn require(&self) -> Result<Session> {
        return match self.resolve_session().await {
            GateOutcome::Authenticated(session) => Ok(session),
            GateOutcome::NotAuthenticated => {
                bail!("Not signed in. Run `lumis login` first.")
            }
        };
    }
}
