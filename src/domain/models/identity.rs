use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::Profile;
use super::Project;
use super::Session;

/// Contract of the external identity provider.
#[async_trait]
pub trait IdentityProvider {
    /// Returns the persisted session when one exists and is still valid,
    /// refreshing it first when the provider supports that.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Trades the persisted refresh token for a new session, even when the
    /// current one has not reached its expiry. None when there is nothing to
    /// refresh.
    async fn refresh_session(&self) -> Result<Option<Session>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Creates an account and its profile row. Providers requiring email
    /// confirmation return no session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &Profile,
    ) -> Result<Option<Session>>;

    async fn sign_out(&self) -> Result<()>;
}

/// Read access to the `projects` table.
#[async_trait]
pub trait ProjectRepository {
    async fn project_for_user(&self, user_id: &str) -> Result<Option<Project>>;
}

pub type IdentityBox = Arc<dyn IdentityProvider + Send + Sync>;
pub type ProjectRepositoryBox = Arc<dyn ProjectRepository + Send + Sync>;
