#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;

use std::path;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::fs;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::IdentityBox;
use crate::domain::models::IdentityProvider;
use crate::domain::models::Profile;
use crate::domain::models::Project;
use crate::domain::models::ProjectRepository;
use crate::domain::models::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct AuthResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: AuthUser,
}

impl AuthResponse {
    fn into_session(self) -> Session {
        let expires_at = self.expires_at.or_else(|| {
            return self
                .expires_in
                .map(|expires_in| return chrono::Utc::now().timestamp() + expires_in);
        });

        return Session {
            user_id: self.user.id,
            email: self.user.email,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        };
    }
}

/// Sign up answers with a full session when email confirmation is off, and
/// with just the new user otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(AuthResponse),
    User(AuthUser),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthError {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

async fn ensure_success(res: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), body, action, "Supabase request failed");

    let err = serde_json::from_str::<AuthError>(&body).unwrap_or_default();
    if let Some(message) = err.error_description.or(err.msg).or(err.message) {
        bail!(format!("{action} failed: {message}"));
    }

    bail!(format!("{action} failed ({status})"))
}

fn supabase_settings() -> Result<(String, String)> {
    let url = Config::get(ConfigKey::SupabaseURL);
    let anon_key = Config::get(ConfigKey::SupabaseAnonKey);
    if url.is_empty() || anon_key.is_empty() {
        bail!("supabase-url and supabase-anon-key must be set. Run `lumis config create` to write a config file.");
    }

    return Ok((url.trim_end_matches('/').to_string(), anon_key));
}

/// Supabase GoTrue auth, with the session cached in a local JSON file.
pub struct SupabaseIdentity {
    url: String,
    anon_key: String,
    session_file: path::PathBuf,
    client: reqwest::Client,
}

impl SupabaseIdentity {
    pub fn new(
        url: &str,
        anon_key: &str,
        session_file: path::PathBuf,
        timeout: Duration,
    ) -> Result<SupabaseIdentity> {
        return Ok(SupabaseIdentity {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session_file,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        });
    }

    pub fn from_config() -> Result<SupabaseIdentity> {
        let (url, anon_key) = supabase_settings()?;
        return SupabaseIdentity::new(
            &url,
            &anon_key,
            path::PathBuf::from(Config::get(ConfigKey::SessionFile)),
            Config::get_duration(ConfigKey::RequestTimeout)?,
        );
    }

    async fn read_session(&self) -> Result<Option<Session>> {
        if !self.session_file.exists() {
            return Ok(None);
        }

        let json_str = fs::read_to_string(&self.session_file).await?;
        let session = serde_json::from_str::<Session>(&json_str)?;

        return Ok(Some(session));
    }

    async fn write_session(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&self.session_file, serde_json::to_string_pretty(session)?).await?;
        return Ok(());
    }

    async fn token_grant<T: Serialize + ?Sized>(&self, grant_type: &str, body: &T) -> Result<Session> {
        let res = self
            .client
            .post(format!("{url}/auth/v1/token", url = self.url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;

        let session = ensure_success(res, "Sign in")
            .await?
            .json::<AuthResponse>()
            .await?
            .into_session();

        self.write_session(&session).await?;
        return Ok(session);
    }

    async fn insert_profile(&self, profile: &Profile, bearer: &str) -> Result<()> {
        let res = self
            .client
            .post(format!("{url}/rest/v1/profiles", url = self.url))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .json(profile)
            .send()
            .await?;

        ensure_success(res, "Profile creation").await?;
        return Ok(());
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    #[allow(clippy::implicit_return)]
    async fn get_session(&self) -> Result<Option<Session>> {
        let session = match self.read_session().await? {
            Some(session) => session,
            None => return Ok(None),
        };

        if !session.is_expired(chrono::Utc::now().timestamp()) {
            return Ok(Some(session));
        }

        tracing::debug!(user_id = session.user_id, "Session expired");
        return self.refresh_session().await;
    }

    #[allow(clippy::implicit_return)]
    async fn refresh_session(&self) -> Result<Option<Session>> {
        let session = match self.read_session().await? {
            Some(session) => session,
            None => return Ok(None),
        };

        let refresh_token = match &session.refresh_token {
            Some(refresh_token) => refresh_token.to_string(),
            None => {
                tracing::debug!(user_id = session.user_id, "No refresh token for session");
                return Ok(None);
            }
        };

        tracing::debug!(user_id = session.user_id, "Refreshing session");
        let refreshed = self
            .token_grant(
                "refresh_token",
                &RefreshGrant {
                    refresh_token: &refresh_token,
                },
            )
            .await?;

        return Ok(Some(refreshed));
    }

    #[allow(clippy::implicit_return)]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .token_grant("password", &PasswordGrant { email, password })
            .await?;

        tracing::info!(user_id = session.user_id, "Signed in");
        return Ok(session);
    }

    #[allow(clippy::implicit_return)]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &Profile,
    ) -> Result<Option<Session>> {
        let res = self
            .client
            .post(format!("{url}/auth/v1/signup", url = self.url))
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let res = ensure_success(res, "Sign up")
            .await?
            .json::<SignUpResponse>()
            .await?;

        let (user_id, session) = match res {
            SignUpResponse::Session(auth) => {
                let session = auth.into_session();
                self.write_session(&session).await?;
                (session.user_id.to_string(), Some(session))
            }
            SignUpResponse::User(user) => (user.id, None),
        };

        let profile = Profile {
            id: user_id,
            ..profile.clone()
        };
        let bearer = match &session {
            Some(session) => session.access_token.to_string(),
            None => self.anon_key.to_string(),
        };

        // The account exists at this point, a missing profile row is not
        // worth failing sign up over.
        if let Err(err) = self.insert_profile(&profile, &bearer).await {
            tracing::warn!(error = ?err, user_id = profile.id, "Failed to create profile");
        }

        return Ok(session);
    }

    #[allow(clippy::implicit_return)]
    async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.read_session().await.unwrap_or(None) {
            let res = self
                .client
                .post(format!("{url}/auth/v1/logout", url = self.url))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await;

            if let Err(err) = res {
                tracing::warn!(error = ?err, "Remote sign out failed");
            }
        }

        if self.session_file.exists() {
            fs::remove_file(&self.session_file).await?;
        }

        return Ok(());
    }
}

/// Reads the `projects` table through Supabase's REST interface as the
/// signed in user. The bearer token is taken from the identity provider on
/// every request, so refreshed sessions are picked up.
pub struct SupabaseProjects {
    url: String,
    anon_key: String,
    identity: IdentityBox,
    client: reqwest::Client,
}

impl SupabaseProjects {
    pub fn new(
        url: &str,
        anon_key: &str,
        identity: IdentityBox,
        timeout: Duration,
    ) -> Result<SupabaseProjects> {
        return Ok(SupabaseProjects {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            identity,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        });
    }

    pub fn from_config(identity: IdentityBox) -> Result<SupabaseProjects> {
        let (url, anon_key) = supabase_settings()?;
        return SupabaseProjects::new(
            &url,
            &anon_key,
            identity,
            Config::get_duration(ConfigKey::RequestTimeout)?,
        );
    }

    async fn query(&self, user_id: &str, access_token: &str) -> Result<reqwest::Response> {
        let res = self
            .client
            .get(format!("{url}/rest/v1/projects", url = self.url))
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{user_id}"))])
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        return Ok(res);
    }
}

#[async_trait]
impl ProjectRepository for SupabaseProjects {
    #[allow(clippy::implicit_return)]
    async fn project_for_user(&self, user_id: &str) -> Result<Option<Project>> {
        let session = match self.identity.get_session().await? {
            Some(session) => session,
            None => bail!("Not signed in. Run `lumis login` first."),
        };

        let mut res = self.query(user_id, &session.access_token).await?;
        if res.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::debug!(user_id, "Project lookup unauthorized, refreshing session");
            if let Some(refreshed) = self.identity.refresh_session().await? {
                res = self.query(user_id, &refreshed.access_token).await?;
            }
        }

        let projects = ensure_success(res, "Project lookup")
            .await?
            .json::<Vec<Project>>()
            .await?;

        return Ok(projects.into_iter().next());
    }
}
