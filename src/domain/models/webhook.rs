#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;

use std::fmt;

/// Address a GitHub push hook posts to for a user's project. Derived on
/// demand, never stored apart from its two identifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookUrl {
    base: String,
    user_id: String,
    project_id: String,
}

impl WebhookUrl {
    pub fn new(base: &str, user_id: &str, project_id: &str) -> WebhookUrl {
        return WebhookUrl {
            base: base.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
        };
    }
}

impl fmt::Display for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(
            f,
            "{}/api/webhook/{}/{}",
            self.base, self.user_id, self.project_id
        );
    }
}
