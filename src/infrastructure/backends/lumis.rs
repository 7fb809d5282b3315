#[cfg(test)]
#[path = "lumis_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::string_or_number;
use crate::domain::models::Backend;
use crate::domain::models::IngestionStatus;
use crate::domain::models::Risk;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct IngestRequest<'a> {
    user_id: &'a str,
    repo_url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct IngestResponse {
    #[serde(deserialize_with = "string_or_number")]
    project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ChatRequest<'a> {
    project_id: &'a str,
    query: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct RisksResponse {
    status: String,
    #[serde(default)]
    risks: Vec<Risk>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    detail: serde_json::Value,
}

/// Turns a non-2xx response into an error carrying the server's `detail`.
async fn ensure_success(res: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), body, action, "Lumis request failed");

    if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
        if let Some(detail) = err.detail.as_str() {
            bail!(detail.to_string());
        }
        bail!(format!("{action} failed ({status}): {}", err.detail));
    }

    bail!(format!("{action} failed ({status})"))
}

/// HTTP client for the Lumis analysis server.
pub struct LumisBackend {
    url: String,
    client: reqwest::Client,
}

impl LumisBackend {
    pub fn new(url: &str, timeout: Duration) -> Result<LumisBackend> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        return Ok(LumisBackend {
            url: url.trim_end_matches('/').to_string(),
            client,
        });
    }

    pub fn from_config() -> Result<LumisBackend> {
        return LumisBackend::new(
            &Config::get(ConfigKey::ApiURL),
            Config::get_duration(ConfigKey::RequestTimeout)?,
        );
    }
}

#[async_trait]
impl Backend for LumisBackend {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        let res = self.client.get(&self.url).send().await;

        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = ?err, url = self.url, "Lumis server is not reachable");
                bail!(format!("Lumis server at {} is not reachable", self.url));
            }
        };

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Lumis health check failed");
            bail!(format!(
                "Lumis health check failed with status {}",
                res.status()
            ));
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn start_ingest(&self, user_id: &str, repo_url: &str) -> Result<String> {
        let req = IngestRequest { user_id, repo_url };
        tracing::debug!(request = ?req, "Starting ingestion");

        let res = self
            .client
            .post(format!("{url}/api/ingest", url = self.url))
            .json(&req)
            .send()
            .await?;

        let res = ensure_success(res, "Ingest")
            .await?
            .json::<IngestResponse>()
            .await?;

        return Ok(res.project_id);
    }

    #[allow(clippy::implicit_return)]
    async fn ingest_status(&self, project_id: &str) -> Result<IngestionStatus> {
        let res = self
            .client
            .get(format!(
                "{url}/api/ingest/status/{project_id}",
                url = self.url
            ))
            .send()
            .await?;

        if res.status() == reqwest::StatusCode::NOT_FOUND {
            bail!(format!("No ingestion job known for project {project_id}"));
        }

        let status = ensure_success(res, "Ingestion status")
            .await?
            .json::<IngestionStatus>()
            .await?;

        return Ok(status);
    }

    #[allow(clippy::implicit_return)]
    async fn chat(&self, project_id: &str, query: &str) -> Result<String> {
        let req = ChatRequest { project_id, query };
        tracing::debug!(request = ?req, "Sending chat");

        let res = self
            .client
            .post(format!("{url}/api/chat", url = self.url))
            .json(&req)
            .send()
            .await?;

        let res = ensure_success(res, "Chat")
            .await?
            .json::<ChatResponse>()
            .await?;

        return Ok(res.response);
    }

    #[allow(clippy::implicit_return)]
    async fn risks(&self, project_id: &str) -> Result<Vec<Risk>> {
        let res = self
            .client
            .get(format!("{url}/api/risks/{project_id}", url = self.url))
            .send()
            .await?;

        let res = ensure_success(res, "Risks")
            .await?
            .json::<RisksResponse>()
            .await?;

        if res.status != "success" {
            tracing::warn!(project_id, status = res.status, "Risk lookup was not successful");
            return Ok(vec![]);
        }

        return Ok(res.risks);
    }
}
