use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::IngestionStatus;
use super::Risk;

/// The digital-twin API: ingestion jobs, their status feed, the chat
/// assistant and the risk monitor.
#[async_trait]
pub trait Backend {
    /// Used at startup to verify the API is reachable.
    async fn health_check(&self) -> Result<()>;

    /// Registers a repository for ingestion and returns the id of the
    /// project the backend created for it.
    async fn start_ingest(&self, user_id: &str, repo_url: &str) -> Result<String>;

    /// Fetches the current job status for a project. Errors when no job is
    /// known for it.
    async fn ingest_status(&self, project_id: &str) -> Result<IngestionStatus>;

    /// Asks the assistant a question grounded on the project.
    async fn chat(&self, project_id: &str, query: &str) -> Result<String>;

    async fn risks(&self, project_id: &str) -> Result<Vec<Risk>>;
}

pub type BackendBox = Arc<dyn Backend + Send + Sync>;
