#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Dashboard;
use crate::domain::models::Action;
use crate::domain::models::Event;

pub struct ActionsService {}

impl ActionsService {
    /// Runs actions requested by the view against the dashboard until the
    /// view hangs up.
    pub async fn start(
        dashboard: Arc<Dashboard>,
        tx: mpsc::UnboundedSender<Event>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
    ) -> Result<()> {
        // Lazy default.
        let mut ingest_worker: JoinHandle<()> = tokio::spawn(async {});

        while let Some(action) = rx.recv().await {
            match action {
                Action::ChatAbort() => {
                    dashboard.abort_chat();
                }
                Action::ChatRequest(query) => {
                    dashboard.spawn_chat(&query);
                }
                Action::ChatReset() => {
                    dashboard.reset_chat();
                }
                Action::IngestionDismiss() => {
                    dashboard.dismiss_ingestion();
                }
                Action::IngestRequest(repo_url) => {
                    if !ingest_worker.is_finished() {
                        tracing::debug!(repo_url, "Ingest request already running, ignoring");
                        continue;
                    }

                    let worker_dashboard = dashboard.clone();
                    let worker_tx = tx.clone();
                    ingest_worker = tokio::spawn(async move {
                        if let Err(err) = worker_dashboard.ingest(&repo_url).await {
                            tracing::error!(error = ?err, repo_url, "Ingest request failed");
                            let _ = worker_tx.send(Event::IngestRequestFailed(err.to_string()));
                        }
                    });
                }
            }

            tx.send(Event::UITick())?;
        }

        ingest_worker.abort();
        return Ok(());
    }
}
