#[cfg(test)]
#[path = "sync_watcher_test.rs"]
mod tests;

use std::ops::ControlFlow;
use std::time::Duration;

use super::IngestionMonitor;
use super::PollingSubscription;
use super::ProjectStore;
use crate::domain::models::BackendBox;
use crate::domain::models::StatusClass;

/// Notices ingestion jobs started outside this client, such as a re-sync
/// triggered by a push webhook, and hands them to the monitor.
pub struct SyncWatcher {
    subscription: PollingSubscription,
}

impl SyncWatcher {
    pub fn start(
        backend: BackendBox,
        store: ProjectStore,
        monitor: IngestionMonitor,
        interval: Duration,
    ) -> SyncWatcher {
        let subscription = PollingSubscription::start("sync-watcher", interval, move || {
            let backend = backend.clone();
            let store = store.clone();
            let monitor = monitor.clone();
            return async move {
                check_once(&backend, &store, &monitor).await;
                return ControlFlow::Continue(());
            };
        });

        return SyncWatcher { subscription };
    }

    pub fn is_active(&self) -> bool {
        return self.subscription.is_active();
    }

    pub fn stop(&self) {
        self.subscription.cancel();
    }
}

async fn check_once(backend: &BackendBox, store: &ProjectStore, monitor: &IngestionMonitor) {
    let project = match store.current() {
        Some(project) => project,
        None => return,
    };

    if monitor.is_watching() {
        return;
    }

    match backend.ingest_status(&project.id).await {
        Ok(status) => {
            if status.class() == StatusClass::Active {
                tracing::info!(
                    project_id = project.id,
                    status = status.status,
                    "Detected running ingestion"
                );
                monitor.attach(&project.id);
            }
        }
        Err(err) => {
            tracing::debug!(error = ?err, project_id = project.id, "Sync status check failed");
        }
    }
}
