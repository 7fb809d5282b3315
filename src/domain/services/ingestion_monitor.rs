#[cfg(test)]
#[path = "ingestion_monitor_test.rs"]
mod tests;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;

use super::lock;
use super::PollingSubscription;
use crate::domain::models::BackendBox;
use crate::domain::models::Event;
use crate::domain::models::IngestionStatus;
use crate::domain::models::StatusClass;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MonitorState {
    #[default]
    Idle,
    Watching(String),
    Completed(String),
    Failed {
        project_id: String,
        error: Option<String>,
    },
}

impl MonitorState {
    fn is_watching(&self, project_id: &str) -> bool {
        return matches!(self, MonitorState::Watching(id) if id == project_id);
    }
}

struct MonitorInner {
    state: MonitorState,
    status: Option<IngestionStatus>,
    // Bumped on every attach and detach. Poll results carrying an older
    // generation belong to a superseded watch and are dropped.
    generation: u64,
    subscription: Option<PollingSubscription>,
}

/// Follows one ingestion job at a time until it reaches a terminal status.
///
/// Progress, completion and failure are published as [`Event`]s to the
/// owner. The monitor never refreshes anything itself; on completion the
/// owner decides what to reload.
#[derive(Clone)]
pub struct IngestionMonitor {
    backend: BackendBox,
    interval: Duration,
    tx: mpsc::UnboundedSender<Event>,
    inner: Arc<Mutex<MonitorInner>>,
}

impl IngestionMonitor {
    pub fn new(
        backend: BackendBox,
        interval: Duration,
        tx: mpsc::UnboundedSender<Event>,
    ) -> IngestionMonitor {
        return IngestionMonitor {
            backend,
            interval,
            tx,
            inner: Arc::new(Mutex::new(MonitorInner {
                state: MonitorState::Idle,
                status: None,
                generation: 0,
                subscription: None,
            })),
        };
    }

    pub fn state(&self) -> MonitorState {
        return lock(&self.inner).state.clone();
    }

    pub fn status(&self) -> Option<IngestionStatus> {
        return lock(&self.inner).status.clone();
    }

    pub fn is_watching(&self) -> bool {
        return matches!(lock(&self.inner).state, MonitorState::Watching(_));
    }

    /// Starts watching `project_id`, replacing any other watch. Returns
    /// false when that project is already being watched, so concurrent
    /// callers share a single polling loop.
    pub fn attach(&self, project_id: &str) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state.is_watching(project_id) {
            tracing::debug!(project_id, "Already watching ingestion");
            return false;
        }

        if let Some(previous) = inner.subscription.take() {
            previous.cancel();
        }

        inner.generation += 1;
        inner.state = MonitorState::Watching(project_id.to_string());
        inner.status = None;

        let generation = inner.generation;
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let weak_inner = Arc::downgrade(&self.inner);
        let watched_id = project_id.to_string();

        inner.subscription = Some(PollingSubscription::start(
            "ingestion-monitor",
            self.interval,
            move || {
                let backend = backend.clone();
                let tx = tx.clone();
                let weak_inner = weak_inner.clone();
                let watched_id = watched_id.clone();
                return async move {
                    return poll_once(backend, weak_inner, tx, generation, watched_id).await;
                };
            },
        ));

        tracing::info!(project_id, generation, "Watching ingestion");
        return true;
    }

    /// Stops polling and forgets the current watch.
    pub fn detach(&self) {
        let mut inner = lock(&self.inner);
        if let Some(subscription) = inner.subscription.take() {
            subscription.cancel();
        }

        inner.generation += 1;
        inner.state = MonitorState::Idle;
        inner.status = None;
    }
}

async fn poll_once(
    backend: BackendBox,
    weak_inner: Weak<Mutex<MonitorInner>>,
    tx: mpsc::UnboundedSender<Event>,
    generation: u64,
    project_id: String,
) -> ControlFlow<()> {
    let res = backend.ingest_status(&project_id).await;

    // The subscription only holds a weak handle, dropping the last monitor
    // clone tears the watch down.
    let inner = match weak_inner.upgrade() {
        Some(inner) => inner,
        None => return ControlFlow::Break(()),
    };
    let mut inner = lock(&inner);

    if inner.generation != generation || !inner.state.is_watching(&project_id) {
        tracing::debug!(project_id, generation, "Discarding stale ingestion status");
        return ControlFlow::Break(());
    }

    let status = match res {
        Ok(status) => status,
        Err(err) => {
            tracing::warn!(error = ?err, project_id, "Ingestion status poll failed, retrying");
            return ControlFlow::Continue(());
        }
    };

    tracing::debug!(project_id, status = ?status, "Ingestion status");
    let class = status.class();
    inner.status = Some(status.clone());

    let mut events = vec![Event::IngestionProgress(status.clone())];
    let flow = match class {
        StatusClass::Active => ControlFlow::Continue(()),
        StatusClass::Succeeded => {
            inner.state = MonitorState::Completed(project_id.clone());
            events.push(Event::IngestionCompleted(project_id.clone()));
            tracing::info!(project_id, "Ingestion completed");
            ControlFlow::Break(())
        }
        StatusClass::Failed => {
            inner.state = MonitorState::Failed {
                project_id: project_id.clone(),
                error: status.error.clone(),
            };
            events.push(Event::IngestionFailed(
                project_id.clone(),
                status.error.clone(),
            ));
            tracing::error!(project_id, error = ?status.error, "Ingestion failed");
            ControlFlow::Break(())
        }
    };

    drop(inner);

    for event in events {
        if tx.send(event).is_err() {
            tracing::debug!(project_id, "Monitor owner is gone, stopping");
            return ControlFlow::Break(());
        }
    }

    return flow;
}
