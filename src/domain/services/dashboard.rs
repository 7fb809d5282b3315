#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::lock;
use super::ChatSession;
use super::IngestionMonitor;
use super::PollingSubscription;
use super::ProjectStore;
use super::RejectReason;
use super::SendOutcome;
use super::SyncWatcher;
use crate::domain::models::BackendBox;
use crate::domain::models::ChatMessage;
use crate::domain::models::Event;
use crate::domain::models::IngestionStatus;
use crate::domain::models::Project;
use crate::domain::models::ProjectRepositoryBox;
use crate::domain::models::Risk;
use crate::domain::models::Session;
use crate::domain::models::WebhookUrl;
use crate::domain::services::MonitorState;

/// Everything the view renders, read in one go.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashboardSnapshot {
    pub project: Option<Project>,
    pub risks: Vec<Risk>,
    pub webhook_url: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub waiting: bool,
    pub ingestion_state: MonitorState,
    pub ingestion_status: Option<IngestionStatus>,
}

#[derive(Clone, Copy, Debug)]
pub struct DashboardSettings {
    pub poll_interval: Duration,
    pub watch_interval: Duration,
    pub refresh_interval: Duration,
}

async fn load_risks(backend: &BackendBox, store: &ProjectStore, risks: &Mutex<Vec<Risk>>) {
    let project = match store.current() {
        Some(project) => project,
        None => return,
    };

    match backend.risks(&project.id).await {
        Ok(loaded) => {
            tracing::debug!(project_id = project.id, count = loaded.len(), "Risks loaded");
            *lock(risks) = loaded;
        }
        Err(err) => {
            tracing::warn!(error = ?err, project_id = project.id, "Failed to load risks");
        }
    }
}

async fn send_chat_unless_ingesting(
    monitor: &IngestionMonitor,
    chat: &ChatSession,
    query: &str,
) -> Result<SendOutcome> {
    if monitor.is_watching() {
        return Ok(SendOutcome::Rejected(RejectReason::IngestionActive));
    }

    return chat.send(query).await;
}

/// Everything the signed in user's dashboard runs while it is open. Monitor
/// events pass through here first so a finished ingestion reloads the
/// project and its risks before the view hears about it.
pub struct Dashboard {
    backend: BackendBox,
    session: Session,
    webhook_base: String,
    store: ProjectStore,
    monitor: IngestionMonitor,
    chat: ChatSession,
    chat_worker: Mutex<Option<JoinHandle<()>>>,
    risks: Arc<Mutex<Vec<Risk>>>,
    watcher: SyncWatcher,
    auto_refresh: PollingSubscription,
    token: CancellationToken,
}

impl Dashboard {
    pub async fn start(
        backend: BackendBox,
        repository: ProjectRepositoryBox,
        session: Session,
        webhook_base: &str,
        settings: DashboardSettings,
        tx: mpsc::UnboundedSender<Event>,
    ) -> Dashboard {
        let store = ProjectStore::new(repository, &session.user_id);
        store.refresh().await;

        let risks = Arc::new(Mutex::new(vec![]));
        load_risks(&backend, &store, &risks).await;

        let (monitor_tx, mut monitor_rx) = mpsc::unbounded_channel::<Event>();
        let monitor = IngestionMonitor::new(backend.clone(), settings.poll_interval, monitor_tx);
        let chat = ChatSession::new(backend.clone(), store.clone(), Some(tx.clone()));
        let auto_refresh = store.start_auto_refresh(settings.refresh_interval);
        let watcher = SyncWatcher::start(
            backend.clone(),
            store.clone(),
            monitor.clone(),
            settings.watch_interval,
        );

        let token = CancellationToken::new();
        let coordinator_token = token.clone();
        let coordinator_backend = backend.clone();
        let coordinator_store = store.clone();
        let coordinator_risks = risks.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = coordinator_token.cancelled() => break,
                    event = monitor_rx.recv() => event,
                };

                let event = match event {
                    Some(event) => event,
                    None => break,
                };

                if let Event::IngestionCompleted(project_id) = &event {
                    tracing::info!(project_id, "Ingestion completed, reloading project");
                    coordinator_store.refresh_after_current().await;
                    load_risks(&coordinator_backend, &coordinator_store, &coordinator_risks).await;

                    let project_id = project_id.to_string();
                    if tx.send(Event::IngestionCompleted(project_id)).is_err() {
                        break;
                    }
                    if tx.send(Event::ProjectRefreshed()).is_err() {
                        break;
                    }
                    continue;
                }

                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        return Dashboard {
            backend,
            session,
            webhook_base: webhook_base.to_string(),
            store,
            monitor,
            chat,
            chat_worker: Mutex::new(None),
            risks,
            watcher,
            auto_refresh,
            token,
        };
    }

    pub fn project(&self) -> Option<Project> {
        return self.store.current();
    }

    pub fn risks(&self) -> Vec<Risk> {
        return lock(&self.risks).clone();
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        return self.chat.messages();
    }

    pub fn is_waiting(&self) -> bool {
        return self.chat.is_waiting();
    }

    pub fn ingestion_state(&self) -> MonitorState {
        return self.monitor.state();
    }

    pub fn ingestion_status(&self) -> Option<IngestionStatus> {
        return self.monitor.status();
    }

    pub fn webhook_url(&self) -> Option<WebhookUrl> {
        return self.store.current().map(|project| {
            return WebhookUrl::new(&self.webhook_base, &self.session.user_id, &project.id);
        });
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        return DashboardSnapshot {
            project: self.project(),
            risks: self.risks(),
            webhook_url: self.webhook_url().map(|url| return url.to_string()),
            messages: self.messages(),
            waiting: self.is_waiting(),
            ingestion_state: self.ingestion_state(),
            ingestion_status: self.ingestion_status(),
        };
    }

    /// Connects `repo_url` as the user's project and starts following its
    /// ingestion. Returns the new project id.
    pub async fn ingest(&self, repo_url: &str) -> Result<String> {
        let repo_url = repo_url.trim();
        if repo_url.is_empty() {
            bail!("A repository URL is required.");
        }

        if let Some(project) = self.store.current() {
            bail!(
                "{} is already connected. New commits are synced through the webhook.",
                project.repo_name()
            );
        }

        let project_id = self
            .backend
            .start_ingest(&self.session.user_id, repo_url)
            .await?;
        tracing::info!(project_id, repo_url, "Ingestion started");

        self.monitor.attach(&project_id);
        self.store.refresh_after_current().await;

        return Ok(project_id);
    }

    pub async fn send_chat(&self, query: &str) -> Result<SendOutcome> {
        return send_chat_unless_ingesting(&self.monitor, &self.chat, query).await;
    }

    /// Sends `query` in the background. Ignored while an earlier question is
    /// still being answered.
    pub fn spawn_chat(&self, query: &str) {
        let mut worker = lock(&self.chat_worker);
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("Chat request already in flight, ignoring");
                return;
            }
        }

        let monitor = self.monitor.clone();
        let chat = self.chat.clone();
        let query = query.to_string();

        *worker = Some(tokio::spawn(async move {
            match send_chat_unless_ingesting(&monitor, &chat, &query).await {
                Ok(SendOutcome::Rejected(reason)) => {
                    tracing::debug!(reason = ?reason, "Chat request rejected");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = ?err, "Chat request failed");
                }
            }
        }));
    }

    /// Clears a failed ingestion so the chat is usable again. Returns false
    /// when there was no failure to dismiss.
    pub fn dismiss_ingestion(&self) -> bool {
        if !matches!(self.monitor.state(), MonitorState::Failed { .. }) {
            return false;
        }

        tracing::debug!("Dismissing failed ingestion");
        self.monitor.detach();
        return true;
    }

    /// Drops the question being answered, if any.
    pub fn abort_chat(&self) {
        if let Some(handle) = lock(&self.chat_worker).take() {
            handle.abort();
        }
    }

    pub fn reset_chat(&self) {
        self.abort_chat();
        self.chat.reset();
    }

    pub fn shutdown(&self) {
        tracing::debug!("Shutting down dashboard");
        self.token.cancel();
        self.watcher.stop();
        self.auto_refresh.cancel();
        self.monitor.detach();
        self.abort_chat();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
