#[cfg(test)]
#[path = "project_store_test.rs"]
mod tests;

use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use super::lock;
use super::PollingSubscription;
use crate::domain::models::Project;
use crate::domain::models::ProjectRepositoryBox;

/// Releases the in-flight flag even when the refresh future is dropped, and
/// wakes callers waiting to run a refresh of their own.
struct RefreshGuard {
    refreshing: Arc<AtomicBool>,
    settled: Arc<Notify>,
}

impl RefreshGuard {
    fn acquire(refreshing: &Arc<AtomicBool>, settled: &Arc<Notify>) -> Option<RefreshGuard> {
        if refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        return Some(RefreshGuard {
            refreshing: refreshing.clone(),
            settled: settled.clone(),
        });
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.refreshing.store(false, Ordering::SeqCst);
        self.settled.notify_waiters();
    }
}

/// Cache of the one project owned by the signed in user. Only `refresh`
/// writes the cache, and at most one refresh is in flight at a time.
#[derive(Clone)]
pub struct ProjectStore {
    repository: ProjectRepositoryBox,
    user_id: String,
    current: Arc<Mutex<Option<Project>>>,
    refreshing: Arc<AtomicBool>,
    settled: Arc<Notify>,
}

impl ProjectStore {
    pub fn new(repository: ProjectRepositoryBox, user_id: &str) -> ProjectStore {
        return ProjectStore {
            repository,
            user_id: user_id.to_string(),
            current: Arc::new(Mutex::new(None)),
            refreshing: Arc::new(AtomicBool::new(false)),
            settled: Arc::new(Notify::new()),
        };
    }

    pub fn current(&self) -> Option<Project> {
        return lock(&self.current).clone();
    }

    /// Not having a project yet is a normal state, so lookup failures are
    /// logged and reported as no project.
    pub async fn fetch_project_for(&self, user_id: &str) -> Option<Project> {
        return match self.repository.project_for_user(user_id).await {
            Ok(project) => project,
            Err(err) => {
                tracing::warn!(error = ?err, user_id, "Failed to fetch project");
                None
            }
        };
    }

    /// Returns false when the request was coalesced into a refresh already
    /// in flight. A failed fetch keeps the cached project.
    pub async fn refresh(&self) -> bool {
        let _guard = match RefreshGuard::acquire(&self.refreshing, &self.settled) {
            Some(guard) => guard,
            None => {
                tracing::debug!(user_id = self.user_id, "Project refresh coalesced");
                return false;
            }
        };

        match self.repository.project_for_user(&self.user_id).await {
            Ok(project) => {
                tracing::debug!(user_id = self.user_id, project = ?project, "Project refreshed");
                *lock(&self.current) = project;
            }
            Err(err) => {
                tracing::warn!(error = ?err, user_id = self.user_id, "Project refresh failed");
            }
        }

        return true;
    }

    /// Runs a fetch that starts after this call. A refresh already in flight
    /// may carry data from before the caller's change, so this waits for it
    /// to settle instead of coalescing into it.
    pub async fn refresh_after_current(&self) {
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            if self.refresh().await {
                return;
            }

            settled.await;
        }
    }

    /// Refreshes every `interval`, starting one interval from now.
    pub fn start_auto_refresh(&self, interval: Duration) -> PollingSubscription {
        let store = self.clone();
        return PollingSubscription::start_delayed("project-refresh", interval, move || {
            let store = store.clone();
            return async move {
                store.refresh().await;
                return ControlFlow::Continue(());
            };
        });
    }
}
