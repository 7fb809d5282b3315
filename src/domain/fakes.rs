use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Result;
use async_trait::async_trait;
use tokio::time;

use crate::domain::models::Backend;
use crate::domain::models::IdentityProvider;
use crate::domain::models::IngestionStatus;
use crate::domain::models::Profile;
use crate::domain::models::Project;
use crate::domain::models::ProjectRepository;
use crate::domain::models::Risk;
use crate::domain::models::Session;

pub fn status(label: &str, logs: &[&str]) -> IngestionStatus {
    return IngestionStatus {
        step: label.to_string(),
        logs: logs.iter().map(|log| return log.to_string()).collect(),
        status: label.to_string(),
        error: None,
    };
}

pub fn project(id: &str) -> Project {
    return Project {
        id: id.to_string(),
        owner_user_id: "user-1".to_string(),
        repo_url: "https://github.com/lumis/twin".to_string(),
        last_commit_hash: Some("9f2c1e4b7a0d".to_string()),
    };
}

pub fn session() -> Session {
    return Session {
        user_id: "user-1".to_string(),
        email: Some("dev@lumis.dev".to_string()),
        access_token: "access-token".to_string(),
        refresh_token: None,
        expires_at: None,
    };
}

/// Pops scripted replies in order and keeps repeating the last one.
struct Script<T: Clone> {
    replies: Mutex<VecDeque<T>>,
}

impl<T: Clone> Script<T> {
    fn new(replies: Vec<T>) -> Script<T> {
        return Script {
            replies: Mutex::new(replies.into()),
        };
    }

    fn next(&self) -> Option<T> {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            return replies.pop_front();
        }
        return replies.front().cloned();
    }
}

pub struct FakeBackend {
    statuses: Script<Result<IngestionStatus, String>>,
    chat_replies: Script<Result<String, String>>,
    chat_delay: Duration,
    status_delay: Duration,
    ingest_reply: Result<String, String>,
    risks: Vec<Risk>,
    pub status_calls: AtomicUsize,
    pub status_requests: Mutex<Vec<String>>,
    pub chat_calls: AtomicUsize,
    pub chat_requests: Mutex<Vec<(String, String)>>,
    pub ingest_requests: Mutex<Vec<(String, String)>>,
    pub risk_calls: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> FakeBackend {
        return FakeBackend {
            statuses: Script::new(vec![Err("no job".to_string())]),
            chat_replies: Script::new(vec![Ok("It uses token X.".to_string())]),
            chat_delay: Duration::from_millis(100),
            status_delay: Duration::ZERO,
            ingest_reply: Ok("p1".to_string()),
            risks: vec![],
            status_calls: AtomicUsize::new(0),
            status_requests: Mutex::new(vec![]),
            chat_calls: AtomicUsize::new(0),
            chat_requests: Mutex::new(vec![]),
            ingest_requests: Mutex::new(vec![]),
            risk_calls: AtomicUsize::new(0),
        };
    }
}

impl FakeBackend {
    pub fn with_statuses(mut self, statuses: Vec<Result<IngestionStatus, String>>) -> FakeBackend {
        self.statuses = Script::new(statuses);
        return self;
    }

    pub fn with_status_labels(self, labels: &[&str]) -> FakeBackend {
        let statuses = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| {
                let log = format!("log {}", idx + 1);
                return Ok(status(label, &[log.as_str()]));
            })
            .collect();
        return self.with_statuses(statuses);
    }

    pub fn with_status_delay(mut self, delay: Duration) -> FakeBackend {
        self.status_delay = delay;
        return self;
    }

    pub fn with_chat_replies(mut self, replies: Vec<Result<String, String>>) -> FakeBackend {
        self.chat_replies = Script::new(replies);
        return self;
    }

    pub fn with_chat_delay(mut self, delay: Duration) -> FakeBackend {
        self.chat_delay = delay;
        return self;
    }

    pub fn with_ingest_reply(mut self, reply: Result<String, String>) -> FakeBackend {
        self.ingest_reply = reply;
        return self;
    }

    pub fn with_risks(mut self, risks: Vec<Risk>) -> FakeBackend {
        self.risks = risks;
        return self;
    }

    pub fn status_calls(&self) -> usize {
        return self.status_calls.load(Ordering::SeqCst);
    }

    pub fn chat_calls(&self) -> usize {
        return self.chat_calls.load(Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    async fn start_ingest(&self, user_id: &str, repo_url: &str) -> Result<String> {
        self.ingest_requests
            .lock()
            .unwrap()
            .push((user_id.to_string(), repo_url.to_string()));
        return self.ingest_reply.clone().map_err(|err| return anyhow!(err));
    }

    async fn ingest_status(&self, project_id: &str) -> Result<IngestionStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_requests
            .lock()
            .unwrap()
            .push(project_id.to_string());
        let reply = self.statuses.next();

        if !self.status_delay.is_zero() {
            time::sleep(self.status_delay).await;
        }

        return match reply {
            Some(Ok(status)) => Ok(status),
            Some(Err(err)) => Err(anyhow!(err)),
            None => Err(anyhow!("no scripted status")),
        };
    }

    async fn chat(&self, project_id: &str, query: &str) -> Result<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.chat_requests
            .lock()
            .unwrap()
            .push((project_id.to_string(), query.to_string()));
        let reply = self.chat_replies.next();

        time::sleep(self.chat_delay).await;

        return match reply {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(err)) => Err(anyhow!(err)),
            None => Err(anyhow!("no scripted reply")),
        };
    }

    async fn risks(&self, _project_id: &str) -> Result<Vec<Risk>> {
        self.risk_calls.fetch_add(1, Ordering::SeqCst);
        return Ok(self.risks.clone());
    }
}

pub struct FakeProjects {
    replies: Script<Result<Option<Project>, String>>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeProjects {
    pub fn new(replies: Vec<Result<Option<Project>, String>>) -> FakeProjects {
        return FakeProjects {
            replies: Script::new(replies),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        };
    }

    pub fn with_delay(mut self, delay: Duration) -> FakeProjects {
        self.delay = delay;
        return self;
    }

    pub fn calls(&self) -> usize {
        return self.calls.load(Ordering::SeqCst);
    }
}

#[async_trait]
impl ProjectRepository for FakeProjects {
    async fn project_for_user(&self, _user_id: &str) -> Result<Option<Project>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.next();

        if !self.delay.is_zero() {
            time::sleep(self.delay).await;
        }

        return match reply {
            Some(Ok(project)) => Ok(project),
            Some(Err(err)) => Err(anyhow!(err)),
            None => Ok(None),
        };
    }
}

pub struct FakeIdentity {
    session: Result<Option<Session>, String>,
}

impl FakeIdentity {
    pub fn new(session: Result<Option<Session>, String>) -> FakeIdentity {
        return FakeIdentity { session };
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_session(&self) -> Result<Option<Session>> {
        return self.session.clone().map_err(|err| return anyhow!(err));
    }

    async fn refresh_session(&self) -> Result<Option<Session>> {
        return Ok(None);
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Session> {
        return Ok(session());
    }

    async fn sign_up(
        &self,
        _email: &str,
        _password: &str,
        _profile: &Profile,
    ) -> Result<Option<Session>> {
        return Ok(None);
    }

    async fn sign_out(&self) -> Result<()> {
        return Ok(());
    }
}
