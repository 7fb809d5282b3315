#[cfg(test)]
#[path = "chat_session_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use tokio::sync::mpsc;

use super::lock;
use super::ProjectStore;
use crate::domain::models::BackendBox;
use crate::domain::models::ChatMessage;
use crate::domain::models::Event;
use crate::domain::models::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    EmptyQuery,
    InFlight,
    IngestionActive,
    NoProject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Answered,
    /// The log was reset while the request was in flight.
    Discarded,
    Rejected(RejectReason),
}

#[derive(Default)]
struct ChatLog {
    messages: Vec<ChatMessage>,
    generation: u64,
}

/// One outstanding question. Dropping it without settling, for example when
/// the sending task is aborted, retracts the placeholder.
struct PendingReply {
    log: Arc<Mutex<ChatLog>>,
    in_flight: Arc<AtomicBool>,
    tx: Option<mpsc::UnboundedSender<Event>>,
    generation: u64,
    settled: bool,
}

impl PendingReply {
    fn begin(session: &ChatSession, query: &str) -> PendingReply {
        let generation = {
            let mut log = lock(&session.log);
            log.messages.push(ChatMessage::new(Role::User, query));
            log.messages.push(ChatMessage::placeholder());
            log.generation
        };

        let pending = PendingReply {
            log: session.log.clone(),
            in_flight: session.in_flight.clone(),
            tx: session.tx.clone(),
            generation,
            settled: false,
        };
        pending.notify();

        return pending;
    }

    fn notify(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Event::ChatUpdated());
        }
    }

    /// Swaps the placeholder for the answer in place. Returns false when the
    /// log moved on to a newer generation.
    fn resolve(&mut self, answer: &str) -> bool {
        self.settled = true;

        let mut log = lock(&self.log);
        if log.generation != self.generation {
            return false;
        }

        let answer = ChatMessage::new(Role::Assistant, answer);
        match log.messages.iter().position(|message| return message.is_placeholder()) {
            Some(idx) => log.messages[idx] = answer,
            None => log.messages.push(answer),
        }

        return true;
    }

    fn retract(&mut self) {
        self.settled = true;

        let mut log = lock(&self.log);
        if log.generation == self.generation {
            log.messages.retain(|message| return !message.is_placeholder());
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("Chat request dropped before completion");
            self.retract();
        }

        self.in_flight.store(false, Ordering::SeqCst);
        self.notify();
    }
}

/// Conversation with the assistant about the current project.
///
/// At most one question is outstanding at a time. While it is, the log ends
/// with the user's message followed by a single placeholder which is later
/// replaced by the answer, or removed when the request fails.
#[derive(Clone)]
pub struct ChatSession {
    backend: BackendBox,
    store: ProjectStore,
    log: Arc<Mutex<ChatLog>>,
    in_flight: Arc<AtomicBool>,
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl ChatSession {
    pub fn new(
        backend: BackendBox,
        store: ProjectStore,
        tx: Option<mpsc::UnboundedSender<Event>>,
    ) -> ChatSession {
        return ChatSession {
            backend,
            store,
            log: Arc::new(Mutex::new(ChatLog::default())),
            in_flight: Arc::new(AtomicBool::new(false)),
            tx,
        };
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        return lock(&self.log).messages.clone();
    }

    pub fn is_waiting(&self) -> bool {
        return self.in_flight.load(Ordering::SeqCst);
    }

    /// Clears the log. An answer to a question asked before the reset is
    /// dropped when it arrives.
    pub fn reset(&self) {
        let mut log = lock(&self.log);
        log.messages.clear();
        log.generation += 1;
    }

    /// Asks `query` about the current project. Blank queries and queries sent
    /// while another is outstanding are ignored. Backend failures remove the
    /// placeholder, keep the user's message, and are returned to the caller.
    pub async fn send(&self, query: &str) -> Result<SendOutcome> {
        if query.trim().is_empty() {
            return Ok(SendOutcome::Rejected(RejectReason::EmptyQuery));
        }

        let project = match self.store.current() {
            Some(project) => project,
            None => return Ok(SendOutcome::Rejected(RejectReason::NoProject)),
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Chat request already in flight, ignoring");
            return Ok(SendOutcome::Rejected(RejectReason::InFlight));
        }

        let mut pending = PendingReply::begin(self, query);
        tracing::debug!(project_id = project.id, "Sending chat request");

        return match self.backend.chat(&project.id, query).await {
            Ok(answer) => {
                if pending.resolve(&answer) {
                    Ok(SendOutcome::Answered)
                } else {
                    tracing::debug!("Discarding answer for a reset chat log");
                    Ok(SendOutcome::Discarded)
                }
            }
            Err(err) => {
                pending.retract();
                Err(err)
            }
        };
    }
}
