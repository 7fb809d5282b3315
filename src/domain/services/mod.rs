pub mod actions;
mod app_state;
mod chat_session;
mod dashboard;
pub mod events;
mod ingestion_monitor;
mod polling;
mod project_store;
mod scroll;
mod session_gate;
mod sync_watcher;

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

pub use app_state::*;
pub use chat_session::*;
pub use dashboard::*;
pub use ingestion_monitor::*;
pub use polling::*;
pub use project_store::*;
pub use scroll::*;
pub use session_gate::*;
pub use sync_watcher::*;

/// State guarded here is never left half-written by a panic, so a poisoned
/// lock is still safe to read.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    return mutex.lock().unwrap_or_else(PoisonError::into_inner);
}
