mod action;
mod backend;
mod event;
mod identity;
mod ingestion;
mod loading;
mod message;
mod project;
mod risk;
mod session;
mod textarea;
mod webhook;

pub use action::*;
pub use backend::*;
pub use event::*;
pub use identity::*;
pub use ingestion::*;
pub use loading::*;
pub use message::*;
pub use project::*;
pub use risk::*;
pub use session::*;
pub use textarea::*;
pub use webhook::*;
