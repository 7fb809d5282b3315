#[cfg(test)]
#[path = "app_state_test.rs"]
mod tests;

use ratatui::prelude::Rect;

use super::DashboardSnapshot;
use super::MonitorState;
use super::Scroll;
use crate::domain::models::Action;
use crate::domain::models::Event;
use crate::domain::models::Role;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatLine {
    pub role: Role,
    pub text: String,
    pub header: bool,
    pub placeholder: bool,
}

/// View state of the dashboard: the latest snapshot plus what only the
/// terminal cares about (scroll position, wrapped lines, notices).
#[derive(Default)]
pub struct AppState {
    pub snapshot: DashboardSnapshot,
    pub lines: Vec<ChatLine>,
    pub notice: Option<String>,
    pub scroll: Scroll,
    pub last_known_width: u16,
    pub last_known_height: u16,
}

impl AppState {
    pub fn sync(&mut self, snapshot: DashboardSnapshot) {
        if snapshot == self.snapshot {
            return;
        }

        self.snapshot = snapshot;
        self.sync_dependants();
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.last_known_width = rect.width;
        self.last_known_height = rect.height;
        self.sync_dependants();
    }

    /// The ingestion panel takes over the chat while a job runs or after it
    /// failed.
    pub fn shows_ingestion(&self) -> bool {
        return matches!(
            self.snapshot.ingestion_state,
            MonitorState::Watching(_) | MonitorState::Failed { .. }
        );
    }

    pub fn input_title(&self) -> &'static str {
        if self.snapshot.project.is_none() {
            return "Repository URL";
        }

        return "Ask about your codebase";
    }

    /// Turns submitted input into an action, or explains why there is none.
    pub fn submit(&mut self, input: &str) -> Option<Action> {
        if input.trim().is_empty() {
            return None;
        }

        match self.snapshot.ingestion_state {
            MonitorState::Watching(_) => {
                self.notice =
                    Some("Ingestion in progress, chat opens once it completes.".to_string());
                return None;
            }
            MonitorState::Failed { .. } => {
                self.notice = Some("Ingestion failed. Press Esc to dismiss it.".to_string());
                return None;
            }
            _ => (),
        }

        if self.snapshot.project.is_none() {
            self.notice = Some(format!("Connecting {}...", input.trim()));
            return Some(Action::IngestRequest(input.trim().to_string()));
        }

        if self.snapshot.waiting {
            self.notice = Some("Still waiting for the previous answer.".to_string());
            return None;
        }

        self.notice = None;
        self.scroll.last();
        return Some(Action::ChatRequest(input.to_string()));
    }

    /// Returns whether the view should close, and the action to dispatch.
    pub fn handle_event(&mut self, event: Event) -> (bool, Option<Action>) {
        match event {
            Event::KeyboardCTRLC() => {
                if self.snapshot.waiting {
                    return (false, Some(Action::ChatAbort()));
                }
                return (true, None);
            }
            Event::KeyboardEsc() => {
                if let MonitorState::Failed { .. } = self.snapshot.ingestion_state {
                    self.notice = None;
                    return (false, Some(Action::IngestionDismiss()));
                }
            }
            Event::KeyboardCTRLL() => {
                self.notice = None;
                return (false, Some(Action::ChatReset()));
            }
            Event::IngestRequestFailed(err) => {
                self.notice = Some(format!("Ingest failed: {err}"));
            }
            Event::IngestionCompleted(_) => {
                self.notice = Some("Ingestion complete. Ask away.".to_string());
            }
            Event::IngestionFailed(_, error) => {
                self.notice = Some(format!(
                    "Ingestion failed: {}",
                    error.unwrap_or_else(|| return "unknown error".to_string())
                ));
            }
            Event::UIScrollDown() => self.scroll.down(),
            Event::UIScrollUp() => self.scroll.up(),
            Event::UIScrollPageDown() => self.scroll.down_page(),
            Event::UIScrollPageUp() => self.scroll.up_page(),
            _ => (),
        }

        return (false, None);
    }

    fn sync_dependants(&mut self) {
        let width = self.last_known_width.saturating_sub(4).max(10) as usize;

        self.lines = self
            .snapshot
            .messages
            .iter()
            .flat_map(|message| {
                let header = ChatLine {
                    role: message.role,
                    text: match message.role {
                        Role::User => "You".to_string(),
                        Role::Assistant => "Lumis".to_string(),
                    },
                    header: true,
                    placeholder: false,
                };

                let body = message.as_string_lines(width).into_iter().map(|text| {
                    return ChatLine {
                        role: message.role,
                        text,
                        header: false,
                        placeholder: message.is_placeholder(),
                    };
                });

                let spacer = ChatLine {
                    role: message.role,
                    text: "".to_string(),
                    header: false,
                    placeholder: false,
                };

                return std::iter::once(header)
                    .chain(body)
                    .chain(std::iter::once(spacer))
                    .collect::<Vec<ChatLine>>();
            })
            .collect();

        self.scroll.set_state(
            self.lines.len() as u16,
            self.last_known_height.saturating_sub(2),
        );
    }
}
