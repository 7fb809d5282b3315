#[cfg(test)]
#[path = "events_test.rs"]
mod tests;

use anyhow::Result;
use crossterm::event::Event as CrosstermEvent;
use crossterm::event::EventStream;
use crossterm::event::MouseEventKind;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time;
use tui_textarea::Input;
use tui_textarea::Key;

use crate::domain::models::Event;

/// Maps raw terminal input onto dashboard events. Anything not bound to a
/// shortcut goes to the input box.
fn map_crossterm(event: CrosstermEvent) -> Option<Event> {
    match event {
        CrosstermEvent::Paste(text) => {
            return Some(Event::KeyboardPaste(text));
        }
        CrosstermEvent::Mouse(mouseevent) => {
            return match mouseevent.kind {
                MouseEventKind::ScrollUp => Some(Event::UIScrollUp()),
                MouseEventKind::ScrollDown => Some(Event::UIScrollDown()),
                _ => None,
            };
        }
        CrosstermEvent::Key(keyevent) => {
            let input: Input = keyevent.into();
            let event = match input {
                Input { key: Key::Up, .. } | Input {
                    key: Key::MouseScrollUp,
                    ..
                } => Event::UIScrollUp(),
                Input { key: Key::Down, .. }
                | Input {
                    key: Key::MouseScrollDown,
                    ..
                } => Event::UIScrollDown(),
                Input {
                    key: Key::PageUp, ..
                }
                | Input {
                    key: Key::Char('u'),
                    ctrl: true,
                    ..
                } => Event::UIScrollPageUp(),
                Input {
                    key: Key::PageDown, ..
                }
                | Input {
                    key: Key::Char('d'),
                    ctrl: true,
                    ..
                } => Event::UIScrollPageDown(),
                Input {
                    key: Key::Char('c'),
                    ctrl: true,
                    ..
                } => Event::KeyboardCTRLC(),
                Input {
                    key: Key::Char('l'),
                    ctrl: true,
                    ..
                } => Event::KeyboardCTRLL(),
                Input {
                    key: Key::Enter, ..
                } => Event::KeyboardEnter(),
                Input { key: Key::Esc, .. } => Event::KeyboardEsc(),
                input => Event::KeyboardCharInput(input),
            };

            return Some(event);
        }
        _ => return None,
    }
}

/// Merges terminal input with events published by the dashboard, and emits
/// a tick when both stay quiet so the view can redraw.
pub struct EventsService {
    crossterm_events: EventStream,
    events: mpsc::UnboundedReceiver<Event>,
}

impl EventsService {
    pub fn new(events: mpsc::UnboundedReceiver<Event>) -> EventsService {
        return EventsService {
            crossterm_events: EventStream::new(),
            events,
        };
    }

    pub async fn next(&mut self) -> Result<Event> {
        loop {
            let evt = tokio::select! {
                event = self.events.recv() => event,
                event = self.crossterm_events.next() => match event {
                    Some(Ok(input)) => map_crossterm(input),
                    Some(Err(err)) => {
                        tracing::warn!(error = ?err, "Failed to read terminal event");
                        None
                    }
                    None => None
                },
                _ = time::sleep(time::Duration::from_millis(500)) => Some(Event::UITick())
            };

            if let Some(event) = evt {
                return Ok(event);
            }
        }
    }
}
