use tui_textarea::Input;

use super::IngestionStatus;

pub enum Event {
    ChatUpdated(),
    IngestionCompleted(String),
    IngestionFailed(String, Option<String>),
    IngestionProgress(IngestionStatus),
    IngestRequestFailed(String),
    KeyboardCharInput(Input),
    KeyboardCTRLC(),
    KeyboardCTRLL(),
    KeyboardEnter(),
    KeyboardEsc(),
    KeyboardPaste(String),
    ProjectRefreshed(),
    UIScrollDown(),
    UIScrollPageDown(),
    UIScrollPageUp(),
    UIScrollUp(),
    UITick(),
}
