#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    ChatAbort(),
    ChatRequest(String),
    ChatReset(),
    IngestRequest(String),
    IngestionDismiss(),
}
