use thiserror::Error;

/// A framing-layer failure. The connection is closed with no response frame —
/// these never reach the Message Router.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame exceeds maximum length ({len} > {max})")]
    TooLarge { len: u32, max: u32 },
    #[error("peer closed the connection")]
    Eof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An error produced by the Message Router while handling a decoded request.
/// Always converts to a `{"status":"error","message":...}` response frame;
/// the connection stays open.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("Node not found")]
    UnknownWorker,
    #[error("DAG not found")]
    UnknownDag,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid DAG submission: {0}")]
    InvalidDag(#[from] crate::dags::DagValidationError),
}

impl RouterError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}
