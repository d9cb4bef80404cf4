use thiserror::Error;

/// Why a query stream did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("authentication required: no bearer token available")]
    AuthenticationRequired,

    #[error("failed to parse stream event: {0}")]
    Protocol(String),

    #[error("{0}")]
    Application(String),

    #[error("connection to the query stream failed: {0}")]
    Transport(String),

    #[error("query stream cancelled")]
    Cancelled,
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure raised by an [`EventTransport`](crate::client::EventTransport)
/// while opening or reading a connection.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid stream URL: {0}")]
    Url(String),

    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for StreamError {
    fn from(err: TransportError) -> Self {
        StreamError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
