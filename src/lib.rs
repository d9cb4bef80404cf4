//! Client for streaming document-query answers over Server-Sent Events.
//!
//! A [`StreamingSession`] sends a question to the query stream endpoint,
//! accumulates answer tokens and citations as they arrive, and settles a
//! [`PendingQuery`] once the server signals completion or an error.

pub mod cache;
pub mod client;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod sse;
pub mod state;

pub use cache::{CacheInvalidator, NoopInvalidator};
pub use client::{ClientConfig, CredentialPlacement, EventStream, EventTransport, HttpTransport};
pub use credentials::{CredentialStore, StaticCredentials, TokenFileCredentials};
pub use error::{StreamError, TransportError};
pub use protocol::{Citation, QueryRequest, StreamEvent, StreamParams};
pub use session::{PendingQuery, StreamingSession};
pub use state::{Phase, QueryOutcome, SessionState};
