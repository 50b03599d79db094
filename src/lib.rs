//! Rust client for long-lived, newline-delimited JSON streaming feeds.
//!
//! The crate is organized by concern:
//! - `stream`: stream client, connection supervisor, and event dispatch.
//! - `transport`: streaming HTTP transport abstraction and reqwest backend.
//! - `auth`: per-request authorization headers.
//! - `retry`: reconnect backoff and timeout utilities.

/// Request authorization.
pub mod auth;
/// Backoff and timeout helpers used by the supervisor.
pub mod retry;
/// Stream client, listeners, and domain types.
pub mod stream;
/// Streaming HTTP transport.
pub mod transport;

pub use auth::{ApiKey, BearerToken, NoAuth, StreamAuth};
pub use stream::{
    ConnectionLifecycleListener, FilterQuery, ListenerSet, RawStreamListener, StatusStream,
    StreamClient, StreamClientError, StreamConfig, StreamHandle, StreamListener, StreamMode,
    StreamState,
};
pub use transport::{HttpTransport, StreamResponse, StreamTransport};
