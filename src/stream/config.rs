use std::time::Duration;

use crate::retry::BackoffPolicy;

/// Default endpoints, timeouts, and limits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StreamDefaults;

impl StreamDefaults {
    pub const STREAM_BASE_URL: &'static str = "https://stream.twitter.com/1.1/";
    pub const USER_STREAM_BASE_URL: &'static str = "https://userstream.twitter.com/1.1/";
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
    /// Servers send a keep-alive newline roughly every 30 s.
    pub const STALL_TIMEOUT: Duration = Duration::from_secs(90);
    pub const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);
    /// Large enough for a friends list snapshot of a heavily followed account.
    pub const MAX_LINE_LENGTH: usize = 4 * 1024 * 1024;
    pub const THREAD_NAME: &'static str = "tweetstream";
}

/// Settings shared by every worker a [`StreamClient`](super::StreamClient)
/// starts.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub stream_base_url: String,
    pub user_stream_base_url: String,
    /// Ask the server for `warning` messages when the client falls behind.
    pub stall_warnings: bool,
    /// Send `replies=all` on user streams.
    pub user_stream_replies_all: bool,
    pub connect_timeout: Duration,
    /// Fail the connection when no bytes arrive for this long.
    pub stall_timeout: Option<Duration>,
    /// Longest accepted line in bytes. A longer line fails the connection.
    pub max_line_length: usize,
    pub error_body_timeout: Duration,
    pub network_backoff: BackoffPolicy,
    pub http_backoff: BackoffPolicy,
    pub thread_name: String,
    pub pretty_debug: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_base_url: StreamDefaults::STREAM_BASE_URL.to_string(),
            user_stream_base_url: StreamDefaults::USER_STREAM_BASE_URL.to_string(),
            stall_warnings: true,
            user_stream_replies_all: false,
            connect_timeout: StreamDefaults::CONNECT_TIMEOUT,
            stall_timeout: Some(StreamDefaults::STALL_TIMEOUT),
            max_line_length: StreamDefaults::MAX_LINE_LENGTH,
            error_body_timeout: StreamDefaults::ERROR_BODY_TIMEOUT,
            network_backoff: BackoffPolicy::network(),
            http_backoff: BackoffPolicy::http(),
            thread_name: StreamDefaults::THREAD_NAME.to_string(),
            pretty_debug: false,
        }
    }
}

impl StreamConfig {
    /// Base URL for status streams. A trailing `/` is added when missing.
    pub fn with_stream_base_url(mut self, url: impl Into<String>) -> Self {
        self.stream_base_url = normalize_base_url(url.into());
        self
    }

    /// Base URL for the user stream. A trailing `/` is added when missing.
    pub fn with_user_stream_base_url(mut self, url: impl Into<String>) -> Self {
        self.user_stream_base_url = normalize_base_url(url.into());
        self
    }

    /// Points both status and user streams at the same base URL.
    pub fn with_base_url(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.with_stream_base_url(url.clone())
            .with_user_stream_base_url(url)
    }

    /// Sends `stall_warnings=true|false` on every request.
    pub fn with_stall_warnings(mut self, enabled: bool) -> Self {
        self.stall_warnings = enabled;
        self
    }

    /// Sends `replies=all` on user streams when enabled.
    pub fn with_user_stream_replies_all(mut self, enabled: bool) -> Self {
        self.user_stream_replies_all = enabled;
        self
    }

    /// Timeout for establishing the TCP/TLS connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `None` disables stall detection.
    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Caps the bytes buffered for one line.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Overrides the network-class backoff policy.
    pub fn with_network_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.network_backoff = policy;
        self
    }

    /// Overrides the HTTP-class backoff policy.
    pub fn with_http_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.http_backoff = policy;
        self
    }

    /// Prefix for dispatcher thread names and the worker span.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Pretty-prints received JSON in debug logs.
    pub fn with_pretty_debug(mut self, enabled: bool) -> Self {
        self.pretty_debug = enabled;
        self
    }
}

pub(crate) fn normalize_base_url(url: String) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
