//! Stream client and connection supervisor.
//!
//! [`StreamClient`] owns the listener registry and starts at most one worker
//! at a time. Each worker is a tokio task that connects, reads lines into its
//! dispatcher, and reconnects with class-specific backoff until it is closed
//! or the server rejects the request outright.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::auth::StreamAuth;
use crate::retry::{BackoffClass, BackoffState};
use crate::stream::config::StreamConfig;
use crate::stream::dispatch::{DispatchJob, DispatchOptions, Dispatcher, LifecycleEvent};
use crate::stream::listener::{
    ConnectionLifecycleListener, ListenerSet, RawStreamListener, StreamListener,
};
use crate::stream::reader::{LineReader, QueuedStream, StatusStream};
use crate::stream::{FilterQuery, StreamMode, StreamRequest};
use crate::transport::{read_error_body, HttpTransport, StreamTransport};

/// Entry point for opening stream subscriptions.
pub struct StreamClient {
    config: StreamConfig,
    transport: Arc<dyn StreamTransport>,
    listeners: ListenerSet,
    next_worker_id: u64,
    active: Option<StreamHandle>,
}

impl StreamClient {
    /// Creates a client using the HTTP transport and default settings.
    pub fn new(auth: Arc<dyn StreamAuth>) -> Result<Self, StreamClientError> {
        Self::with_options(StreamConfig::default(), auth)
    }

    /// Creates a client using the HTTP transport with custom settings.
    pub fn with_options(
        config: StreamConfig,
        auth: Arc<dyn StreamAuth>,
    ) -> Result<Self, StreamClientError> {
        let transport = HttpTransport::new(&config, auth)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(config: StreamConfig, transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            config,
            transport,
            listeners: ListenerSet::new(),
            next_worker_id: 0,
            active: None,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Registers a typed listener for the next started stream.
    pub fn add_listener(&mut self, listener: Arc<dyn StreamListener>) {
        self.listeners.push_stream(listener);
    }

    /// Registers a listener for unparsed lines.
    pub fn add_raw_listener(&mut self, listener: Arc<dyn RawStreamListener>) {
        self.listeners.push_raw(listener);
    }

    /// Registers a connect/disconnect/clean-up observer.
    pub fn add_lifecycle_listener(&mut self, listener: Arc<dyn ConnectionLifecycleListener>) {
        self.listeners.push_lifecycle(listener);
    }

    /// Removes every listener. A running worker keeps the set it started with.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Starts the public sample stream.
    pub fn sample(&mut self) -> Result<StreamHandle, StreamClientError> {
        self.start(StreamMode::Sample {
            language: Vec::new(),
        })
    }

    /// Starts the sample stream restricted to the given language codes.
    pub fn sample_language<I, S>(&mut self, language: I) -> Result<StreamHandle, StreamClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start(StreamMode::Sample {
            language: language.into_iter().map(Into::into).collect(),
        })
    }

    /// Starts the filter stream. The query is validated before any worker
    /// is spawned.
    pub fn filter(&mut self, query: FilterQuery) -> Result<StreamHandle, StreamClientError> {
        self.start(StreamMode::Filter(query))
    }

    /// Shorthand for [`filter`](Self::filter) with keyword tracking only.
    pub fn filter_track<I, S>(&mut self, keywords: I) -> Result<StreamHandle, StreamClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter(FilterQuery::of_track(keywords))
    }

    /// Starts the firehose, replaying `count` backlog messages first.
    pub fn firehose(&mut self, count: i32) -> Result<StreamHandle, StreamClientError> {
        self.start(StreamMode::Firehose { count })
    }

    /// Starts the stream of public statuses containing links.
    pub fn links(&mut self, count: i32) -> Result<StreamHandle, StreamClientError> {
        self.start(StreamMode::Links { count })
    }

    /// Starts the stream of public retweets.
    pub fn retweet(&mut self) -> Result<StreamHandle, StreamClientError> {
        self.start(StreamMode::Retweet)
    }

    /// Starts the authenticating user's stream, including social events.
    pub fn user(&mut self) -> Result<StreamHandle, StreamClientError> {
        self.start(StreamMode::User { track: Vec::new() })
    }

    /// Starts the user stream, also tracking the given keywords.
    pub fn user_track<I, S>(&mut self, keywords: I) -> Result<StreamHandle, StreamClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start(StreamMode::User {
            track: keywords.into_iter().map(Into::into).collect(),
        })
    }

    /// Starts a worker for `mode`, closing the previous one.
    ///
    /// The new worker waits until the previous worker has fully exited before
    /// it connects. Must be called from within a tokio runtime.
    pub fn start(&mut self, mode: StreamMode) -> Result<StreamHandle, StreamClientError> {
        if let StreamMode::Filter(query) = &mode {
            query.validate()?;
        }
        if !self.listeners.has_event_listeners() {
            return Err(StreamClientError::NoListeners);
        }
        let runtime =
            Handle::try_current().map_err(|err| StreamClientError::Runtime(err.to_string()))?;

        let previous = self.active.take();
        if let Some(previous) = previous.as_ref() {
            previous.close();
        }

        let id = self.next_worker_id;
        self.next_worker_id += 1;

        let (close_tx, close_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let handle = StreamHandle {
            id,
            close_tx: Arc::new(close_tx),
            state: state_rx,
        };

        let span = info_span!(
            "stream_worker",
            worker_id = id,
            thread = %self.config.thread_name,
            mode = mode.name()
        );
        let worker = StreamWorker {
            id,
            request: mode.request(&self.config),
            user_stream: mode.is_user_stream(),
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            listeners: self.listeners.clone(),
            close_rx,
            state_tx,
            previous,
            ever_connected: false,
            disconnect_pending: false,
        };
        runtime.spawn(worker.run().instrument(span));

        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Opens a single caller-driven connection for `mode`.
    ///
    /// No worker or dispatcher is involved: the caller reads with
    /// [`StatusStream::next`] and listeners run on the calling task. The
    /// connection is not retried; a non-success status is returned as
    /// [`StreamClientError::HttpStatus`].
    pub async fn open(&self, mode: StreamMode) -> Result<StatusStream, StreamClientError> {
        if let StreamMode::Filter(query) = &mode {
            query.validate()?;
        }
        let request = mode.request(&self.config);
        debug!(event = "stream_opening", mode = mode.name(), url = %request.url);
        let mut response = self.transport.open_stream(&request).await?;
        if !response.is_success() {
            let body = read_error_body(&mut response.body, self.config.error_body_timeout).await;
            return Err(StreamClientError::HttpStatus {
                status: response.status,
                body,
            });
        }
        info!(event = "stream_opened", mode = mode.name(), status = response.status);
        let reader = LineReader::new(
            response.body,
            self.config.stall_timeout,
            self.config.max_line_length,
        );
        Ok(StatusStream::new(
            reader,
            mode.is_user_stream(),
            self.config.pretty_debug,
        ))
    }

    /// Pull-style [`sample`](Self::sample).
    pub async fn open_sample(&self) -> Result<StatusStream, StreamClientError> {
        self.open(StreamMode::Sample {
            language: Vec::new(),
        })
        .await
    }

    /// Pull-style [`filter`](Self::filter).
    pub async fn open_filter(&self, query: FilterQuery) -> Result<StatusStream, StreamClientError> {
        self.open(StreamMode::Filter(query)).await
    }

    /// Pull-style [`firehose`](Self::firehose).
    pub async fn open_firehose(&self, count: i32) -> Result<StatusStream, StreamClientError> {
        self.open(StreamMode::Firehose { count }).await
    }

    /// Pull-style [`links`](Self::links).
    pub async fn open_links(&self, count: i32) -> Result<StatusStream, StreamClientError> {
        self.open(StreamMode::Links { count }).await
    }

    /// Pull-style [`retweet`](Self::retweet).
    pub async fn open_retweet(&self) -> Result<StatusStream, StreamClientError> {
        self.open(StreamMode::Retweet).await
    }

    /// Pull-style [`user`](Self::user).
    pub async fn open_user(&self) -> Result<StatusStream, StreamClientError> {
        self.open(StreamMode::User { track: Vec::new() }).await
    }

    /// Handle of the most recently started worker, if any.
    pub fn active(&self) -> Option<&StreamHandle> {
        self.active.as_ref()
    }

    /// Closes the active worker without waiting for it.
    pub fn clean_up(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.close();
        }
    }

    /// Closes the active worker and waits for `on_clean_up` to run.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.shutdown().await;
        }
    }
}

/// Observable state of one worker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Backoff {
        delay: Duration,
        class: BackoffClass,
    },
    Closed,
}

/// Cloneable control handle for one worker.
///
/// The worker closes once [`close`](Self::close) is called or every handle
/// (including the one kept by the client) is dropped.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    id: u64,
    close_tx: Arc<watch::Sender<bool>>,
    state: watch::Receiver<StreamState>,
}

impl StreamHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests the worker to stop. Safe to call repeatedly from any thread.
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    /// Closes the worker and waits until it has exited.
    pub async fn shutdown(&self) {
        self.close();
        self.closed().await;
    }

    /// Waits until the worker has exited and its listeners have been
    /// notified.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|state| *state == StreamState::Closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.state.borrow() == StreamState::Closed
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }
}

/// Errors produced by the stream client and its collaborators.
#[derive(Debug, Error)]
pub enum StreamClientError {
    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream closed by server")]
    StreamClosed,

    #[error("no data received for {0:?}")]
    Stalled(Duration),

    /// A line grew past the configured limit without a newline.
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stream was started with no typed or raw listener registered.
    #[error("no listeners registered")]
    NoListeners,

    #[error("invalid filter query: {0}")]
    InvalidQuery(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("tokio runtime unavailable: {0}")]
    Runtime(String),

    #[error("dispatcher error: {0}")]
    Dispatcher(String),
}

impl StreamClientError {
    /// HTTP status received from the server, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// 403 and 406 mean the account may not open this stream; retrying
    /// cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self.status_code(), Some(403) | Some(406))
    }

    /// HTTP class whenever the server answered, network class otherwise.
    pub fn backoff_class(&self) -> BackoffClass {
        if self.status_code().is_some() {
            BackoffClass::Http
        } else {
            BackoffClass::Network
        }
    }
}

enum SessionOutcome {
    Closed,
    Fatal,
    Retry(BackoffClass),
}

struct StreamWorker {
    id: u64,
    request: StreamRequest,
    user_stream: bool,
    config: StreamConfig,
    transport: Arc<dyn StreamTransport>,
    listeners: ListenerSet,
    close_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<StreamState>,
    previous: Option<StreamHandle>,
    ever_connected: bool,
    /// Set between a submitted `Connect` and its matching `Disconnect`.
    disconnect_pending: bool,
}

impl StreamWorker {
    async fn run(mut self) {
        let dispatcher = match Dispatcher::spawn(
            format!("{} dispatcher [{}]", self.config.thread_name, self.id),
            self.listeners.clone(),
            DispatchOptions {
                user_stream: self.user_stream,
                pretty_debug: self.config.pretty_debug,
            },
        ) {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                error!(event = "dispatcher_spawn_failed", error = %err);
                self.state_tx.send_replace(StreamState::Closed);
                return;
            }
        };

        let mut closed = false;
        if let Some(previous) = self.previous.take() {
            tokio::select! {
                biased;
                _ = close_requested(&mut self.close_rx) => closed = true,
                _ = previous.closed() => {}
            }
        }

        let mut backoff = BackoffState::new(self.config.network_backoff, self.config.http_backoff);
        while !closed && !*self.close_rx.borrow() {
            self.state_tx.send_replace(StreamState::Connecting);
            match self.run_connection(&dispatcher, &mut backoff).await {
                SessionOutcome::Closed | SessionOutcome::Fatal => break,
                SessionOutcome::Retry(class) => {
                    let delay = backoff.next_delay(class);
                    info!(
                        event = "stream_reconnect_scheduled",
                        class = ?class,
                        delay_ms = delay.as_millis() as u64
                    );
                    self.state_tx
                        .send_replace(StreamState::Backoff { delay, class });
                    tokio::select! {
                        biased;
                        _ = close_requested(&mut self.close_rx) => closed = true,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        dispatcher.submit(DispatchJob::Lifecycle(LifecycleEvent::CleanUp));
        dispatcher.finish().await;
        self.state_tx.send_replace(StreamState::Closed);
        info!(event = "stream_worker_stopped");
    }

    async fn run_connection(
        &mut self,
        dispatcher: &Dispatcher,
        backoff: &mut BackoffState,
    ) -> SessionOutcome {
        debug!(event = "stream_connecting", url = %self.request.url);
        let opened = tokio::select! {
            biased;
            _ = close_requested(&mut self.close_rx) => return SessionOutcome::Closed,
            opened = self.transport.open_stream(&self.request) => opened,
        };
        let mut response = match opened {
            Ok(response) => response,
            Err(err) => return self.fail(dispatcher, err),
        };

        if !response.is_success() {
            let body = tokio::select! {
                biased;
                _ = close_requested(&mut self.close_rx) => return SessionOutcome::Closed,
                body = read_error_body(&mut response.body, self.config.error_body_timeout) => body,
            };
            let err = StreamClientError::HttpStatus {
                status: response.status,
                body,
            };
            return self.fail(dispatcher, err);
        }

        info!(
            event = "stream_connected",
            status = response.status,
            network_backoff_ms = backoff.current_delay(BackoffClass::Network).as_millis() as u64,
            http_backoff_ms = backoff.current_delay(BackoffClass::Http).as_millis() as u64
        );
        backoff.reset();
        self.state_tx.send_replace(StreamState::Streaming);
        dispatcher.submit(DispatchJob::Lifecycle(LifecycleEvent::Connect));
        self.ever_connected = true;
        self.disconnect_pending = true;

        let reader = LineReader::new(
            response.body,
            self.config.stall_timeout,
            self.config.max_line_length,
        );
        let mut stream = QueuedStream::new(reader, dispatcher.sender());
        loop {
            let result = tokio::select! {
                biased;
                _ = close_requested(&mut self.close_rx) => {
                    stream.close();
                    self.disconnect(dispatcher);
                    return SessionOutcome::Closed;
                }
                result = stream.next() => result,
            };
            if let Err(err) = result {
                stream.close();
                return self.fail(dispatcher, err);
            }
        }
    }

    /// Emits `Disconnect` for the current connection, at most once.
    fn disconnect(&mut self, dispatcher: &Dispatcher) {
        if self.disconnect_pending {
            self.disconnect_pending = false;
            dispatcher.submit(DispatchJob::Lifecycle(LifecycleEvent::Disconnect));
        }
    }

    fn fail(&mut self, dispatcher: &Dispatcher, err: StreamClientError) -> SessionOutcome {
        let fatal = err.is_fatal();
        let class = err.backoff_class();
        if fatal {
            error!(event = "stream_rejected", error = %err);
        } else {
            warn!(event = "stream_connection_failed", class = ?class, error = %err);
        }

        if fatal && !self.ever_connected {
            // A rejected first attempt still tells lifecycle listeners the
            // session is gone.
            dispatcher.submit(DispatchJob::Lifecycle(LifecycleEvent::Disconnect));
        } else {
            self.disconnect(dispatcher);
        }
        dispatcher.submit(DispatchJob::Failure(Arc::new(err)));

        if fatal {
            SessionOutcome::Fatal
        } else {
            SessionOutcome::Retry(class)
        }
    }
}

/// Resolves once close is requested or every handle has been dropped.
async fn close_requested(close_rx: &mut watch::Receiver<bool>) {
    let _ = close_rx.wait_for(|closed| *closed).await;
}
