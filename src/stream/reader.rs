//! Newline-delimited body reader.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;

use crate::retry::with_timeout;
use crate::stream::client::StreamClientError;
use crate::stream::dispatch::{process_line, DispatchJob, DispatchOptions};
use crate::stream::listener::ListenerSet;
use crate::transport::ByteStream;

/// Splits a byte stream into lines.
///
/// Line endings (`\n` or `\r\n`) are stripped. Invalid UTF-8 is replaced
/// rather than rejected so one bad byte cannot break the connection. A line
/// longer than `max_line_length` bytes fails the read with
/// [`StreamClientError::LineTooLong`].
pub struct LineReader {
    body: ByteStream,
    buffer: BytesMut,
    stall_timeout: Option<Duration>,
    max_line_length: usize,
    eof: bool,
}

impl LineReader {
    pub fn new(body: ByteStream, stall_timeout: Option<Duration>, max_line_length: usize) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            stall_timeout,
            max_line_length,
            eof: false,
        }
    }

    /// Reads the next line, which may be empty for keep-alive newlines.
    ///
    /// End of stream is reported as [`StreamClientError::StreamClosed`].
    pub async fn next_line(&mut self) -> Result<String, StreamClientError> {
        loop {
            if let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let line = self.buffer.split_to(position + 1);
                return Ok(decode_line(&line));
            }
            // No newline buffered, so the whole buffer is one partial line.
            if self.buffer.len() > self.max_line_length {
                self.buffer.clear();
                return Err(StreamClientError::LineTooLong(self.max_line_length));
            }
            if self.eof {
                if self.buffer.is_empty() {
                    return Err(StreamClientError::StreamClosed);
                }
                let rest = self.buffer.split();
                return Ok(decode_line(&rest));
            }

            let chunk = match self.stall_timeout {
                Some(timeout) => with_timeout(timeout, self.body.next())
                    .await
                    .map_err(|_| StreamClientError::Stalled(timeout))?,
                None => self.body.next().await,
            };
            match chunk {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => return Err(err),
                None => self.eof = true,
            }
        }
    }

    fn release(&mut self) {
        self.body = Box::pin(stream::empty::<Result<Bytes, StreamClientError>>());
        self.buffer.clear();
        self.eof = true;
    }
}

fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Supervised connection feeding a worker's dispatcher.
pub(crate) struct QueuedStream {
    reader: LineReader,
    jobs: mpsc::UnboundedSender<DispatchJob>,
    alive: bool,
}

impl QueuedStream {
    pub(crate) fn new(reader: LineReader, jobs: mpsc::UnboundedSender<DispatchJob>) -> Self {
        Self {
            reader,
            jobs,
            alive: true,
        }
    }

    /// Reads one line and queues it for dispatch. Blank keep-alive lines are
    /// skipped without being queued.
    pub(crate) async fn next(&mut self) -> Result<(), StreamClientError> {
        if !self.alive {
            return Err(StreamClientError::StreamClosed);
        }
        let line = self.reader.next_line().await?;
        if line.trim().is_empty() {
            return Ok(());
        }
        self.jobs
            .send(DispatchJob::Line(line))
            .map_err(|_| StreamClientError::Dispatcher("dispatcher stopped".to_string()))
    }

    /// Marks the stream dead and drops the response body. Idempotent.
    pub(crate) fn close(&mut self) {
        if self.alive {
            self.alive = false;
            self.reader.release();
        }
    }
}

/// Caller-driven stream over one connection, opened with
/// [`StreamClient::open`](crate::stream::StreamClient::open).
///
/// Each [`next`](Self::next) call reads one line and delivers it to the given
/// listeners on the calling task. Nothing reconnects: once a read fails the
/// stream is closed and every later call returns
/// [`StreamClientError::StreamClosed`].
pub struct StatusStream {
    reader: LineReader,
    options: DispatchOptions,
    alive: bool,
}

impl StatusStream {
    pub(crate) fn new(reader: LineReader, user_stream: bool, pretty_debug: bool) -> Self {
        Self {
            reader,
            options: DispatchOptions {
                user_stream,
                pretty_debug,
            },
            alive: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Reads one line and delivers it to `listeners`.
    ///
    /// Raw listeners see the line first, then typed listeners get the
    /// materialized event. A blank keep-alive line delivers nothing. Lifecycle
    /// listeners in the set are not notified.
    pub async fn next(&mut self, listeners: &ListenerSet) -> Result<(), StreamClientError> {
        if !self.alive {
            return Err(StreamClientError::StreamClosed);
        }
        let line = match self.reader.next_line().await {
            Ok(line) => line,
            Err(err) => {
                self.close();
                return Err(err);
            }
        };
        if !line.trim().is_empty() {
            process_line(listeners, &self.options, &line);
        }
        Ok(())
    }

    /// Drops the connection. Idempotent.
    pub fn close(&mut self) {
        if self.alive {
            self.alive = false;
            self.reader.release();
        }
    }
}
