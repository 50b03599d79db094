//! Ordered dispatch of stream lines to listeners.
//!
//! Each worker owns one dispatcher: a dedicated OS thread draining a FIFO
//! queue, so slow listener code never stalls the socket read and listeners
//! observe events in feed order. Lifecycle notifications and failures travel
//! through the same queue to keep their ordering relative to events.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::stream::classify::classify;
use crate::stream::client::StreamClientError;
use crate::stream::event::{materialize, StreamEvent};
use crate::stream::listener::{ListenerSet, StreamListener};

const LOG_LINE_SNIPPET_LEN: usize = 200;

#[derive(Debug)]
pub(crate) enum DispatchJob {
    Line(String),
    Failure(Arc<StreamClientError>),
    Lifecycle(LifecycleEvent),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum LifecycleEvent {
    Connect,
    Disconnect,
    CleanUp,
}

/// Per-worker dispatch options.
#[derive(Clone, Debug)]
pub(crate) struct DispatchOptions {
    /// User streams deliver social events; status streams drop them.
    pub user_stream: bool,
    pub pretty_debug: bool,
}

/// Running dispatcher thread.
pub(crate) struct Dispatcher {
    jobs: mpsc::UnboundedSender<DispatchJob>,
    finished: oneshot::Receiver<()>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        thread_name: String,
        listeners: ListenerSet,
        options: DispatchOptions,
    ) -> Result<Self, StreamClientError> {
        let (jobs, mut queue) = mpsc::unbounded_channel();
        let (finished_tx, finished) = oneshot::channel();

        thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                while let Some(job) = queue.blocking_recv() {
                    run_job(&listeners, &options, job);
                }
                let _ = finished_tx.send(());
            })
            .map_err(StreamClientError::Io)?;

        Ok(Self { jobs, finished })
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<DispatchJob> {
        self.jobs.clone()
    }

    pub(crate) fn submit(&self, job: DispatchJob) {
        if self.jobs.send(job).is_err() {
            warn!(event = "dispatch_queue_closed");
        }
    }

    /// Closes the queue and waits until every queued job has run.
    pub(crate) async fn finish(self) {
        let Self { jobs, finished } = self;
        drop(jobs);
        let _ = finished.await;
    }
}

fn run_job(listeners: &ListenerSet, options: &DispatchOptions, job: DispatchJob) {
    match job {
        DispatchJob::Line(line) => process_line(listeners, options, &line),
        DispatchJob::Failure(error) => {
            for listener in &listeners.stream {
                guarded("on_exception", || listener.on_exception(&error));
            }
            for listener in &listeners.raw {
                guarded("on_exception", || listener.on_exception(&error));
            }
        }
        DispatchJob::Lifecycle(event) => {
            for listener in &listeners.lifecycle {
                match event {
                    LifecycleEvent::Connect => guarded("on_connect", || listener.on_connect()),
                    LifecycleEvent::Disconnect => {
                        guarded("on_disconnect", || listener.on_disconnect())
                    }
                    LifecycleEvent::CleanUp => guarded("on_clean_up", || listener.on_clean_up()),
                }
            }
        }
    }
}

/// Delivers one non-empty line: raw listeners first, then the typed event.
pub(crate) fn process_line(listeners: &ListenerSet, options: &DispatchOptions, line: &str) {
    for listener in &listeners.raw {
        guarded("on_message", || listener.on_message(line));
    }
    if listeners.stream.is_empty() {
        return;
    }

    let json: Value = match serde_json::from_str(line) {
        Ok(json) => json,
        Err(err) => {
            warn!(
                event = "stream_line_parse_failed",
                error = %err,
                line = %snippet(line)
            );
            return;
        }
    };
    if options.pretty_debug {
        debug!(
            event = "stream_line_received",
            json = %serde_json::to_string_pretty(&json).unwrap_or_default()
        );
    } else {
        debug!(event = "stream_line_received", json = %line);
    }

    let kind = classify(&json);
    if !options.user_stream && !kind.is_status_stream_kind() {
        warn!(event = "stream_event_unhandled", kind = %kind);
        return;
    }

    match materialize(kind, &json) {
        Ok(Some(event)) if !options.user_stream && event.is_user_stream_only() => {
            warn!(event = "stream_event_unhandled", kind = %kind);
        }
        Ok(Some(event)) => deliver(&listeners.stream, &event),
        Ok(None) => debug!(event = "stream_event_dropped", kind = %kind),
        Err(err) => warn!(
            event = "stream_event_malformed",
            kind = %kind,
            error = %err,
            line = %snippet(line)
        ),
    }
}

/// Invokes the one callback matching `event` on every listener, in order.
pub(crate) fn deliver(listeners: &[Arc<dyn StreamListener>], event: &StreamEvent) {
    if let StreamEvent::Unknown(json) = event {
        debug!(event = "stream_event_unknown", json = %json);
        return;
    }
    let callback = event.kind().as_str();
    for listener in listeners {
        guarded(callback, || route(listener.as_ref(), event));
    }
}

fn route(listener: &dyn StreamListener, event: &StreamEvent) {
    match event {
        StreamEvent::Status(status) => listener.on_status(status),
        StreamEvent::Deletion(notice) => listener.on_deletion_notice(notice),
        StreamEvent::DirectMessageDeletion {
            direct_message_id,
            user_id,
        } => listener.on_direct_message_deletion(*direct_message_id, *user_id),
        StreamEvent::TrackLimitation(undelivered) => {
            listener.on_track_limitation_notice(*undelivered)
        }
        StreamEvent::StallWarning(warning) => listener.on_stall_warning(warning),
        StreamEvent::ScrubGeo {
            user_id,
            up_to_status_id,
        } => listener.on_scrub_geo(*user_id, *up_to_status_id),
        StreamEvent::FriendList(ids) => listener.on_friend_list(ids),
        StreamEvent::Favorite {
            source,
            target,
            status,
        } => listener.on_favorite(source, target, status),
        StreamEvent::Unfavorite {
            source,
            target,
            status,
        } => listener.on_unfavorite(source, target, status),
        StreamEvent::Follow { source, followed } => listener.on_follow(source, followed),
        StreamEvent::Unfollow { source, unfollowed } => listener.on_unfollow(source, unfollowed),
        StreamEvent::Block { source, blocked } => listener.on_block(source, blocked),
        StreamEvent::Unblock { source, unblocked } => listener.on_unblock(source, unblocked),
        StreamEvent::Mute { source, muted } => listener.on_mute(source, muted),
        StreamEvent::Unmute { source, unmuted } => listener.on_unmute(source, unmuted),
        StreamEvent::UserListMemberAddition {
            member,
            owner,
            list,
        } => listener.on_user_list_member_addition(member, owner, list),
        StreamEvent::UserListMemberDeletion {
            member,
            owner,
            list,
        } => listener.on_user_list_member_deletion(member, owner, list),
        StreamEvent::UserListSubscription {
            subscriber,
            owner,
            list,
        } => listener.on_user_list_subscription(subscriber, owner, list),
        StreamEvent::UserListUnsubscription {
            subscriber,
            owner,
            list,
        } => listener.on_user_list_unsubscription(subscriber, owner, list),
        StreamEvent::UserListCreation { owner, list } => listener.on_user_list_creation(owner, list),
        StreamEvent::UserListUpdate { owner, list } => listener.on_user_list_update(owner, list),
        StreamEvent::UserListDeletion { owner, list } => listener.on_user_list_deletion(owner, list),
        StreamEvent::UserProfileUpdate(user) => listener.on_user_profile_update(user),
        StreamEvent::UserDeletion(user_id) => listener.on_user_deletion(*user_id),
        StreamEvent::UserSuspension(user_id) => listener.on_user_suspension(*user_id),
        StreamEvent::RetweetedRetweet {
            source,
            target,
            status,
        } => listener.on_retweeted_retweet(source, target, status),
        StreamEvent::FavoritedRetweet {
            source,
            target,
            status,
        } => listener.on_favorited_retweet(source, target, status),
        StreamEvent::QuotedTweet {
            source,
            target,
            status,
        } => listener.on_quoted_tweet(source, target, status),
        StreamEvent::Disconnection(notice) => listener.on_disconnection_notice(notice),
        StreamEvent::DirectMessage(message) | StreamEvent::Sender(message) => {
            listener.on_direct_message(message)
        }
        StreamEvent::Unknown(_) => {}
    }
}

fn guarded<F: FnOnce()>(callback: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(event = "listener_panicked", callback);
    }
}

fn snippet(line: &str) -> String {
    line.chars().take(LOG_LINE_SNIPPET_LEN).collect()
}
