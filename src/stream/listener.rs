//! Listener traits and the ordered registry handed to each worker.
//!
//! Every callback has a no-op default so implementors only override what they
//! care about. Callbacks run on the session's dispatcher thread, one at a
//! time, in feed order.

use std::fmt;
use std::sync::Arc;

use crate::stream::client::StreamClientError;
use crate::stream::proto::{
    DirectMessage, DisconnectionNotice, StallWarning, Status, StatusDeletionNotice, User, UserList,
};

/// Receives materialized events.
#[allow(unused_variables)]
pub trait StreamListener: Send + Sync {
    fn on_status(&self, status: &Status) {}

    fn on_deletion_notice(&self, notice: &StatusDeletionNotice) {}

    /// A direct message was deleted. User streams only.
    fn on_direct_message_deletion(&self, direct_message_id: u64, user_id: u64) {}

    /// Called with the number of matching statuses withheld by the server.
    fn on_track_limitation_notice(&self, undelivered: u64) {}

    fn on_stall_warning(&self, warning: &StallWarning) {}

    fn on_scrub_geo(&self, user_id: u64, up_to_status_id: u64) {}

    fn on_disconnection_notice(&self, notice: &DisconnectionNotice) {}

    fn on_friend_list(&self, friend_ids: &[u64]) {}

    fn on_favorite(&self, source: &User, target: &User, status: &Status) {}

    fn on_unfavorite(&self, source: &User, target: &User, status: &Status) {}

    fn on_follow(&self, source: &User, followed: &User) {}

    fn on_unfollow(&self, source: &User, unfollowed: &User) {}

    fn on_block(&self, source: &User, blocked: &User) {}

    fn on_unblock(&self, source: &User, unblocked: &User) {}

    fn on_mute(&self, source: &User, muted: &User) {}

    fn on_unmute(&self, source: &User, unmuted: &User) {}

    fn on_direct_message(&self, message: &DirectMessage) {}

    fn on_user_list_member_addition(&self, member: &User, owner: &User, list: &UserList) {}

    fn on_user_list_member_deletion(&self, member: &User, owner: &User, list: &UserList) {}

    fn on_user_list_subscription(&self, subscriber: &User, owner: &User, list: &UserList) {}

    fn on_user_list_unsubscription(&self, subscriber: &User, owner: &User, list: &UserList) {}

    fn on_user_list_creation(&self, owner: &User, list: &UserList) {}

    fn on_user_list_update(&self, owner: &User, list: &UserList) {}

    fn on_user_list_deletion(&self, owner: &User, list: &UserList) {}

    fn on_user_profile_update(&self, user: &User) {}

    fn on_user_deletion(&self, user_id: u64) {}

    fn on_user_suspension(&self, user_id: u64) {}

    fn on_retweeted_retweet(&self, source: &User, target: &User, status: &Status) {}

    fn on_favorited_retweet(&self, source: &User, target: &User, status: &Status) {}

    fn on_quoted_tweet(&self, source: &User, target: &User, status: &Status) {}

    /// Called for every connection failure, including ones that are retried.
    fn on_exception(&self, error: &StreamClientError) {}
}

/// Receives every line exactly as read from the wire, before parsing.
#[allow(unused_variables)]
pub trait RawStreamListener: Send + Sync {
    fn on_message(&self, line: &str);

    fn on_exception(&self, error: &StreamClientError) {}
}

impl<F> RawStreamListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_message(&self, line: &str) {
        self(line)
    }
}

/// Observes connection lifecycle transitions.
pub trait ConnectionLifecycleListener: Send + Sync {
    /// The transport returned a streaming response and reading has begun.
    fn on_connect(&self) {}

    /// An established connection was lost or closed.
    fn on_disconnect(&self) {}

    /// The worker has exited and will not reconnect.
    fn on_clean_up(&self) {}
}

/// Ordered listener snapshot used by one worker.
#[derive(Clone, Default)]
pub struct ListenerSet {
    pub(crate) stream: Vec<Arc<dyn StreamListener>>,
    pub(crate) raw: Vec<Arc<dyn RawStreamListener>>,
    pub(crate) lifecycle: Vec<Arc<dyn ConnectionLifecycleListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a typed listener. Dispatch follows insertion order.
    pub fn push_stream(&mut self, listener: Arc<dyn StreamListener>) {
        self.stream.push(listener);
    }

    /// Appends a raw line listener.
    pub fn push_raw(&mut self, listener: Arc<dyn RawStreamListener>) {
        self.raw.push(listener);
    }

    /// Appends a lifecycle observer.
    pub fn push_lifecycle(&mut self, listener: Arc<dyn ConnectionLifecycleListener>) {
        self.lifecycle.push(listener);
    }

    pub fn clear(&mut self) {
        self.stream.clear();
        self.raw.clear();
        self.lifecycle.clear();
    }

    /// Returns `true` when nothing would receive events.
    ///
    /// Lifecycle listeners alone do not count.
    pub fn has_event_listeners(&self) -> bool {
        !self.stream.is_empty() || !self.raw.is_empty()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("stream", &self.stream.len())
            .field("raw", &self.raw.len())
            .field("lifecycle", &self.lifecycle.len())
            .finish()
    }
}
