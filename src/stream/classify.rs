//! Structural classification of stream lines.
//!
//! A line's kind is decided purely by which top-level keys are present (and
//! non-null). Unrecognized shapes map to [`EventKind::Unknown`]; that is not
//! an error, only a future or unsupported event type.

use std::fmt;

use serde_json::Value;

/// Closed set of event kinds carried by the stream.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    Sender,
    Status,
    DirectMessage,
    Delete,
    Limit,
    StallWarning,
    ScrubGeo,
    Friends,
    Favorite,
    Unfavorite,
    Follow,
    Unfollow,
    UserListMemberAdded,
    UserListMemberDeleted,
    UserListSubscribed,
    UserListUnsubscribed,
    UserListCreated,
    UserListUpdated,
    UserListDestroyed,
    UserUpdate,
    UserDelete,
    UserSuspend,
    Block,
    Unblock,
    RetweetedRetweet,
    FavoritedRetweet,
    QuotedTweet,
    Mute,
    Unmute,
    Disconnection,
    Unknown,
}

impl EventKind {
    /// Kinds delivered by every stream mode. The rest only appear on user
    /// streams.
    pub fn is_status_stream_kind(self) -> bool {
        matches!(
            self,
            Self::Status
                | Self::Delete
                | Self::Limit
                | Self::StallWarning
                | Self::ScrubGeo
                | Self::Disconnection
                | Self::Unknown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Status => "status",
            Self::DirectMessage => "direct_message",
            Self::Delete => "delete",
            Self::Limit => "limit",
            Self::StallWarning => "stall_warning",
            Self::ScrubGeo => "scrub_geo",
            Self::Friends => "friends",
            Self::Favorite => "favorite",
            Self::Unfavorite => "unfavorite",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::UserListMemberAdded => "list_member_added",
            Self::UserListMemberDeleted => "list_member_removed",
            Self::UserListSubscribed => "list_user_subscribed",
            Self::UserListUnsubscribed => "list_user_unsubscribed",
            Self::UserListCreated => "list_created",
            Self::UserListUpdated => "list_updated",
            Self::UserListDestroyed => "list_destroyed",
            Self::UserUpdate => "user_update",
            Self::UserDelete => "user_delete",
            Self::UserSuspend => "user_suspend",
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::RetweetedRetweet => "retweeted_retweet",
            Self::FavoritedRetweet => "favorited_retweet",
            Self::QuotedTweet => "quoted_tweet",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Disconnection => "disconnect",
            Self::Unknown => "unknown",
        }
    }

    fn from_event_name(name: &str) -> Self {
        match name {
            "favorite" => Self::Favorite,
            "unfavorite" => Self::Unfavorite,
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            "list_member_added" => Self::UserListMemberAdded,
            "list_member_removed" => Self::UserListMemberDeleted,
            "list_user_subscribed" => Self::UserListSubscribed,
            "list_user_unsubscribed" => Self::UserListUnsubscribed,
            "list_created" => Self::UserListCreated,
            "list_updated" => Self::UserListUpdated,
            "list_destroyed" => Self::UserListDestroyed,
            "user_update" => Self::UserUpdate,
            "user_delete" => Self::UserDelete,
            "user_suspend" => Self::UserSuspend,
            "block" => Self::Block,
            "unblock" => Self::Unblock,
            "retweeted_retweet" => Self::RetweetedRetweet,
            "favorited_retweet" => Self::FavoritedRetweet,
            "quoted_tweet" => Self::QuotedTweet,
            "mute" => Self::Mute,
            "unmute" => Self::Unmute,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the kind of one parsed stream line.
pub fn classify(json: &Value) -> EventKind {
    let Some(object) = json.as_object() else {
        return EventKind::Unknown;
    };
    let has = |key: &str| object.get(key).is_some_and(|value| !value.is_null());

    if has("sender") {
        EventKind::Sender
    } else if has("text") {
        EventKind::Status
    } else if has("direct_message") {
        EventKind::DirectMessage
    } else if has("delete") {
        EventKind::Delete
    } else if has("limit") {
        EventKind::Limit
    } else if has("warning") {
        EventKind::StallWarning
    } else if has("scrub_geo") {
        EventKind::ScrubGeo
    } else if has("friends") {
        EventKind::Friends
    } else if has("event") {
        object
            .get("event")
            .and_then(Value::as_str)
            .map(EventKind::from_event_name)
            .unwrap_or(EventKind::Unknown)
    } else if has("disconnect") {
        EventKind::Disconnection
    } else {
        EventKind::Unknown
    }
}
