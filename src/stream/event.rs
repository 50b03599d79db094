//! Typed stream events.
//!
//! [`materialize`] turns a classified JSON line into a [`StreamEvent`]; the
//! dispatcher then routes the event to exactly one listener callback.

use serde::de::Error as _;
use serde_json::Value;

use crate::stream::classify::EventKind;
use crate::stream::proto::{
    to_direct_message, to_friend_ids, to_id, to_status, to_user, to_user_list,
    DirectMessage, DisconnectionNotice, StallWarning, Status, StatusDeletionNotice, User, UserList,
};

/// One materialized line of the feed.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Status(Status),
    Deletion(StatusDeletionNotice),
    /// `{"delete":{"direct_message":{...}}}`, delivered on user streams only.
    DirectMessageDeletion {
        direct_message_id: u64,
        user_id: u64,
    },
    /// Number of undelivered matching statuses since the connection opened.
    TrackLimitation(u64),
    StallWarning(StallWarning),
    ScrubGeo {
        user_id: u64,
        up_to_status_id: u64,
    },
    FriendList(Vec<u64>),
    Favorite {
        source: User,
        target: User,
        status: Status,
    },
    Unfavorite {
        source: User,
        target: User,
        status: Status,
    },
    Follow {
        source: User,
        followed: User,
    },
    Unfollow {
        source: User,
        unfollowed: User,
    },
    Block {
        source: User,
        blocked: User,
    },
    Unblock {
        source: User,
        unblocked: User,
    },
    Mute {
        source: User,
        muted: User,
    },
    Unmute {
        source: User,
        unmuted: User,
    },
    UserListMemberAddition {
        member: User,
        owner: User,
        list: UserList,
    },
    UserListMemberDeletion {
        member: User,
        owner: User,
        list: UserList,
    },
    UserListSubscription {
        subscriber: User,
        owner: User,
        list: UserList,
    },
    UserListUnsubscription {
        subscriber: User,
        owner: User,
        list: UserList,
    },
    UserListCreation {
        owner: User,
        list: UserList,
    },
    UserListUpdate {
        owner: User,
        list: UserList,
    },
    UserListDeletion {
        owner: User,
        list: UserList,
    },
    UserProfileUpdate(User),
    UserDeletion(u64),
    UserSuspension(u64),
    RetweetedRetweet {
        source: User,
        target: User,
        status: Status,
    },
    FavoritedRetweet {
        source: User,
        target: User,
        status: Status,
    },
    QuotedTweet {
        source: User,
        target: User,
        status: Status,
    },
    Disconnection(DisconnectionNotice),
    DirectMessage(DirectMessage),
    /// Direct message delivered as a bare object carrying `sender`.
    Sender(DirectMessage),
    Unknown(Value),
}

impl StreamEvent {
    /// Kind tag matching [`classify`](crate::stream::classify::classify).
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Status(_) => EventKind::Status,
            Self::Deletion(_) | Self::DirectMessageDeletion { .. } => EventKind::Delete,
            Self::TrackLimitation(_) => EventKind::Limit,
            Self::StallWarning(_) => EventKind::StallWarning,
            Self::ScrubGeo { .. } => EventKind::ScrubGeo,
            Self::FriendList(_) => EventKind::Friends,
            Self::Favorite { .. } => EventKind::Favorite,
            Self::Unfavorite { .. } => EventKind::Unfavorite,
            Self::Follow { .. } => EventKind::Follow,
            Self::Unfollow { .. } => EventKind::Unfollow,
            Self::Block { .. } => EventKind::Block,
            Self::Unblock { .. } => EventKind::Unblock,
            Self::Mute { .. } => EventKind::Mute,
            Self::Unmute { .. } => EventKind::Unmute,
            Self::UserListMemberAddition { .. } => EventKind::UserListMemberAdded,
            Self::UserListMemberDeletion { .. } => EventKind::UserListMemberDeleted,
            Self::UserListSubscription { .. } => EventKind::UserListSubscribed,
            Self::UserListUnsubscription { .. } => EventKind::UserListUnsubscribed,
            Self::UserListCreation { .. } => EventKind::UserListCreated,
            Self::UserListUpdate { .. } => EventKind::UserListUpdated,
            Self::UserListDeletion { .. } => EventKind::UserListDestroyed,
            Self::UserProfileUpdate(_) => EventKind::UserUpdate,
            Self::UserDeletion(_) => EventKind::UserDelete,
            Self::UserSuspension(_) => EventKind::UserSuspend,
            Self::RetweetedRetweet { .. } => EventKind::RetweetedRetweet,
            Self::FavoritedRetweet { .. } => EventKind::FavoritedRetweet,
            Self::QuotedTweet { .. } => EventKind::QuotedTweet,
            Self::Disconnection(_) => EventKind::Disconnection,
            Self::DirectMessage(_) => EventKind::DirectMessage,
            Self::Sender(_) => EventKind::Sender,
            Self::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Events that only a user stream may deliver.
    pub fn is_user_stream_only(&self) -> bool {
        match self {
            Self::DirectMessageDeletion { .. } => true,
            other => !other.kind().is_status_stream_kind(),
        }
    }
}

/// Builds the typed event for a classified line.
///
/// Returns `Ok(None)` for notices that carry nothing to deliver, such as a
/// deletion notice for neither a status nor a direct message.
pub fn materialize(kind: EventKind, json: &Value) -> Result<Option<StreamEvent>, serde_json::Error> {
    let event = match kind {
        EventKind::Sender => StreamEvent::Sender(to_direct_message(json)?),
        EventKind::Status => StreamEvent::Status(to_status(json)?),
        EventKind::DirectMessage => {
            StreamEvent::DirectMessage(to_direct_message(member(json, "direct_message")?)?)
        }
        EventKind::Delete => {
            let delete = member(json, "delete")?;
            if let Some(status) = delete.get("status").filter(|value| !value.is_null()) {
                StreamEvent::Deletion(serde::Deserialize::deserialize(status)?)
            } else if let Some(message) = delete
                .get("direct_message")
                .filter(|value| !value.is_null())
            {
                StreamEvent::DirectMessageDeletion {
                    direct_message_id: to_id(member(message, "id")?)?,
                    user_id: to_id(member(message, "user_id")?)?,
                }
            } else {
                return Ok(None);
            }
        }
        EventKind::Limit => {
            let track = member(member(json, "limit")?, "track")?;
            StreamEvent::TrackLimitation(to_id(track)?)
        }
        EventKind::StallWarning => {
            StreamEvent::StallWarning(serde::Deserialize::deserialize(member(json, "warning")?)?)
        }
        EventKind::ScrubGeo => {
            let scrub_geo = member(json, "scrub_geo")?;
            StreamEvent::ScrubGeo {
                user_id: to_id(member(scrub_geo, "user_id")?)?,
                up_to_status_id: to_id(member(scrub_geo, "up_to_status_id")?)?,
            }
        }
        EventKind::Friends => StreamEvent::FriendList(to_friend_ids(json)?),
        EventKind::Favorite => StreamEvent::Favorite {
            source: source(json)?,
            target: target(json)?,
            status: target_status(json)?,
        },
        EventKind::Unfavorite => StreamEvent::Unfavorite {
            source: source(json)?,
            target: target(json)?,
            status: target_status(json)?,
        },
        EventKind::Follow => StreamEvent::Follow {
            source: source(json)?,
            followed: target(json)?,
        },
        EventKind::Unfollow => StreamEvent::Unfollow {
            source: source(json)?,
            unfollowed: target(json)?,
        },
        EventKind::Block => StreamEvent::Block {
            source: source(json)?,
            blocked: target(json)?,
        },
        EventKind::Unblock => StreamEvent::Unblock {
            source: source(json)?,
            unblocked: target(json)?,
        },
        EventKind::Mute => StreamEvent::Mute {
            source: source(json)?,
            muted: target(json)?,
        },
        EventKind::Unmute => StreamEvent::Unmute {
            source: source(json)?,
            unmuted: target(json)?,
        },
        // Member events name the member as `target` and the list owner as
        // `source`.
        EventKind::UserListMemberAdded => StreamEvent::UserListMemberAddition {
            member: target(json)?,
            owner: source(json)?,
            list: target_list(json)?,
        },
        EventKind::UserListMemberDeleted => StreamEvent::UserListMemberDeletion {
            member: target(json)?,
            owner: source(json)?,
            list: target_list(json)?,
        },
        EventKind::UserListSubscribed => StreamEvent::UserListSubscription {
            subscriber: source(json)?,
            owner: target(json)?,
            list: target_list(json)?,
        },
        EventKind::UserListUnsubscribed => StreamEvent::UserListUnsubscription {
            subscriber: source(json)?,
            owner: target(json)?,
            list: target_list(json)?,
        },
        EventKind::UserListCreated => StreamEvent::UserListCreation {
            owner: source(json)?,
            list: target_list(json)?,
        },
        EventKind::UserListUpdated => StreamEvent::UserListUpdate {
            owner: source(json)?,
            list: target_list(json)?,
        },
        EventKind::UserListDestroyed => StreamEvent::UserListDeletion {
            owner: source(json)?,
            list: target_list(json)?,
        },
        EventKind::UserUpdate => StreamEvent::UserProfileUpdate(source(json)?),
        EventKind::UserDelete => StreamEvent::UserDeletion(to_id(member(json, "target")?)?),
        EventKind::UserSuspend => {
            StreamEvent::UserSuspension(to_id(member(json, "target")?)?)
        }
        EventKind::RetweetedRetweet => StreamEvent::RetweetedRetweet {
            source: source(json)?,
            target: target(json)?,
            status: target_status(json)?,
        },
        EventKind::FavoritedRetweet => StreamEvent::FavoritedRetweet {
            source: source(json)?,
            target: target(json)?,
            status: target_status(json)?,
        },
        EventKind::QuotedTweet => StreamEvent::QuotedTweet {
            source: source(json)?,
            target: target(json)?,
            status: target_status(json)?,
        },
        EventKind::Disconnection => StreamEvent::Disconnection(serde::Deserialize::deserialize(
            member(json, "disconnect")?,
        )?),
        EventKind::Unknown => StreamEvent::Unknown(json.clone()),
    };
    Ok(Some(event))
}

fn member<'a>(json: &'a Value, key: &'static str) -> Result<&'a Value, serde_json::Error> {
    match json.get(key) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(serde_json::Error::missing_field(key)),
    }
}

fn source(json: &Value) -> Result<User, serde_json::Error> {
    to_user(member(json, "source")?)
}

fn target(json: &Value) -> Result<User, serde_json::Error> {
    to_user(member(json, "target")?)
}

fn target_status(json: &Value) -> Result<Status, serde_json::Error> {
    to_status(member(json, "target_object")?)
}

fn target_list(json: &Value) -> Result<UserList, serde_json::Error> {
    to_user_list(member(json, "target_object")?)
}
