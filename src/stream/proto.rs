//! Domain objects carried by the stream.
//!
//! These serde types stand in for the domain-object factory: every
//! constructor is pure and reads from an already parsed JSON value. Fields
//! that are not modelled explicitly are kept in the flattened `extra` map.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub friends_count: u64,
    #[serde(default)]
    pub protected: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Status {
    pub id: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_status_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweeted_status: Option<Box<Status>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_status: Option<Box<Status>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Status {
    /// Returns `true` when this status is a retweet of another status.
    pub fn is_retweet(&self) -> bool {
        self.retweeted_status.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserList {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub member_count: u64,
    #[serde(default)]
    pub subscriber_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DirectMessage {
    pub id: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sender_id: u64,
    #[serde(default)]
    pub recipient_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<User>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Request to delete a status, read from `{"delete":{"status":{...}}}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusDeletionNotice {
    #[serde(rename = "id")]
    pub status_id: u64,
    #[serde(default)]
    pub user_id: u64,
}

/// Server warning that the client is falling behind, read from
/// `{"warning":{...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StallWarning {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub percent_full: u32,
}

/// Notice sent by the server right before it drops the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisconnectionNotice {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub stream_name: String,
    #[serde(default)]
    pub reason: String,
}

pub fn to_status(json: &Value) -> Result<Status, serde_json::Error> {
    Status::deserialize(json)
}

pub fn to_user(json: &Value) -> Result<User, serde_json::Error> {
    User::deserialize(json)
}

pub fn to_user_list(json: &Value) -> Result<UserList, serde_json::Error> {
    UserList::deserialize(json)
}

pub fn to_direct_message(json: &Value) -> Result<DirectMessage, serde_json::Error> {
    DirectMessage::deserialize(json)
}

/// Reads the `friends` array of a friend-list snapshot.
///
/// Ids are accepted as JSON numbers or numeric strings.
pub fn to_friend_ids(json: &Value) -> Result<Vec<u64>, serde_json::Error> {
    let friends = json.get("friends").unwrap_or(&Value::Null);
    let ids: Vec<LenientId> = Vec::deserialize(friends)?;
    Ok(ids.into_iter().map(|id| id.0).collect())
}

/// Reads an id from a number, a numeric string, or an object with `id`.
pub fn to_id(json: &Value) -> Result<u64, serde_json::Error> {
    match json {
        Value::Object(map) => match map.get("id") {
            Some(id) => LenientId::deserialize(id).map(|id| id.0),
            None => Err(serde::de::Error::missing_field("id")),
        },
        other => LenientId::deserialize(other).map(|id| id.0),
    }
}

struct LenientId(u64);

impl<'de> Deserialize<'de> for LenientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(id) => Ok(Self(id)),
            Raw::Text(text) => text
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| serde::de::Error::custom(format!("invalid id `{text}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{to_direct_message, to_friend_ids, to_id, to_status, to_user_list};

    #[test]
    fn status_keeps_unmodelled_fields() {
        let status = to_status(&json!({
            "id": 10,
            "text": "hello",
            "user": {"id": 3, "screen_name": "alice"},
            "favorite_count": 4
        }))
        .expect("status");

        assert_eq!(status.id, 10);
        assert_eq!(status.text, "hello");
        assert_eq!(status.user.as_ref().map(|u| u.screen_name.as_str()), Some("alice"));
        assert_eq!(status.extra.get("favorite_count"), Some(&json!(4)));
        assert!(!status.is_retweet());
    }

    #[test]
    fn retweet_nests_original_status() {
        let status = to_status(&json!({
            "id": 11,
            "text": "RT hello",
            "retweeted_status": {"id": 10, "text": "hello"}
        }))
        .expect("status");
        assert!(status.is_retweet());
        assert_eq!(status.retweeted_status.map(|s| s.id), Some(10));
    }

    #[test]
    fn friend_ids_accept_numbers_and_strings() {
        let ids = to_friend_ids(&json!({"friends": [1, "2", 3]})).expect("friend ids");
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn friend_ids_reject_garbage() {
        assert!(to_friend_ids(&json!({"friends": ["x"]})).is_err());
        assert!(to_friend_ids(&json!({"friends": null})).is_err());
    }

    #[test]
    fn user_id_accepts_all_shapes() {
        assert_eq!(to_id(&json!(7)).expect("number"), 7);
        assert_eq!(to_id(&json!("8")).expect("string"), 8);
        assert_eq!(to_id(&json!({"id": 9})).expect("object"), 9);
        assert!(to_id(&json!({"screen_name": "x"})).is_err());
    }

    #[test]
    fn list_and_direct_message_parse() {
        let list = to_user_list(&json!({"id": 5, "name": "rustaceans", "member_count": 2}))
            .expect("list");
        assert_eq!(list.name, "rustaceans");
        assert_eq!(list.member_count, 2);

        let message = to_direct_message(&json!({
            "id": 1,
            "text": "hi",
            "sender_id": 2,
            "recipient_id": 3
        }))
        .expect("direct message");
        assert_eq!(message.sender_id, 2);
        assert_eq!(message.recipient_id, 3);
    }
}
