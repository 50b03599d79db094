//! Streaming feed modules.
//!
//! - `client`: stream client, connection supervisor, and worker handle.
//! - `config`: connection settings and defaults.
//! - `proto`: domain objects carried by the feed.
//! - `classify` / `event`: line classification and typed events.
//! - `listener`: listener traits and registry.
//! - `reader` / `dispatch`: line reading and the ordered dispatch thread.

/// Line classification.
pub mod classify;
/// Stream client, supervisor, and handle.
pub mod client;
/// Connection settings.
pub mod config;
/// Dispatcher thread that invokes listeners in feed order.
pub mod dispatch;
/// Typed events and materialization.
pub mod event;
/// Listener traits.
pub mod listener;
/// Domain objects.
pub mod proto;
/// Newline-delimited body reader.
pub mod reader;

use std::fmt;

pub use client::{StreamClient, StreamClientError, StreamHandle, StreamState};
pub use config::{StreamConfig, StreamDefaults};
pub use listener::{ConnectionLifecycleListener, ListenerSet, RawStreamListener, StreamListener};
pub use reader::StatusStream;

use crate::stream::config::normalize_base_url;

/// GET sends parameters as a query string, POST as a form body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Fully resolved request for one connection attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
}

/// Subscription kind and its parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMode {
    /// Random sample of public statuses, optionally narrowed by language.
    Sample { language: Vec<String> },
    Filter(FilterQuery),
    /// All public statuses, replaying `count` backlog messages first.
    Firehose { count: i32 },
    /// Public statuses containing links.
    Links { count: i32 },
    Retweet,
    /// Events for the authenticating user, optionally with tracked keywords.
    User { track: Vec<String> },
}

impl StreamMode {
    /// Short name used in logs and the worker span.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sample { .. } => "sample",
            Self::Filter(_) => "filter",
            Self::Firehose { .. } => "firehose",
            Self::Links { .. } => "links",
            Self::Retweet => "retweet",
            Self::User { .. } => "user",
        }
    }

    /// User streams carry social events in addition to statuses.
    pub fn is_user_stream(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Builds the request for this mode against the configured endpoints.
    pub fn request(&self, config: &StreamConfig) -> StreamRequest {
        let stream_base = normalize_base_url(config.stream_base_url.clone());
        let mut params = Vec::new();

        let (method, url) = match self {
            Self::Sample { language } => {
                if !language.is_empty() {
                    params.push(("language".to_string(), language.join(",")));
                }
                (HttpMethod::Get, format!("{stream_base}statuses/sample.json"))
            }
            Self::Filter(query) => {
                params.extend(query.to_params());
                (HttpMethod::Post, format!("{stream_base}statuses/filter.json"))
            }
            Self::Firehose { count } => {
                params.push(("count".to_string(), count.to_string()));
                (HttpMethod::Post, format!("{stream_base}statuses/firehose.json"))
            }
            Self::Links { count } => {
                params.push(("count".to_string(), count.to_string()));
                (HttpMethod::Post, format!("{stream_base}statuses/links.json"))
            }
            Self::Retweet => (HttpMethod::Post, format!("{stream_base}statuses/retweet.json")),
            Self::User { track } => {
                if config.user_stream_replies_all {
                    params.push(("replies".to_string(), "all".to_string()));
                }
                if !track.is_empty() {
                    params.push(("track".to_string(), track.join(",")));
                }
                let user_base = normalize_base_url(config.user_stream_base_url.clone());
                (HttpMethod::Post, format!("{user_base}user.json"))
            }
        };

        params.push(("stall_warnings".to_string(), config.stall_warnings.to_string()));
        StreamRequest {
            method,
            url,
            params,
        }
    }
}

/// Server-side filtering of low-value statuses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterLevel {
    None,
    Low,
    Medium,
}

impl FilterLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
        }
    }
}

impl fmt::Display for FilterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicates for the filter stream.
///
/// At least one of `follow`, `track`, or `locations` must be set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterQuery {
    pub count: Option<i32>,
    pub follow: Vec<u64>,
    pub track: Vec<String>,
    /// Bounding boxes as `[longitude, latitude]` corners, south-west first.
    pub locations: Vec<[f64; 2]>,
    pub language: Vec<String>,
    pub filter_level: Option<FilterLevel>,
}

impl FilterQuery {
    /// Empty query. Fails [`validate`](Self::validate) until a predicate is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query tracking the given keywords.
    pub fn of_track<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().track(keywords)
    }

    /// Query following the given user ids.
    pub fn of_follow(user_ids: impl IntoIterator<Item = u64>) -> Self {
        Self::new().follow(user_ids)
    }

    /// Query matching statuses inside the given bounding boxes.
    pub fn of_locations(corners: impl IntoIterator<Item = [f64; 2]>) -> Self {
        Self::new().locations(corners)
    }

    /// Backlog messages to replay on connect.
    pub fn count(mut self, count: i32) -> Self {
        self.count = Some(count);
        self
    }

    /// Replaces the followed user ids.
    pub fn follow(mut self, user_ids: impl IntoIterator<Item = u64>) -> Self {
        self.follow = user_ids.into_iter().collect();
        self
    }

    /// Replaces the tracked keywords.
    pub fn track<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.track = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the bounding boxes. Corners are `[longitude, latitude]`.
    pub fn locations(mut self, corners: impl IntoIterator<Item = [f64; 2]>) -> Self {
        self.locations = corners.into_iter().collect();
        self
    }

    /// Restricts matches to the given language codes.
    pub fn language<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.language = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Minimum `filter_level` a status must carry to be delivered.
    pub fn filter_level(mut self, level: FilterLevel) -> Self {
        self.filter_level = Some(level);
        self
    }

    /// Rejects a query with no follow, track, or locations predicate, or
    /// with a non-finite coordinate.
    pub fn validate(&self) -> Result<(), StreamClientError> {
        if self.follow.is_empty() && self.track.is_empty() && self.locations.is_empty() {
            return Err(StreamClientError::InvalidQuery(
                "at least one of follow, track, or locations must be set".to_string(),
            ));
        }
        if self
            .locations
            .iter()
            .flatten()
            .any(|coordinate| !coordinate.is_finite())
        {
            return Err(StreamClientError::InvalidQuery(
                "locations must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }

    /// Form parameters in wire order, without `stall_warnings`.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(count) = self.count {
            params.push(("count".to_string(), count.to_string()));
        }
        if !self.follow.is_empty() {
            params.push(("follow".to_string(), join(&self.follow)));
        }
        if !self.track.is_empty() {
            params.push(("track".to_string(), self.track.join(",")));
        }
        if !self.locations.is_empty() {
            params.push(("locations".to_string(), join(self.locations.iter().flatten())));
        }
        if !self.language.is_empty() {
            params.push(("language".to_string(), self.language.join(",")));
        }
        if let Some(level) = self.filter_level {
            params.push(("filter_level".to_string(), level.to_string()));
        }
        params
    }
}

fn join<T: fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::{FilterLevel, FilterQuery, HttpMethod, StreamConfig, StreamMode};

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn sample_is_a_get_with_optional_language() {
        let config = StreamConfig::default();
        let request = StreamMode::Sample {
            language: vec!["en".to_string(), "ja".to_string()],
        }
        .request(&config);

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://stream.twitter.com/1.1/statuses/sample.json");
        assert_eq!(param(&request.params, "language"), Some("en,ja"));
        assert_eq!(param(&request.params, "stall_warnings"), Some("true"));
    }

    #[test]
    fn filter_renders_all_predicates_in_order() {
        let query = FilterQuery::of_track(["rust", "tokio"])
            .follow([1, 2])
            .locations([[-122.75, 36.8], [-121.75, 37.8]])
            .language(["en"])
            .count(10)
            .filter_level(FilterLevel::Low);
        let request = StreamMode::Filter(query).request(&StreamConfig::default());

        assert_eq!(request.method, HttpMethod::Post);
        assert!(request.url.ends_with("statuses/filter.json"));
        let names: Vec<_> = request.params.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "count",
                "follow",
                "track",
                "locations",
                "language",
                "filter_level",
                "stall_warnings"
            ]
        );
        assert_eq!(param(&request.params, "follow"), Some("1,2"));
        assert_eq!(param(&request.params, "track"), Some("rust,tokio"));
        assert_eq!(
            param(&request.params, "locations"),
            Some("-122.75,36.8,-121.75,37.8")
        );
        assert_eq!(param(&request.params, "filter_level"), Some("low"));
    }

    #[test]
    fn filter_query_requires_a_predicate() {
        assert!(FilterQuery::new().language(["en"]).validate().is_err());
        assert!(FilterQuery::of_follow([7]).validate().is_ok());
        assert!(FilterQuery::of_locations([[f64::NAN, 1.0]]).validate().is_err());
    }

    #[test]
    fn user_stream_uses_user_base_and_replies_flag() {
        let config = StreamConfig::default()
            .with_user_stream_replies_all(true)
            .with_stall_warnings(false);
        let request = StreamMode::User {
            track: vec!["rust".to_string()],
        }
        .request(&config);

        assert_eq!(request.url, "https://userstream.twitter.com/1.1/user.json");
        assert_eq!(param(&request.params, "replies"), Some("all"));
        assert_eq!(param(&request.params, "track"), Some("rust"));
        assert_eq!(param(&request.params, "stall_warnings"), Some("false"));
    }

    #[test]
    fn count_modes_post_backlog_count() {
        let config = StreamConfig::default();
        let firehose = StreamMode::Firehose { count: -500 }.request(&config);
        assert!(firehose.url.ends_with("statuses/firehose.json"));
        assert_eq!(param(&firehose.params, "count"), Some("-500"));

        let links = StreamMode::Links { count: 0 }.request(&config);
        assert!(links.url.ends_with("statuses/links.json"));

        let retweet = StreamMode::Retweet.request(&config);
        assert_eq!(retweet.method, HttpMethod::Post);
        assert_eq!(retweet.params.len(), 1);
    }
}
