use std::error::Error;
use std::sync::Arc;

use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use tweetstream_sdk::stream::proto::{DirectMessage, Status, User, UserList};
use tweetstream_sdk::{BearerToken, StreamClient, StreamClientError, StreamConfig, StreamListener};

struct PrintUserListener;

impl StreamListener for PrintUserListener {
    fn on_status(&self, status: &Status) {
        println!("status {}: {}", status.id, status.text);
    }

    fn on_friend_list(&self, friend_ids: &[u64]) {
        println!("following {} accounts", friend_ids.len());
    }

    fn on_favorite(&self, source: &User, target: &User, status: &Status) {
        println!("@{} favorited @{}'s status {}", source.screen_name, target.screen_name, status.id);
    }

    fn on_follow(&self, source: &User, followed: &User) {
        println!("@{} followed @{}", source.screen_name, followed.screen_name);
    }

    fn on_direct_message(&self, message: &DirectMessage) {
        println!("dm from {}: {}", message.sender_id, message.text);
    }

    fn on_user_list_member_addition(&self, member: &User, owner: &User, list: &UserList) {
        println!("@{} added @{} to {}", owner.screen_name, member.screen_name, list.full_name);
    }

    fn on_exception(&self, error: &StreamClientError) {
        eprintln!("stream error: {error}");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let token = std::env::var("TWEETSTREAM_BEARER_TOKEN")
        .unwrap_or_else(|_| "REPLACE_WITH_BEARER_TOKEN".to_string());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let config = StreamConfig::default()
            .with_user_stream_replies_all(true)
            .with_pretty_debug(true);
        let auth = Arc::new(BearerToken::new(SecretString::new(token)));
        let mut client = StreamClient::with_options(config, auth)?;
        client.add_listener(Arc::new(PrintUserListener));

        client.user()?;
        tokio::signal::ctrl_c().await?;
        client.shutdown().await;

        Ok::<(), Box<dyn Error>>(())
    })
}
