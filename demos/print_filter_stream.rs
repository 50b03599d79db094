use std::error::Error;
use std::sync::Arc;

use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use tweetstream_sdk::stream::proto::{StallWarning, Status, StatusDeletionNotice};
use tweetstream_sdk::{
    BearerToken, ConnectionLifecycleListener, FilterQuery, StreamClient, StreamClientError,
    StreamListener,
};

struct PrintListener;

impl StreamListener for PrintListener {
    fn on_status(&self, status: &Status) {
        let author = status
            .user
            .as_ref()
            .map(|user| user.screen_name.as_str())
            .unwrap_or("?");
        println!("@{author} - {}", status.text);
    }

    fn on_deletion_notice(&self, notice: &StatusDeletionNotice) {
        println!("deleted status_id={}", notice.status_id);
    }

    fn on_track_limitation_notice(&self, undelivered: u64) {
        println!("track limitation undelivered={undelivered}");
    }

    fn on_stall_warning(&self, warning: &StallWarning) {
        println!("stall warning {} ({}% full)", warning.message, warning.percent_full);
    }

    fn on_exception(&self, error: &StreamClientError) {
        eprintln!("stream error: {error}");
    }
}

impl ConnectionLifecycleListener for PrintListener {
    fn on_connect(&self) {
        eprintln!("connected");
    }

    fn on_disconnect(&self) {
        eprintln!("disconnected");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let token = std::env::var("TWEETSTREAM_BEARER_TOKEN")
        .unwrap_or_else(|_| "REPLACE_WITH_BEARER_TOKEN".to_string());
    let keywords: Vec<String> = std::env::args().skip(1).collect();
    let query = if keywords.is_empty() {
        FilterQuery::of_track(["rust"])
    } else {
        FilterQuery::of_track(keywords)
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let auth = Arc::new(BearerToken::new(SecretString::new(token)));
        let mut client = StreamClient::new(auth)?;
        let listener = Arc::new(PrintListener);
        client.add_listener(listener.clone());
        client.add_lifecycle_listener(listener);

        let handle = client.filter(query)?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = handle.closed() => {}
        }
        client.shutdown().await;

        Ok::<(), Box<dyn Error>>(())
    })
}
