//! Ping Pong Demo
//!
//! Two Courier instances in one process, connected by an in-process hub:
//!
//! ```text
//! ping (client) ──Ping{seq}──▶ hub ──▶ pong (server): authentication
//!                                                     → required-features
//!                                                     → handler
//! ping (client) ◀──────────── reply ◀──────────────────┘
//! ```
//!
//! `courier.toml` beside this file enables the `pong` feature and the
//! `demo-token` bearer token. Try `--token wrong` or `COURIER_FEATURES__ENABLED=[]`
//! to see the pipeline reject calls.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package ping-pong -- --count 5 --token demo-token
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use courier::prelude::*;
use courier::runtime::ConfigLoader;
use serde_json::json;
use tracing::{error, info, warn};

/// Command line options.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file shared by both instances.
    #[arg(long, default_value = "courier.toml")]
    config: PathBuf,

    /// Number of pings to send.
    #[arg(long, default_value_t = 3)]
    count: u64,

    /// Delay between pings in milliseconds.
    #[arg(long, default_value_t = 250)]
    interval_ms: u64,

    /// Bearer token attached to each ping.
    #[arg(long)]
    token: Option<String>,
}

#[derive(Debug, Message)]
#[message(name = "ping", requires("pong"))]
struct Ping {
    seq: u64,
}

#[derive(Debug, Message)]
#[message(name = "notice")]
struct Notice {
    text: String,
}

struct PingHandler;

#[async_trait::async_trait]
impl Handler<Ping> for PingHandler {
    async fn handle(&self, ping: Arc<Ping>, ctx: &DispatchContext) -> DispatchResult<Value> {
        let caller = ctx.identity().map(|identity| identity.subject.as_str());
        Ok(json!({ "pong": ping.seq, "caller": caller }))
    }
}

fn instance(config: &CourierConfig, id: &str) -> CourierConfig {
    let mut config = config.clone();
    config.app.app_id = Some("ping-pong".into());
    config.app.instance_id = Some(id.into());
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = if args.config.exists() {
        ConfigLoader::new().file(&args.config)
    } else {
        ConfigLoader::new().with_current_dir()
    };
    let config = loader.load().context("failed to load configuration")?;
    let hub = InProcessHub::new();

    let server = CourierRuntime::builder()
        .config(instance(&config, "pong"))
        .hub(hub.clone())
        .handler::<Ping, _>(PingHandler)
        .handler::<Notice, _>(handler_fn(|notice: Arc<Notice>| async move {
            info!(text = %notice.text, "Notice received");
            Ok(Value::Null)
        }))
        .build()?;

    let client = CourierRuntime::builder()
        .config(instance(&config, "ping"))
        .hub(hub.clone())
        .without_logging()
        .build()?;

    server.start()?;
    client.start()?;

    for seq in 1..=args.count {
        let mut envelope = Envelope::new(Ping { seq }).to(Endpoint::instance("pong"));
        if let Some(token) = &args.token {
            envelope = envelope.with_bearer_token(token.clone());
        }

        match client.request(envelope).await {
            Ok(reply) => info!(seq, %reply, "Reply received"),
            Err(err @ DispatchError::FeatureUnavailable { .. }) => {
                warn!(seq, error = %err, "Ping rejected by the server");
            }
            Err(err) => error!(seq, error = %err, "Ping failed"),
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    client
        .send(Envelope::new(Notice {
            text: "bye".into(),
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    info!(client = ?client.stats(), server = ?server.stats(), "Done");
    client.stop().await;
    server.stop().await;
    Ok(())
}
