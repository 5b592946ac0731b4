//! storefront-engine - rank a feed from the content store and watch live topics

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_engine::{EngineConfig, EngineContext, Topic};

/// Client-side feed ranking, resource cache and live updates for the storefront
#[derive(Parser, Debug, Clone)]
#[command(name = "storefront-engine")]
#[command(about = "Rank a storefront feed and watch live topics")]
struct Args {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, short, env = "STOREFRONT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Content store path serving the candidate list
    #[arg(long, env = "FEED_PATH", default_value = "/api/products")]
    feed_path: String,

    /// Route whose critical resources are preloaded first
    #[arg(long, env = "ENTRY_ROUTE", default_value = "/")]
    route: String,

    /// Topics to watch after printing the feed, as `data_type[:param]`
    #[arg(long = "watch", value_name = "TOPIC")]
    watch: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("storefront_engine={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EngineConfig::load(args.config.as_deref())?;
    let ctx = match EngineContext::from_config(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        content_store = %ctx.config().content_store.base_url,
        live = ctx.config().live.endpoint_url.as_deref().unwrap_or("(polling)"),
        "storefront-engine starting"
    );

    ctx.start();
    ctx.loader()
        .on_trigger(&storefront_engine::LoadTrigger::RouteEntry {
            route: args.route.clone(),
        })
        .await;

    let feed = ctx.feed_from_store(&args.feed_path).await;
    if feed.is_empty() {
        warn!(path = %args.feed_path, "Feed is empty");
    }
    println!("{}", serde_json::to_string_pretty(&feed)?);

    let topics: Vec<Topic> = args
        .watch
        .iter()
        .filter_map(|raw| {
            let topic = Topic::parse(raw);
            if topic.is_none() {
                warn!(topic = %raw, "Ignoring malformed topic");
            }
            topic
        })
        .collect();

    if topics.is_empty() {
        ctx.shutdown();
        return Ok(());
    }

    for topic in topics {
        let label = topic.to_string();
        ctx.subscribe(topic, move |payload| {
            println!("{} {}", label, payload);
        });
    }

    info!("Watching live topics, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    ctx.shutdown();
    Ok(())
}
