//! freightdesk operator CLI.
//!
//! Issues reads and writes through the caching, queueing client against the
//! configured API. Results go to stdout as JSON; logs go to stderr.
//!
//! Configuration is read from `FREIGHTDESK_CONFIG_FILE` (TOML) and
//! `FREIGHTDESK_*` environment variables.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use freightdesk_client::{
    ApiClient, CacheOptions, GetOptions, HttpTransport, StaticHeaders, TracingHook, WriteOptions, WriteOutcome,
};
use freightdesk_core::{AppConfig, ConnectivitySignal, OfflineQueue, QueueConfig, SqliteStore};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "freightdesk")]
#[command(about = "Cache-aware, offline-tolerant client for the freightdesk API")]
#[command(version)]
struct Args {
    /// Treat the network as unavailable; writes are queued instead of sent
    #[arg(long, global = true)]
    offline: bool,

    /// Extra header sent with every request (NAME=VALUE)
    #[arg(long = "header", global = true, value_parser = parse_pair)]
    headers: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a resource
    Get {
        path: String,
        /// Query parameter (NAME=VALUE), repeatable
        #[arg(long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,
        /// Cache tag, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Bypass the cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Create a resource
    Post {
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Replace a resource
    Put {
        path: String,
        #[arg(long)]
        body: Option<String>,
    },
    /// Partially update a resource
    Patch {
        path: String,
        #[arg(long)]
        body: Option<String>,
    },
    /// Delete a resource
    Delete { path: String },
    /// Show the offline queue
    Queue,
    /// Replay the offline queue now
    Flush,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    let store = SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open queue database at {}", config.db_path.display()))?;
    let connectivity = Arc::new(ConnectivitySignal::new(!args.offline));
    let queue = OfflineQueue::load(Arc::new(store), connectivity, QueueConfig::from(&config)).await?;
    let transport = HttpTransport::from_config(&config)?;
    tracing::debug!(base_url = %transport.base_url(), offline = args.offline, "client ready");

    let mut builder = ApiClient::builder(Arc::new(transport), Arc::new(queue))
        .from_config(&config)
        .hook(TracingHook);
    if !args.headers.is_empty() {
        let headers = args
            .headers
            .into_iter()
            .fold(StaticHeaders::new(), |hook, (name, value)| hook.with(name, value));
        builder = builder.hook(headers);
    }
    let client = builder.build();

    let output = match args.command {
        Command::Get { path, params, tags, no_cache } => {
            let mut cache = CacheOptions::default();
            if !tags.is_empty() {
                cache = cache.tags(tags);
            }
            if no_cache {
                cache = cache.skip_cache();
            }
            let options = params
                .into_iter()
                .fold(GetOptions::default(), |options, (name, value)| options.param(name, value))
                .cache(cache);
            client.get::<Value>(&path, options).await?
        }
        Command::Post { path, body } => {
            write_result(client.post(&path, &parse_body(body.as_deref())?, WriteOptions::default()).await?)
        }
        Command::Put { path, body } => {
            write_result(client.put(&path, &parse_body(body.as_deref())?, WriteOptions::default()).await?)
        }
        Command::Patch { path, body } => {
            write_result(client.patch(&path, &parse_body(body.as_deref())?, WriteOptions::default()).await?)
        }
        Command::Delete { path } => write_result(client.delete(&path, WriteOptions::default()).await?),
        Command::Queue => {
            let status = client.offline_status().await;
            json!({ "status": status })
        }
        Command::Flush => {
            let report = client.flush_offline_queue().await?;
            json!({ "report": report, "status": client.offline_status().await })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    let snapshot = client.performance_snapshot();
    tracing::info!(
        requests = snapshot.request_count,
        cache_hits = snapshot.cache_hits,
        cache_misses = snapshot.cache_misses,
        hit_rate = snapshot.cache_hit_rate,
        avg_ms = snapshot.average_response_time.as_millis() as u64,
        "performance summary"
    );

    Ok(())
}

fn write_result(outcome: WriteOutcome<Value>) -> Value {
    match outcome {
        WriteOutcome::Completed(body) => json!({ "status": "completed", "body": body }),
        WriteOutcome::Queued { id } => json!({ "status": "queued", "id": id }),
    }
}

fn parse_body(body: Option<&str>) -> Result<Value> {
    match body {
        Some(raw) => serde_json::from_str(raw).context("--body must be valid JSON"),
        None => Ok(Value::Null),
    }
}

fn parse_pair(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected NAME=VALUE, got `{raw}`");
    };
    if name.is_empty() {
        bail!("empty name in `{raw}`");
    }
    Ok((name.to_string(), value.to_string()))
}
