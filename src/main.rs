use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crawl_store::{
    config::Config,
    crawl::{Crawl, NodeId, RawCrawl},
    keys::{CrawlId, RawCrawlKey},
    store::Direction,
    CrawlStore,
};
use tracing::debug;

#[derive(Parser, Debug)]
#[clap(about = "Store and inspect peer network topology crawls")]
struct Cli {
    /// Path to config file
    #[clap(short, long)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a raw crawl result read from a JSON file
    ImportRaw {
        /// File holding the crawler's JSON output
        file: PathBuf,
    },
    /// Process a crawl and store its derived records
    Process {
        /// File holding the processed crawl JSON
        file: PathBuf,
        /// File holding the previous processed crawl to diff against
        #[clap(long)]
        prev: Option<PathBuf>,
    },
    /// Print the most recent raw crawl
    Latest,
    /// Print a raw crawl by key
    Get {
        /// Raw crawl key, `<start_millis>_<end_millis>`
        key: String,
    },
    /// Print crawl info, of the latest crawl if no key is given
    Info {
        /// Crawl key
        key: Option<String>,
    },
    /// Print the identity history of a node
    History {
        /// The node's public key
        pubkey: String,
    },
    /// Print the latest known state of a node
    State {
        /// The node's public key
        pubkey: String,
    },
    /// Print per-node stats of a crawl
    Stats {
        /// Crawl key
        key: String,
    },
    /// Print a node's connections within a crawl
    Connections {
        /// Crawl key
        key: String,
        /// The node's public key
        pubkey: String,
        /// Which side to list, `in` or `out`
        #[clap(long, default_value = "out")]
        direction: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Cli::parse();

    let config = if let Some(path) = args.config {
        debug!("loading config from {:?}", path);
        Config::load(path).await?
    } else {
        debug!("using default config");
        Config::default()
    };
    crawl_store::metrics::init_metrics();

    let store = CrawlStore::persistent(config.store_path()?)?;
    match args.command {
        Command::ImportRaw { file } => {
            let crawl: RawCrawl = read_json(&file).await?;
            let key = store.store_raw_crawl(&crawl).await?;
            println!("{key}");
        }
        Command::Process { file, prev } => {
            let crawl: Crawl = read_json(&file).await?;
            let prev: Option<Crawl> = match prev {
                Some(path) => Some(read_json(&path).await?),
                None => None,
            };
            let id = store.store_processed_crawl(&crawl, prev.as_ref()).await?;
            println!("{id}");
        }
        Command::Latest => {
            let (key, record) = store.latest_raw_crawl().await?;
            let (start, end) = key.window_rfc3339();
            println!("{key} ({start} -> {end})");
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Get { key } => {
            let key: RawCrawlKey = key.parse()?;
            let (start, end) = key.window_rfc3339();
            println!("{key} ({start} -> {end})");
            let record = store.get_raw_crawl(&key).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Info { key } => {
            let key = key.map(|key| key.parse::<CrawlId>()).transpose()?;
            let (id, record) = store.get_crawl_info(key.as_ref()).await?;
            println!("{id} entry={}", record.entry);
        }
        Command::History { pubkey } => {
            let node = NodeId::from(pubkey);
            for (key, record) in store.node_history(&node).await? {
                println!(
                    "{} ipp={} version={}",
                    key.crawl(),
                    record.ipp,
                    record.version
                );
            }
        }
        Command::State { pubkey } => {
            let state = store.node_state(&NodeId::from(pubkey)).await?;
            let last_updated = state
                .last_updated
                .map(|at| at.to_rfc3339())
                .unwrap_or_default();
            println!(
                "{} ipp={} version={} last_updated={last_updated}",
                state.pubkey, state.ipp, state.version
            );
        }
        Command::Stats { key } => {
            let id: CrawlId = key.parse()?;
            for (key, record) in store.crawl_node_stats(&id).await? {
                println!("{} {}", key.node(), serde_json::to_string(&record)?);
            }
        }
        Command::Connections {
            key,
            pubkey,
            direction,
        } => {
            let id: CrawlId = key.parse()?;
            let direction = match direction.as_str() {
                "in" => Direction::In,
                "out" => Direction::Out,
                other => bail!("unknown direction `{other}`, expected `in` or `out`"),
            };
            let node = NodeId::from(pubkey);
            for (key, _) in store.connections(&id, &node, direction).await? {
                println!("{} -> {}", key.from(), key.to());
            }
        }
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let s = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    Ok(serde_json::from_str(&s)?)
}
