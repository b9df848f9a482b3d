use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};

use agrosync::cache::{CacheGateway, CachedRecord, Collection};
use agrosync::config::Config;
use agrosync::models::{CropRecommendation, CropRecord, Expense, Farm};
use agrosync::store::Store;
use agrosync::sync::{HttpTransport, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "agrosync")]
#[command(about = "Inspect and sync the offline farm-records cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/agrosync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the cache database (overrides config)
  #[arg(long)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show cache contents and queue depth
  Status,
  /// List queued pending actions
  Pending,
  /// Fetch collections from the remote and mirror them into the cache
  Refresh {
    /// Only refresh this collection (e.g. farms, crop-records)
    #[arg(long)]
    collection: Option<String>,
  },
  /// Replay queued pending actions against the remote
  Sync,
  /// Empty the pending-action queue
  Clear {
    /// Confirm destruction of queued, un-replayed mutations
    #[arg(long)]
    yes: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  // Config is optional for local inspection; the db path falls back to
  // the default data directory.
  let config = Config::load(args.config.as_deref()).ok();

  let db_path = args
    .db
    .or_else(|| config.as_ref().and_then(|c| c.cache_db.clone()));
  let store = Store::shared(db_path.as_deref())?;
  let gateway = CacheGateway::new(store);

  match args.command {
    Command::Status => status(&gateway)?,
    Command::Pending => pending(&gateway)?,
    Command::Refresh { collection } => refresh(&gateway, config, collection.as_deref()).await?,
    Command::Sync => sync(&gateway).await?,
    Command::Clear { yes } => clear(&gateway, yes)?,
  }

  Ok(())
}

/// Log to a file in the data directory so command output stays clean.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  use tracing_subscriber::EnvFilter;

  let log_dir = dirs::data_dir()
    .map(|d| d.join("agrosync"))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::never(log_dir, "agrosync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn status(gateway: &CacheGateway) -> Result<()> {
  if let Some(path) = gateway.store().path() {
    println!("database: {}", path.display());
  }

  let collections = [
    Collection::Farms,
    Collection::CropRecords,
    Collection::Expenses,
    Collection::CropRecommendations,
  ];
  for collection in collections {
    let count = gateway.cached_record_count(collection)?;
    println!("{:24} {:>6} cached", collection.name(), count);
  }

  let pending = gateway.pending_action_count()?;
  println!("{:24} {:>6} queued", "pending-actions", pending);

  Ok(())
}

fn pending(gateway: &CacheGateway) -> Result<()> {
  let actions = gateway.pending_actions()?;
  if actions.is_empty() {
    println!("queue is empty");
    return Ok(());
  }

  for action in actions {
    println!(
      "#{:<5} {:6} {:22} {} {} ({})",
      action.id,
      action.kind,
      action.collection.name(),
      action.method,
      action.url,
      action.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );
  }

  Ok(())
}

async fn refresh(
  gateway: &CacheGateway,
  config: Option<Config>,
  only: Option<&str>,
) -> Result<()> {
  let config = config.ok_or_else(|| eyre!("refresh needs a config file with the remote URL"))?;
  let api_key = Config::get_api_key()?;
  let client = reqwest::Client::new();

  let all = [
    Collection::Farms,
    Collection::CropRecords,
    Collection::Expenses,
    Collection::CropRecommendations,
  ];
  let targets: Vec<Collection> = match only {
    Some(name) => {
      let collection = Collection::from_name(name)
        .ok_or_else(|| eyre!("unknown collection: {}", name))?;
      vec![collection]
    }
    None => all.to_vec(),
  };

  for collection in targets {
    let count = match collection {
      Collection::Farms => {
        refresh_collection::<Farm>(&client, &config.remote.url, &api_key, gateway).await?
      }
      Collection::CropRecords => {
        refresh_collection::<CropRecord>(&client, &config.remote.url, &api_key, gateway).await?
      }
      Collection::Expenses => {
        refresh_collection::<Expense>(&client, &config.remote.url, &api_key, gateway).await?
      }
      Collection::CropRecommendations => {
        refresh_collection::<CropRecommendation>(&client, &config.remote.url, &api_key, gateway)
          .await?
      }
    };
    println!("{:24} {:>6} fetched", collection.name(), count);
  }

  Ok(())
}

/// Pull every row of one collection and merge it into the local cache.
async fn refresh_collection<T: CachedRecord>(
  client: &reqwest::Client,
  base_url: &str,
  api_key: &str,
  gateway: &CacheGateway,
) -> Result<usize> {
  let url = format!(
    "{}/rest/v1/{}?select=*",
    base_url.trim_end_matches('/'),
    T::collection().table()
  );

  let rows: Vec<T> = client
    .get(&url)
    .header("apikey", api_key)
    .bearer_auth(api_key)
    .send()
    .await?
    .error_for_status()?
    .json()
    .await?;

  gateway.cache_records(&rows)?;
  Ok(rows.len())
}

async fn sync(gateway: &CacheGateway) -> Result<()> {
  let engine = SyncEngine::new(gateway.clone(), HttpTransport::new());
  let report = engine.replay().await?;

  println!("replayed: {}", report.replayed);
  println!("remaining: {}", report.remaining);
  if let Some(ref error) = report.error {
    println!("stopped by: {}", error);
  }

  if !report.is_complete() {
    std::process::exit(1);
  }
  Ok(())
}

fn clear(gateway: &CacheGateway, yes: bool) -> Result<()> {
  let count = gateway.pending_action_count()?;
  if count == 0 {
    println!("queue is already empty");
    return Ok(());
  }

  if !yes {
    return Err(eyre!(
      "refusing to drop {} un-replayed action(s); pass --yes to confirm",
      count
    ));
  }

  gateway.clear_pending_actions()?;
  println!("cleared {} pending action(s)", count);
  Ok(())
}
