use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use robust_persist::{
    ConnectionValidator, FileParentStore, JsonlAuditStore, ParentStore, PersistenceConfig,
    RobustPersistenceManager, SaveOptions,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const AUDIT_FILE: &str = "audit.jsonl";

#[derive(Parser)]
#[command(name = "robust-persist")]
#[command(about = "Operator tooling for the robust persistence pipeline")]
struct Cli {
    /// JSON config file; `ROBUST_PERSIST_*` variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace a parent's items with the batch in a JSON file
    Save {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        parent: String,
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        skip_schema: bool,
    },
    /// Create an empty parent record
    Init {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        parent: String,
    },
    Show {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        parent: String,
    },
    /// Sample store health for a while and print the report
    Probe {
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value_t = 2_000)]
        duration_ms: u64,
    },
    Audit {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        transaction: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Save {
            root,
            parent,
            items,
            actor,
            max_retries,
            timeout_ms,
            skip_schema,
        } => {
            let mut options = SaveOptions::new().validate_schema(!skip_schema);
            options.max_retries = max_retries;
            options.timeout_ms = timeout_ms;
            save(config, &root, &parent, &items, options, actor).await
        }
        Command::Init { root, parent } => {
            let store = open_store(&root).await?;
            let record = store.create_parent(&parent).await?;
            print_json(&record)
        }
        Command::Show { root, parent } => {
            let store = open_store(&root).await?;
            let record = store
                .read_parent(&parent)
                .await?
                .ok_or_else(|| anyhow!("parent '{}' not found", parent))?;
            print_json(&record)
        }
        Command::Probe { root, duration_ms } => {
            let store = Arc::new(open_store(&root).await?);
            let report = ConnectionValidator::new(store)
                .check_timeout(Duration::from_millis(config.connection_check_timeout_ms))
                .sample_interval(Duration::from_millis(config.stability_sample_interval_ms))
                .test_connection_stability(Duration::from_millis(duration_ms))
                .await;
            println!("{}", report);
            Ok(())
        }
        Command::Audit { root, transaction } => {
            let audit = JsonlAuditStore::new(root.join(AUDIT_FILE));
            let records = audit
                .read_all()
                .await
                .with_context(|| format!("failed to read {}", audit.path().display()))?;
            let records: Vec<_> = records
                .into_iter()
                .filter(|record| {
                    transaction
                        .as_deref()
                        .is_none_or(|id| record.transaction_id == id)
                })
                .collect();
            print_json(&records)
        }
    }
}

async fn save(
    config: PersistenceConfig,
    root: &Path,
    parent: &str,
    items_path: &Path,
    options: SaveOptions,
    actor: Option<String>,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(items_path)
        .await
        .with_context(|| format!("failed to read {}", items_path.display()))?;
    let items = match serde_json::from_str::<Value>(&raw)
        .with_context(|| format!("failed to parse {}", items_path.display()))?
    {
        Value::Array(items) => items,
        _ => bail!("{} must contain a JSON array of items", items_path.display()),
    };

    let store = Arc::new(open_store(root).await?);
    let audit = Arc::new(JsonlAuditStore::new(root.join(AUDIT_FILE)));
    let manager = RobustPersistenceManager::new(store)
        .with_config(config)
        .with_audit_store(audit);

    let result = manager
        .save_with_transaction(parent, items, options, actor)
        .await;
    print_json(&result)?;

    if !result.success() {
        bail!(
            "save failed for parent '{}' (transaction {})",
            parent,
            result.transaction_id()
        );
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PersistenceConfig> {
    let config = match path {
        Some(path) => PersistenceConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?
            .with_env_overrides()?,
        None => PersistenceConfig::from_env()?,
    };
    config.validate().map_err(|err| anyhow!(err))?;
    Ok(config)
}

async fn open_store(root: &Path) -> Result<FileParentStore> {
    FileParentStore::open(root)
        .await
        .with_context(|| format!("failed to open store at {}", root.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("robust_persist=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
