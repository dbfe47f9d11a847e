use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use clinsync_core::config::{
    archive_tag_system_from_env_value, history_capacity_from_env_value,
    inter_item_delay_from_env_value, max_batch_size_from_env_value,
};
use clinsync_core::{
    Actor, BatchExecutor, BatchOperation, ClinicalApi, FieldEdit, HttpClinicalApi,
    InMemoryClinicalApi, ItemOutcome, LogEventSink, OperationCatalog, OperationHistory,
    OperationType, SyncConfig, ValueDomain,
};
use clinsync_types::ResourceKind;
use fhir::Normalizer;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ACTOR: &str = "clinsync-cli";

#[derive(Parser)]
#[command(name = "clinsync")]
#[command(about = "Batch operations on clinical resources")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the editable fields of a resource kind
    Fields {
        /// Resource kind (order, task, document, message)
        kind: ResourceKind,
    },
    /// List normalised resources from a resource file
    List {
        kind: ResourceKind,
        /// JSON file holding an array of resources or a Bundle
        #[arg(long)]
        store: PathBuf,
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Run a batch operation
    Run {
        /// update, delete, archive, activate or deactivate
        operation: OperationType,
        kind: ResourceKind,
        /// Target ids (comma-separated)
        #[arg(long, value_delimiter = ',', required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<String>,
        /// Target every resource of the kind in the store file
        #[arg(long, requires = "store")]
        all: bool,
        /// Field edit as path=value (repeatable)
        #[arg(long = "set", value_name = "PATH=VALUE")]
        edits: Vec<String>,
        /// JSON resource file to operate on
        #[arg(long, conflicts_with = "base_url")]
        store: Option<PathBuf>,
        /// FHIR base URL (defaults to CLINSYNC_API_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,
        /// History file to append to
        #[arg(long)]
        history: Option<PathBuf>,
        /// Actor name recorded in history (defaults to CLINSYNC_ACTOR)
        #[arg(long)]
        actor: Option<String>,
        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print stored history entries
    History {
        #[arg(long)]
        history: PathBuf,
        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Where a run reads and writes resources.
enum Backend {
    File {
        path: PathBuf,
        api: Arc<InMemoryClinicalApi>,
    },
    Http(Arc<HttpClinicalApi>),
}

impl Backend {
    fn api(&self) -> Arc<dyn ClinicalApi> {
        match self {
            Backend::File { api, .. } => api.clone(),
            Backend::Http(api) => api.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("clinsync=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Fields { kind }) => print_fields(kind)?,
        Some(Commands::List {
            kind,
            store,
            page,
            page_size,
        }) => list(kind, &store, page, page_size)?,
        Some(Commands::Run {
            operation,
            kind,
            ids,
            all,
            edits,
            store,
            base_url,
            history,
            actor,
            config,
        }) => {
            let config = Arc::new(resolve_config(config.as_deref())?);
            let catalog = Arc::new(OperationCatalog::standard());
            let edits = parse_edits(&catalog, kind, &edits)?;
            let backend = open_backend(store, base_url)?;

            let targets = match (&backend, all) {
                (Backend::File { api, .. }, true) => api
                    .snapshot(kind)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect(),
                _ => ids,
            };

            let actor_name = actor
                .or_else(|| std::env::var("CLINSYNC_ACTOR").ok())
                .unwrap_or_else(|| DEFAULT_ACTOR.to_string());
            let past = match &history {
                Some(path) => OperationHistory::load(path, config.history_capacity())?,
                None => OperationHistory::new(config.history_capacity()),
            };

            let executor = BatchExecutor::new(
                config,
                catalog,
                backend.api(),
                Actor::new(actor_name)?,
            )
            .with_event_sink(Arc::new(LogEventSink))
            .with_history(past);

            let report = executor
                .submit(BatchOperation::new(operation, kind, targets, edits))
                .await?;

            for item in &report.result.items {
                match &item.outcome {
                    ItemOutcome::Success { .. } => println!("ok      {}", item.target_id),
                    ItemOutcome::Failure { error } => {
                        println!("failed  {}: {}", item.target_id, error)
                    }
                }
            }
            println!(
                "{} {} {}: {} succeeded, {} failed in {} ms",
                report.entry.operation_type,
                report.entry.total_count,
                report.entry.resource_kind,
                report.entry.success_count,
                report.entry.failed_count,
                report.entry.duration_ms
            );

            if let Some(path) = &history {
                executor.history().save(path)?;
            }
            if let Backend::File { path, api } = &backend {
                api.save(path)?;
            }
        }
        Some(Commands::History { history, config }) => {
            let config = resolve_config(config.as_deref())?;
            let history = OperationHistory::load(&history, config.history_capacity())?;
            if history.is_empty() {
                println!("No history entries found.");
            }
            for entry in history.entries().rev() {
                println!(
                    "{}  {:<10} {:<8} total {:>3}  ok {:>3}  failed {:>3}  {:>6} ms  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.operation_type.as_str(),
                    entry.resource_kind.as_str(),
                    entry.total_count,
                    entry.success_count,
                    entry.failed_count,
                    entry.duration_ms,
                    entry.actor
                );
            }
        }
        None => {
            println!("Use 'clinsync --help' for commands");
        }
    }

    Ok(())
}

/// Defaults, then the YAML file, then `CLINSYNC_*` environment variables.
fn resolve_config(path: Option<&Path>) -> anyhow::Result<SyncConfig> {
    let base = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            SyncConfig::from_yaml_str(&text)?
        }
        None => SyncConfig::default(),
    };

    let env = |name: &str| std::env::var(name).ok();
    let config = SyncConfig::new(
        max_batch_size_from_env_value(env("CLINSYNC_MAX_BATCH_SIZE"), base.max_batch_size())?,
        inter_item_delay_from_env_value(
            env("CLINSYNC_INTER_ITEM_DELAY_MS"),
            base.inter_item_delay(),
        )?,
        history_capacity_from_env_value(env("CLINSYNC_HISTORY_CAPACITY"), base.history_capacity())?,
        archive_tag_system_from_env_value(
            env("CLINSYNC_ARCHIVE_TAG_SYSTEM"),
            base.archive_tag_system(),
        ),
    )?;
    Ok(config)
}

fn open_backend(store: Option<PathBuf>, base_url: Option<String>) -> anyhow::Result<Backend> {
    if let Some(path) = store {
        let api = InMemoryClinicalApi::load(&path)
            .with_context(|| format!("failed to load resource file {}", path.display()))?;
        return Ok(Backend::File {
            path,
            api: Arc::new(api),
        });
    }

    let Some(base_url) = base_url.or_else(|| std::env::var("CLINSYNC_API_BASE_URL").ok()) else {
        bail!("either --store or --base-url (or CLINSYNC_API_BASE_URL) is required");
    };
    let token = std::env::var("CLINSYNC_API_TOKEN").ok();
    let api = HttpClinicalApi::new(&base_url, token.as_deref(), HTTP_TIMEOUT)?;
    Ok(Backend::Http(Arc::new(api)))
}

/// Parse `path=value` arguments. Count fields take a number; everything else is text.
fn parse_edits(
    catalog: &OperationCatalog,
    kind: ResourceKind,
    raw: &[String],
) -> anyhow::Result<Vec<FieldEdit>> {
    let profile = catalog.profile(kind)?;
    raw.iter()
        .map(|arg| {
            let Some((path, value)) = arg.split_once('=') else {
                bail!("edit {arg:?} must look like path=value");
            };
            let (path, value) = (path.trim(), value.trim());
            let value = match profile.field(path).map(|f| f.domain) {
                Some(ValueDomain::Count) => match value.parse::<u64>() {
                    Ok(n) => Value::from(n),
                    Err(_) => Value::from(value),
                },
                _ => Value::from(value),
            };
            Ok(FieldEdit::new(path, value))
        })
        .collect()
}

fn print_fields(kind: ResourceKind) -> anyhow::Result<()> {
    let catalog = OperationCatalog::standard();
    let profile = catalog.profile(kind)?;
    println!("Editable fields for {kind}:");
    for field in &profile.fields {
        let only = if field.resource_types.is_empty() {
            String::new()
        } else {
            format!(" ({} only)", field.resource_types.join(", "))
        };
        println!(
            "  {:<26} {:<14} {}{only}",
            field.path,
            field.label,
            field.domain.describe()
        );
    }
    println!(
        "activate sets status to {:?}, deactivate to {:?}",
        profile.activate_status, profile.deactivate_status
    );
    Ok(())
}

fn list(kind: ResourceKind, store: &Path, page: usize, page_size: usize) -> anyhow::Result<()> {
    let api = InMemoryClinicalApi::load(store)
        .with_context(|| format!("failed to load resource file {}", store.display()))?;
    let resources = api.snapshot(kind);
    let window = page_window(resources.len(), page, page_size);
    if window.is_empty() {
        println!("No {kind} resources on page {page}.");
        return Ok(());
    }

    for (id, wire) in &resources[window] {
        match Normalizer::to_domain(kind, wire) {
            Ok(record) => println!("{:<20} {:<16} {}", id, record.status_code(), record.summary()),
            Err(e) => tracing::warn!(id = %id, error = %e, "could not normalise resource"),
        }
    }
    let pages = resources.len().div_ceil(page_size.max(1));
    println!("page {page} of {pages} ({} {kind} resources)", resources.len());
    Ok(())
}

/// Index range of a 1-based page, clamped to `len`.
fn page_window(len: usize, page: usize, page_size: usize) -> std::ops::Range<usize> {
    let page_size = page_size.max(1);
    let start = page.saturating_sub(1).saturating_mul(page_size).min(len);
    let end = start.saturating_add(page_size).min(len);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_edits_with_count_coercion() {
        let catalog = OperationCatalog::standard();
        let edits = parse_edits(
            &catalog,
            ResourceKind::Task,
            &[
                "restriction.repetitions=3".to_string(),
                "owner.display = Ward 7B".to_string(),
            ],
        )
        .expect("edits");
        assert_eq!(edits[0], FieldEdit::new("restriction.repetitions", 3u64));
        assert_eq!(edits[1], FieldEdit::new("owner.display", "Ward 7B"));

        assert!(parse_edits(&catalog, ResourceKind::Task, &["priority".to_string()]).is_err());
    }

    #[test]
    fn page_window_clamps_to_length() {
        assert_eq!(page_window(45, 1, 20), 0..20);
        assert_eq!(page_window(45, 3, 20), 40..45);
        assert_eq!(page_window(45, 4, 20), 45..45);
        assert_eq!(page_window(5, 0, 0), 0..1);
    }
}
