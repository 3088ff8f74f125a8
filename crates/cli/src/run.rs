use crate::config::AppConfig;
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use narrativelens::assets::{AssetSource, DirectoryAssetSource};
use narrativelens::providers::ai::gemini::GeminiProvider;
use narrativelens::providers::db::sqlite::SqliteFeatureStore;
use narrativelens::providers::db::storage::{FeatureStore, IdentityFilter};
use narrativelens::{AnalysisTask, BatchOrchestrator, RepairPolicy, RetryPolicy, RunMode, RunReport};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Creative feature extraction (seven closed-enum fields)
    Features,
    /// UGC-style detection (Yes/No plus justification)
    Ugc,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Features => "features",
            TaskKind::Ugc => "ugc",
        }
    }

    fn build(self, prompt: String) -> AnalysisTask {
        match self {
            TaskKind::Features => AnalysisTask::ad_features(prompt),
            TaskKind::Ugc => AnalysisTask::ugc_detection(prompt),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    /// First asset of `<asset_root>_dry`, nothing persisted
    Dry,
    /// Every asset of `<asset_root>_test`, reprocessed each time
    Test,
    /// Assets of `<asset_root>` not yet done
    Prod,
}

impl ModeArg {
    fn run_mode(self) -> RunMode {
        match self {
            ModeArg::Dry => RunMode::Dry,
            ModeArg::Test => RunMode::Restricted,
            ModeArg::Prod => RunMode::Incremental,
        }
    }

    fn asset_root(self, base: &str) -> PathBuf {
        match self {
            ModeArg::Dry => PathBuf::from(format!("{base}_dry")),
            ModeArg::Test => PathBuf::from(format!("{base}_test")),
            ModeArg::Prod => PathBuf::from(base),
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value_t = TaskKind::Features)]
    pub task: TaskKind,
    #[arg(long, value_enum, default_value_t = ModeArg::Prod)]
    pub mode: ModeArg,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Which asset directory to catalog
    #[arg(long, value_enum, default_value_t = ModeArg::Prod)]
    pub mode: ModeArg,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, value_enum, default_value_t = TaskKind::Features)]
    pub task: TaskKind,
}

async fn open_store(config: &AppConfig) -> Result<SqliteFeatureStore> {
    if let Some(parent) = Path::new(&config.db_url).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
    }
    Ok(SqliteFeatureStore::new(&config.db_url).await?)
}

/// Builds every collaborator up front so that configuration problems abort
/// before the first external call.
async fn build_orchestrator(config: &AppConfig, task: TaskKind) -> Result<BatchOrchestrator> {
    let api_key = config.resolve_api_key()?;
    let prompt = config.load_prompt(task.name())?;
    let provider = GeminiProvider::new(config.api_url.clone(), config.model.clone(), api_key)?;
    let store = open_store(config).await?;

    Ok(BatchOrchestrator::new(
        Box::new(provider),
        Box::new(store),
        task.build(prompt),
    )
    .with_retry_policy(RetryPolicy {
        max_attempts: config.retry.max_attempts,
        delay: config.retry.delay(),
    })
    .with_repair_policy(RepairPolicy {
        max_attempts: config.repair.max_attempts,
    }))
}

pub async fn handle_run(config: &AppConfig, args: &RunArgs) -> Result<()> {
    let root = args.mode.asset_root(&config.asset_root);
    if !root.is_dir() {
        bail!("Asset directory '{}' does not exist.", root.display());
    }
    let orchestrator = build_orchestrator(config, args.task).await?;
    let source = DirectoryAssetSource::new(&root, &config.asset_extensions);

    println!(
        "Running '{}' in {} mode over '{}'...",
        args.task.name(),
        args.mode.run_mode(),
        root.display()
    );
    let report = orchestrator.run(args.mode.run_mode(), &source).await?;
    print_report(&report)?;
    Ok(())
}

/// Seeds an empty store document for every asset under the mode's root, so
/// later runs only report genuinely unknown assets as not found.
pub async fn handle_register(config: &AppConfig, args: &RegisterArgs) -> Result<()> {
    let root = args.mode.asset_root(&config.asset_root);
    let source = DirectoryAssetSource::new(&root, &config.asset_extensions);
    let assets = source
        .list()
        .with_context(|| format!("Failed to list assets under '{}'", root.display()))?;
    let store = open_store(config).await?;

    let created = store
        .register_all(assets.iter().map(|a| a.id.as_str()))
        .await?;
    info!(
        "Registered {} new assets out of {} under '{}'.",
        created,
        assets.len(),
        root.display()
    );
    println!(
        "Registered {} new assets ({} already known).",
        created,
        assets.len() - created
    );
    Ok(())
}

pub async fn handle_status(config: &AppConfig, args: &StatusArgs) -> Result<()> {
    let store = open_store(config).await?;
    // The prompt is not needed to check completion.
    let task = args.task.build(String::new());
    let filter = IdentityFilter::HasFields(task.completion_fields());
    let done = store.list_identities(&filter).await?;
    info!("{} assets done for '{}'.", done.len(), args.task.name());
    println!("{} assets done for '{}'.", done.len(), args.task.name());
    Ok(())
}

fn print_report(report: &RunReport) -> Result<()> {
    let stats = &report.stats;
    println!("{stats}");
    if !stats.failed_ids.is_empty() {
        println!("Failed: {}", stats.failed_ids.join(", "));
    }
    if !stats.not_found_ids.is_empty() {
        println!("Not found in store: {}", stats.not_found_ids.join(", "));
    }
    if let Some((asset_id, record)) = &report.preview {
        println!("\n--- {asset_id} (not saved) ---");
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(())
}
