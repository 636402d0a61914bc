use super::args::*;
use anyhow::Context;
use diagrammer_core::config::{load_config, AppConfig};
use diagrammer_core::errors::ConfigError;
use diagrammer_core::model::{DiagramKind, LayoutEngine, OutputFormat};
use diagrammer_core::storage::Store;
use std::path::{Path, PathBuf};

pub mod evict;
pub mod generate;
pub mod preview;
pub mod stats;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

const DEFAULT_DB: &str = ".diagrammer/diagrammer.db";

pub async fn dispatch(cli: Cli, cfg: AppConfig) -> anyhow::Result<i32> {
    let db = db_path(cli.db.as_deref(), &cfg);
    tracing::debug!(event = "cli.start", db = %db.display(), provider = cfg.llm.provider.as_str());
    match cli.cmd {
        Command::Generate(args) => generate::run(args, &cfg, &db).await,
        Command::Preview(args) => preview::run(args, &cfg).await,
        Command::Stats(args) => stats::cmd_stats(args, &db),
        Command::History(args) => stats::cmd_history(args, &db),
        Command::Evict(args) => evict::run(args, &cfg, &db).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// File config (if any) overlaid with the environment.
pub fn load_app_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => load_config(path, cli.strict)?,
        None => AppConfig::default(),
    };
    cfg.apply_env()?;
    cfg.validate()?;
    Ok(cfg)
}

fn db_path(flag: Option<&Path>, cfg: &AppConfig) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| cfg.cache.db_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB))
}

pub(crate) fn open_store(db: &Path) -> anyhow::Result<Store> {
    let store = Store::open(db)?;
    store
        .init_schema()
        .with_context(|| format!("failed to initialise {}", db.display()))?;
    Ok(store)
}

/// Parsed kind/format/layout flags, or a usage message.
pub(crate) fn parse_target(
    kind: &str,
    format: &str,
    layout: &str,
) -> Result<(DiagramKind, OutputFormat, LayoutEngine), String> {
    let kind = DiagramKind::parse(kind).map_err(|e| e.to_string())?;
    let format = OutputFormat::parse(format).map_err(|e| e.to_string())?;
    let layout = LayoutEngine::parse(layout).map_err(|e| e.to_string())?;
    Ok((kind, format, layout))
}

pub(crate) fn default_out(format: OutputFormat) -> PathBuf {
    PathBuf::from(format!("diagram.{}", format.as_str()))
}

pub(crate) fn write_artifact(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}
