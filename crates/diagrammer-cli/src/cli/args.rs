use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "diagrammer",
    version,
    about = "Turn natural-language prompts into rendered diagrams"
)]
pub struct Cli {
    /// YAML config file; environment variables override its values
    #[arg(long, global = true, env = "DIAGRAMMER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reject unknown keys in the config file
    #[arg(long, global = true)]
    pub strict: bool,

    /// SQLite database for the cache and audit log
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// tracing filter, e.g. "info" or "diagrammer_core=debug"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate (or fetch from cache) a diagram for a prompt
    Generate(GenerateArgs),
    /// Render existing markup without calling the LLM
    Preview(PreviewArgs),
    /// Aggregate usage statistics from the audit log
    Stats(StatsArgs),
    /// Most recent audit records
    History(HistoryArgs),
    /// Delete cache entries (and optionally audit records) past retention
    Evict(EvictArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GenerateArgs {
    /// What to draw
    pub prompt: String,

    /// graph | breakdown | timeline
    #[arg(long, default_value = "graph")]
    pub kind: String,

    /// svg | png
    #[arg(long, default_value = "svg")]
    pub format: String,

    /// Graphviz layout engine (graph kind only)
    #[arg(long, default_value = "dot")]
    pub layout: String,

    /// Where to write the rendered image (default: diagram.<format>)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Also write the sanitized markup next to the image
    #[arg(long)]
    pub emit_markup: bool,

    /// Bypass the cache for this request
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PreviewArgs {
    /// Markup file to render ("-" reads stdin)
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "graph")]
    pub kind: String,

    #[arg(long, default_value = "svg")]
    pub format: String,

    #[arg(long, default_value = "dot")]
    pub layout: String,

    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatsArgs {
    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct EvictArgs {
    /// Age threshold in days (default: cache.retention_days from config)
    #[arg(long)]
    pub older_than_days: Option<u32>,

    /// Prune audit records past the same threshold
    #[arg(long)]
    pub audit: bool,
}
