//! nuke-exec - execution step of the account cleanup workflow
//!
//! ## Commands
//!
//! - `run`: execute one invocation from an input envelope and print the result envelope
//! - `acquire`: warm the local binary cache
//! - `resolve-version`: show which release would be used
//! - `classify`: classify a saved tool output offline

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nuke_executor::{
    classify, BinaryAcquirer, ExecutionRequest, ExecutorConfig, GithubReleases, Orchestrator,
    VersionPolicy, VersionResolver,
};
use nuke_state::BackendObjectStore;
use serde_json::json;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "nuke-exec")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs the cloud cleanup tool for one account and reports the result", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Object store for policies and outputs: `s3://`, `s3://host:port`,
    /// `file:///path` or `memory://`
    #[arg(long, global = true, env = "NUKE_STORE", default_value = "s3://")]
    store: String,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags layered over the `NUKE_*` environment configuration.
#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    /// Scratch directory for the policy copy and the tool binary
    #[arg(long, global = true, env = "NUKE_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Cleanup tool name (also the binary file name)
    #[arg(long, global = true, env = "NUKE_TOOL_NAME")]
    tool_name: Option<String>,

    /// Latest-release endpoint of the release registry
    #[arg(long, global = true, env = "NUKE_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Archive URL with `{version}` and `{platform}` placeholders
    #[arg(long, global = true, env = "NUKE_DOWNLOAD_URL_TEMPLATE")]
    download_url_template: Option<String>,

    /// Release platform, e.g. `linux-arm64` (default: detected)
    #[arg(long, global = true, env = "NUKE_PLATFORM")]
    platform: Option<String>,

    /// Version used when the input envelope names none
    #[arg(long, global = true, env = "NUKE_DEFAULT_VERSION")]
    default_version: Option<String>,

    /// Bucket for outputs (default: the policy document's bucket)
    #[arg(long, global = true, env = "NUKE_OUTPUT_BUCKET")]
    output_bucket: Option<String>,

    /// Key prefix for persisted outputs
    #[arg(long, global = true, env = "NUKE_OUTPUT_PREFIX")]
    output_prefix: Option<String>,

    /// Hard limit for the cleanup run, in seconds
    #[arg(long, global = true, env = "NUKE_EXECUTION_TIMEOUT_SECS")]
    execution_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut ExecutorConfig) -> Result<()> {
        if let Some(v) = self.scratch_dir {
            config.scratch_dir = v;
        }
        if let Some(v) = self.tool_name {
            config.tool_name = v;
        }
        if let Some(v) = self.registry_url {
            config.registry_url = v;
        }
        if let Some(v) = self.download_url_template {
            config.download_url_template = v;
        }
        if let Some(v) = self.platform {
            config.platform = Some(v);
        }
        if let Some(v) = self.default_version {
            config.default_tool_version = v;
        }
        if let Some(v) = self.output_bucket {
            config.output_bucket = Some(v);
        }
        if let Some(v) = self.output_prefix {
            config.output_prefix = v;
        }
        if let Some(v) = self.execution_timeout_secs {
            config.execution_timeout_secs = v;
        }
        config.validate().context("Invalid configuration flags")?;
        Ok(())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one invocation and print its result envelope
    Run {
        /// Input envelope as JSON (`-` reads stdin)
        #[arg(short, long, default_value = "-")]
        event: String,
    },

    /// Make sure a verified binary is in scratch space
    Acquire {
        /// Pinned fallback version (default: configured version)
        #[arg(long = "version", value_name = "VERSION")]
        tool_version: Option<String>,

        /// Use the pinned version without asking the release registry
        #[arg(long)]
        enforce_version: bool,
    },

    /// Print the release the resolver would pick
    ResolveVersion {
        /// Pinned fallback version (default: configured version)
        #[arg(long = "version", value_name = "VERSION")]
        tool_version: Option<String>,

        /// Use the pinned version without asking the release registry
        #[arg(long)]
        enforce_version: bool,
    },

    /// Classify saved tool output
    Classify {
        /// File holding the combined tool output
        #[arg(short, long)]
        input: PathBuf,

        /// Classify as a real run instead of a dry run
        #[arg(long)]
        real_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    nuke_executor::init_tracing(cli.json, level);

    let mut config = ExecutorConfig::from_env().context("Invalid NUKE_* configuration")?;
    cli.overrides.apply(&mut config)?;

    match cli.command {
        Commands::Run { event } => cmd_run(config, &cli.store, &event).await,
        Commands::Acquire {
            tool_version,
            enforce_version,
        } => cmd_acquire(config, tool_version, enforce_version).await,
        Commands::ResolveVersion {
            tool_version,
            enforce_version,
        } => cmd_resolve_version(config, tool_version, enforce_version).await,
        Commands::Classify { input, real_run } => cmd_classify(&input, real_run),
    }
}

fn read_event(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read input envelope from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read input envelope {source}"))
    }
}

fn version_policy(
    config: &ExecutorConfig,
    tool_version: Option<String>,
    enforce_version: bool,
) -> VersionPolicy {
    let requested = tool_version.unwrap_or_else(|| config.default_tool_version.clone());
    VersionPolicy::new(requested, enforce_version)
}

async fn cmd_run(config: ExecutorConfig, store_uri: &str, event: &str) -> Result<()> {
    let raw = read_event(event)?;
    let request = ExecutionRequest::from_json(&raw, &config.default_tool_version)
        .context("Input envelope is not a valid execution request")?;

    let store = BackendObjectStore::from_uri(store_uri)
        .with_context(|| format!("Failed to open object store {store_uri}"))?;
    let orchestrator = Orchestrator::with_http(config, Arc::new(store))?;

    let envelope = orchestrator.execute(&request).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

async fn cmd_acquire(
    config: ExecutorConfig,
    tool_version: Option<String>,
    enforce_version: bool,
) -> Result<()> {
    let policy = version_policy(&config, tool_version, enforce_version);
    let github = Arc::new(GithubReleases::new(config.registry_url.clone())?);
    let acquirer = BinaryAcquirer::new(config, github.clone(), github);

    let handle = acquirer
        .acquire(&policy)
        .await
        .context("Failed to acquire cleanup tool")?;
    info!(path = %handle.path().display(), "binary ready");

    let summary = json!({
        "path": handle.path(),
        "source": handle.source(),
        "version": handle.version(),
        "version_info": handle.version_info(),
        "archive_sha256": handle.archive_sha256(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_resolve_version(
    config: ExecutorConfig,
    tool_version: Option<String>,
    enforce_version: bool,
) -> Result<()> {
    let policy = version_policy(&config, tool_version, enforce_version);
    let registry = Arc::new(GithubReleases::new(config.registry_url.clone())?);
    let resolver = VersionResolver::new(registry, config.registry_timeout());

    println!("{}", resolver.resolve(&policy).await);
    Ok(())
}

fn cmd_classify(input: &Path, real_run: bool) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let classified = classify(&text, !real_run);

    println!(
        "{} resource(s) {}",
        classified.resource_count,
        if real_run { "removed" } else { "would be removed" }
    );
    for line in &classified.lines {
        println!("  {line}");
    }
    Ok(())
}
