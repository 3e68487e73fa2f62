//! Clap derive structures for the `polsync` CLI.
//!
//! Defines the command tree, global flags, and shared argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use polsync_core::{BatchMode, FailurePolicy, ObjectKind};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// polsync -- reconcile declarative firewall config onto a live device
#[derive(Debug, Parser)]
#[command(
    name = "polsync",
    version,
    about = "Reconcile declarative firewall objects and policy onto a live device",
    long_about = "Builds the desired object graph from YAML/JSON record documents,\n\
        compares it with the live device, and applies the difference in\n\
        dependency order under configuration and commit locks.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "POLSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "POLSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Management URL (overrides profile)
    #[arg(long, short = 'u', env = "POLSYNC_URL", global = true)]
    pub url: Option<String>,

    /// API key (overrides profile)
    #[arg(long, env = "POLSYNC_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Panorama device group (overrides profile scope)
    #[arg(long, global = true, conflicts_with = "vsys")]
    pub device_group: Option<String>,

    /// Panorama template locked with the device group
    #[arg(long, global = true, requires = "device_group")]
    pub template: Option<String>,

    /// Firewall virtual system (overrides profile scope)
    #[arg(long, global = true)]
    pub vsys: Option<String>,

    /// Value substituted for `{environment}` in external list URLs
    #[arg(long, short = 'e', env = "POLSYNC_ENVIRONMENT", global = true)]
    pub environment: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "POLSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "POLSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "POLSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show what a deployment would change, without locking or writing
    Plan(PlanArgs),

    /// Apply the desired state to the device
    Deploy(DeployArgs),

    /// List live objects of one kind
    Inspect(InspectArgs),

    /// Build the desired state offline and report problems
    Validate(InputArgs),

    /// Inspect the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

/// Record documents that make up the desired state.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// YAML or JSON record document, or a directory of them (repeatable)
    #[arg(long = "input", short = 'i', required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
}

/// Engine tunables that override the profile for one invocation.
#[derive(Debug, Args)]
pub struct EngineArgs {
    /// Maximum operations per device request
    #[arg(long)]
    pub max_batch_size: Option<usize>,

    /// Batch atomicity
    #[arg(long)]
    pub batch_mode: Option<BatchModeArg>,

    /// What a failed operation stops
    #[arg(long)]
    pub on_failure: Option<FailurePolicyArg>,

    /// Never delete live objects of this kind (repeatable)
    #[arg(long = "retain", value_parser = parse_kind)]
    pub retain: Vec<ObjectKind>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BatchModeArg {
    /// Each request applies fully or not at all
    Atomic,
    /// Each request applies until its first failure
    BestEffort,
}

impl From<BatchModeArg> for BatchMode {
    fn from(arg: BatchModeArg) -> Self {
        match arg {
            BatchModeArg::Atomic => Self::Atomic,
            BatchModeArg::BestEffort => Self::BestEffort,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FailurePolicyArg {
    /// Stop the failed kind and the kinds that depend on it
    Kind,
    /// Stop the whole run
    Run,
}

impl From<FailurePolicyArg> for FailurePolicy {
    fn from(arg: FailurePolicyArg) -> Self {
        match arg {
            FailurePolicyArg::Kind => Self::AbortKind,
            FailurePolicyArg::Run => Self::AbortRun,
        }
    }
}

pub fn parse_kind(value: &str) -> Result<ObjectKind, String> {
    value.parse().map_err(|_| {
        let known: Vec<String> = ObjectKind::all().iter().map(ToString::to_string).collect();
        format!("unknown object kind '{value}' (expected one of: {})", known.join(", "))
    })
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Object kind to list (e.g. address, security-rule)
    #[arg(value_parser = parse_kind)]
    pub kind: ObjectKind,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration with secrets masked
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
