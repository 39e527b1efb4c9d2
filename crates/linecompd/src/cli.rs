use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use linecomp_config::CompletionProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Self::On
    }
}

impl std::str::FromStr for Toggle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(format!("invalid toggle '{other}', expected on or off")),
        }
    }
}

/// Provider selection; unset flags fall back to `.linecomp/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ProviderArgs {
    #[arg(long, value_parser = parse_provider, help = "Completion provider: auto, mock, gemini, or ollama")]
    pub provider: Option<CompletionProviderKind>,

    #[arg(long, help = "Model name override")]
    pub model: Option<String>,

    #[arg(long, help = "Provider endpoint override (ollama base URL)")]
    pub endpoint: Option<String>,

    #[arg(long, help = "Environment variable holding the provider API key")]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ServeArgs {
    #[arg(long, help = "Listen address, defaults to backend.bind")]
    pub bind: Option<String>,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CompleteArgs {
    #[arg(long, help = "Python file, relative to the workspace")]
    pub file: PathBuf,

    #[arg(long, help = "0-based cursor line")]
    pub line: usize,

    #[arg(long, help = "0-based cursor column")]
    pub column: usize,

    #[arg(
        long,
        conflicts_with = "in_process",
        help = "Completion service URL, defaults to backend.url"
    )]
    pub backend: Option<String>,

    #[arg(long, help = "Call the model directly instead of a running server")]
    pub in_process: bool,

    #[arg(long, help = "Send whole classes for resolved methods")]
    pub expand_to_class: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CopyContextArgs {
    #[arg(long, requires_all = ["line", "column"], help = "Append implementations of symbols near this cursor")]
    pub file: Option<PathBuf>,

    #[arg(long, requires = "file")]
    pub line: Option<usize>,

    #[arg(long, requires = "file")]
    pub column: Option<usize>,

    #[arg(long, help = "Copy to the system clipboard instead of stdout")]
    pub clipboard: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum ContextCommand {
    /// List instances and the items of the active one
    List,
    /// Create an instance and make it active
    New { name: String },
    Rename { id: String, name: String },
    Remove { id: String },
    Activate { id: String },
    AddFile { path: String },
    AddUrl { url: String },
    AddText { text: String },
    EditText { index: usize, text: String },
    RemoveItem { index: usize },
    MoveItem { from: usize, to: usize },
    ToggleIgnore { index: usize },
    SetMain { index: usize },
    ClearMain,
    WebSearch {
        #[arg(value_parser = parse_toggle)]
        state: Toggle,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum SettingsCommand {
    Show,
    /// Store the Jina reader key; an empty value clears it
    SetJinaKey { key: String },
    AddModel {
        name: String,
        url: String,
        #[arg(long, default_value_t = 0)]
        paste_delay_ms: u64,
    },
    RemoveModel { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the completion backend over HTTP
    Serve(ServeArgs),
    /// Complete the line at a cursor and print the candidates
    Complete(CompleteArgs),
    /// Compile the active context instance
    CopyContext(CopyContextArgs),
    /// Manage context instances
    #[command(subcommand)]
    Context(ContextCommand),
    /// Manage stored settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Context-aware line completion daemon")]
pub struct Cli {
    #[arg(long, global = true, default_value = ".", help = "Workspace root")]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_provider(value: &str) -> Result<CompletionProviderKind, String> {
    value.parse()
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_toggle(value: &str) -> Result<Toggle, String> {
    value.parse()
}
