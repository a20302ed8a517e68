use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Manage the organizations connected to the Parley desktop shell",
    long_about = None
)]
pub struct Cli {
    /// Application data directory (defaults to the platform location).
    #[arg(long = "data-dir", value_name = "DIR", value_hint = ValueHint::DirPath, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Supported subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List registered organizations in tab order.
    List,
    /// Verify a server and register it as a new organization.
    #[command(alias = "connect")]
    Add(AddArgs),
    /// Disconnect the organization at a tab position.
    #[command(alias = "disconnect")]
    Remove(RemoveArgs),
    /// Re-verify the organization at a tab position in place.
    Refresh(RefreshArgs),
    /// Verify and register a provisioned list of organizations.
    Import(ImportArgs),
    /// Print the settings store path.
    Path,
}

/// Arguments for registering a single organization.
#[derive(Debug, Clone, Args)]
pub struct AddArgs {
    /// Server URL or bare host name.
    pub url: String,

    /// Skip certificate validation without prompting.
    #[arg(long, action = ArgAction::SetTrue)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    /// Tab position to disconnect.
    pub index: usize,
}

#[derive(Debug, Clone, Args)]
pub struct RefreshArgs {
    /// Tab position to refresh.
    pub index: usize,
}

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// Organization URLs to add.
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,
}
