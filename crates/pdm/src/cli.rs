//! Clap derive structures for the `pdm` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pdm_api::models::BrandingTheme;
use pdm_config::Environment;
use pdm_core::DeveloperFlag;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pdm -- Pelion Device Management from the command line
#[derive(Debug, Parser)]
#[command(
    name = "pdm",
    version,
    about = "Manage Pelion Device Management workflows, devices and accounts",
    long_about = "Command-line client for Pelion Device Management.\n\n\
        Signs in to the cloud, pages through assigned workflows, syncs them\n\
        and their file assets, and inspects devices and enrollments.",
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
pub struct GlobalOpts {
    /// Cloud environment (overrides config)
    #[arg(long, short = 'e', global = true)]
    pub environment: Option<Environment>,

    /// Custom API base URL (implies --environment custom)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Output format (overrides config)
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides config)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
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
    /// Sign in with a user name and password
    Login(LoginArgs),

    /// Switch the session to another account
    Impersonate {
        /// Account ID
        account: String,
    },

    /// Forget the stored session
    Logout,

    /// List the accounts known to the session
    Accounts {
        #[command(subcommand)]
        command: Option<AccountsCommand>,
    },

    /// Renew the session for the selected account
    Reauth,

    /// Show user or account profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// List workflows page by page
    #[command(alias = "wf")]
    Workflows(WorkflowsArgs),

    /// Mark one workflow as synced to this device
    Sync {
        /// Workflow ID
        workflow: String,
    },

    /// Download a workflow file asset
    Download {
        /// File ID
        file: String,

        /// Destination path
        #[arg(long = "out", short = 'o')]
        dest: PathBuf,
    },

    /// Upload a workflow file asset
    Upload {
        path: PathBuf,

        /// MIME type of the upload
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
    },

    /// Upload device run logs from a JSON file
    UploadLogs {
        /// JSON document sent verbatim
        json_file: PathBuf,
    },

    /// Show account branding
    Branding {
        #[command(subcommand)]
        command: BrandingCommand,
    },

    /// List registered devices
    #[command(alias = "dev")]
    Devices(ListArgs),

    /// List device enrollments
    Enrollments(ListArgs),

    /// Enroll a device by its enrollment identity
    Enroll {
        /// Enrollment identity (e.g. A-35:e7:...)
        identity: String,
    },

    /// Show third-party licenses published by the cloud
    Licenses,

    /// Inspect or change developer overrides
    Developer {
        #[command(subcommand)]
        command: DeveloperCommand,
    },

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Auth ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// User name (e-mail)
    pub username: String,

    /// Account to sign in to; the server picks one when omitted
    #[arg(long, short = 'a')]
    pub account: Option<String>,

    /// Captcha ID from a previous login attempt
    #[arg(long, requires = "captcha")]
    pub captcha_id: Option<String>,

    /// Captcha answer
    #[arg(long, requires = "captcha_id")]
    pub captcha: Option<String>,

    /// One-time password for accounts with two-factor authentication
    #[arg(long)]
    pub otp: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum AccountsCommand {
    /// Make a known account the selected one and renew the session for it
    Select {
        /// Account ID
        account: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// The signed-in user
    User,
    /// The selected account
    Account,
}

// ── Workflows ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WorkflowsArgs {
    /// Every workflow in the account, not only those assigned to you
    #[arg(long)]
    pub all: bool,

    /// Number of pages to fetch (0 for all)
    #[arg(long, default_value = "1")]
    pub pages: u32,

    /// Page size (overrides config)
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,

    /// Sync pending workflows and download their assets
    #[arg(long)]
    pub sync: bool,

    /// PEM public key to bind device-access tokens to while syncing
    #[arg(long, requires = "sync", value_name = "FILE")]
    pub pop_key: Option<PathBuf>,
}

// ── Shared List Arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Max results per page
    #[arg(long, short = 'l', default_value = "50")]
    pub limit: u32,

    /// Cursor: ID of the last item of the previous page
    #[arg(long)]
    pub after: Option<String>,

    /// Sort order
    #[arg(long)]
    pub order: Option<SortOrder>,

    /// Server-side filter expression (e.g. state__eq=registered)
    #[arg(long, short = 'f')]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_query(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

// ── Branding ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum BrandingCommand {
    /// Branding images (logos, backgrounds)
    Images(BrandingArgs),
    /// Branding colors
    Colors(BrandingArgs),
}

#[derive(Debug, Args)]
pub struct BrandingArgs {
    /// Theme: light or dark
    #[arg(long, short = 't', default_value = "light")]
    pub theme: BrandingTheme,

    /// Account ID (defaults to the selected account)
    #[arg(long, short = 'a')]
    pub account: Option<String>,
}

// ── Developer ────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum DeveloperCommand {
    /// Show every flag
    Show,
    /// Turn a flag on or off
    Set {
        flag: DeveloperFlag,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Select the cloud environment
    SetEnv {
        environment: Environment,

        /// Base URL, required for the custom environment
        #[arg(long)]
        custom_url: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
