//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use pdm_config::ConfigError;
use pdm_core::CoreError;
use thiserror::Error;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the cloud")]
    #[diagnostic(
        code(pdm::network_unavailable),
        help("Check your network connection and the configured environment (pdm config show).")
    )]
    NetworkUnavailable,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Not signed in")]
    #[diagnostic(code(pdm::not_signed_in), help("Run: pdm login <username>"))]
    NotSignedIn,

    #[error("Sign-in failed")]
    #[diagnostic(
        code(pdm::auth_failed),
        help(
            "Check the user name and password.\n\
             Accounts with two-factor authentication need --otp; repeated\n\
             failures may require --captcha-id and --captcha."
        )
    )]
    AuthFailed,

    #[error("Session expired or revoked")]
    #[diagnostic(code(pdm::unauthorized), help("Sign in again with: pdm login <username>"))]
    Unauthorized,

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource} '{identifier}' not found")]
    #[diagnostic(code(pdm::not_found))]
    NotFound { resource: String, identifier: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(pdm::api_error))]
    Api { message: String, status: Option<u16> },

    #[error("{operation} was not acknowledged")]
    #[diagnostic(code(pdm::not_acknowledged))]
    NotAcknowledged { operation: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pdm::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(pdm::config), help("Run `pdm config path` to locate the config file."))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(pdm::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NetworkUnavailable => exit_code::CONNECTION,
            Self::NotSignedIn | Self::AuthFailed | Self::Unauthorized => exit_code::AUTH,
            Self::NotFound { .. } | Self::Api { status: Some(404), .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NetworkUnavailable => Self::NetworkUnavailable,
            CoreError::Unauthorized => Self::Unauthorized,
            CoreError::ServerError { message, status } => Self::Api { message, status },
            CoreError::Io(e) => Self::Io(e),
            CoreError::Config { message } => Self::Validation {
                field: "credential store".into(),
                reason: message,
            },
            other @ (CoreError::BleUnavailable(_)
            | CoreError::BleScanFailure(_)
            | CoreError::BleLink(_)
            | CoreError::CancelledByClient) => Self::Api {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<pdm_api::Error> for CliError {
    fn from(err: pdm_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
