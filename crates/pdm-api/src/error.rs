use thiserror::Error;

/// Top-level error type for the `pdm-api` crate.
///
/// Every failure the cloud client can hit ends up here: transport,
/// authentication, server-reported errors, decoding and local I/O.
/// `pdm-core` classifies these into the user-facing taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The token was rejected (HTTP 401/403): expired, revoked or missing.
    #[error("Unauthorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    // ── Server ──────────────────────────────────────────────────────
    /// Structured error reported by the cloud service.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<u16>,
        error_type: Option<String>,
    },

    /// Success status, but the body the caller needed was empty.
    #[error("Empty response body (HTTP {status})")]
    EmptyBody { status: u16 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Local file I/O while streaming a download or reading an upload.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The credential store refused a read or write.
    #[error("Credential store error: {0}")]
    Store(String),
}

impl Error {
    /// Returns `true` if the server rejected the session token.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Unauthorized { .. } => true,
            Self::Transport(e) => matches!(e.status().map(|s| s.as_u16()), Some(401 | 403)),
            _ => false,
        }
    }

    /// Returns `true` if the request never reached the server or never
    /// came back: DNS, refused connection, reset, timeout.
    pub fn is_network_unavailable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    /// HTTP status attached to this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. }
            | Self::Api { status, .. }
            | Self::EmptyBody { status } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
