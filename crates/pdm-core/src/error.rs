// ── Core error types ──
//
// Consumer-facing classification. The `From<pdm_api::Error>` impl folds
// transport detail into the few causes a consumer reacts to differently:
// offer a retry, ask for a fresh login, or give up.

use thiserror::Error;

use crate::ble::{BleUnavailableReason, LinkError, ScanFailureCode};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("No network connection")]
    NetworkUnavailable,

    /// The session token is missing, expired or revoked.
    #[error("Session is no longer authorized, sign in again")]
    Unauthorized,

    /// Any other unsuccessful cloud outcome, empty bodies included.
    #[error("Server error: {message}")]
    ServerError { message: String, status: Option<u16> },

    #[error("Bluetooth unavailable: {0}")]
    BleUnavailable(BleUnavailableReason),

    #[error("BLE scan failed (code {code}): {0}", code = .0.code())]
    BleScanFailure(ScanFailureCode),

    #[error("BLE link error: {0}")]
    BleLink(#[from] LinkError),

    #[error("Cancelled")]
    CancelledByClient,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Worth retrying without user intervention beyond a tap.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable | Self::ServerError { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pdm_api::Error> for CoreError {
    fn from(err: pdm_api::Error) -> Self {
        if err.is_network_unavailable() {
            return Self::NetworkUnavailable;
        }
        if err.is_unauthorized() {
            return Self::Unauthorized;
        }
        match err {
            pdm_api::Error::Io(e) => Self::Io(e),
            pdm_api::Error::Store(message) => Self::Config { message },
            other => Self::ServerError {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}
