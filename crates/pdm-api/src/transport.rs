// Shared transport configuration for building reqwest::Client instances.
//
// Timeouts and the static request headers live here so every client the
// workspace builds talks to the cloud the same way.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::error::Error;

/// Connect, read and write timeout applied to every call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("pdm/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for establishing the connection.
    pub connect_timeout: Duration,
    /// Upper bound for the whole exchange, body included.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Use one value for both the connect and the request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: timeout,
            timeout,
        }
    }

    /// Build a `reqwest::Client` from this config.
    ///
    /// `Content-Type: application/json` is installed as a default header, so
    /// it rides on every request regardless of the endpoint. Bodies that carry
    /// their own content type (multipart uploads) keep theirs.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(Error::Transport)
    }
}
