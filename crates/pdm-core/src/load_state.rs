use serde::Serialize;

use crate::error::CoreError;

/// Condition of a paged workflow source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadState {
    Loading,
    /// A page arrived and more remain.
    Loaded,
    /// The last page arrived.
    Downloaded,
    Failed,
    Unauthorized,
    NoNetwork,
    /// The first page came back with nothing in it.
    Empty,
}

impl LoadState {
    /// State a failed request leaves the source in.
    pub fn for_error(err: &CoreError) -> Self {
        match err {
            CoreError::NetworkUnavailable => Self::NoNetwork,
            CoreError::Unauthorized => Self::Unauthorized,
            _ => Self::Failed,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Failed | Self::Unauthorized | Self::NoNetwork)
    }

    /// No further page will be requested until a refresh.
    pub fn is_exhausted(self) -> bool {
        matches!(self, Self::Downloaded | Self::Empty)
    }
}
