use std::sync::Arc;

use pdm_api::{CredentialStore, keys};
use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::CoreError;

/// Developer overrides persisted alongside the session.
///
/// Overrides only take effect while developer mode itself is on, so turning
/// developer mode off restores stock behaviour without clearing each flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum DeveloperFlag {
    DeveloperMode,
    DisableReauth,
    DisableMaxMtu,
    DisableJobAutoSync,
    DisableAssetDownload,
    DisableSdaTokenDownload,
}

impl DeveloperFlag {
    pub fn key(self) -> &'static str {
        match self {
            Self::DeveloperMode => keys::DEVELOPER_MODE,
            Self::DisableReauth => keys::DISABLE_REAUTH,
            Self::DisableMaxMtu => keys::DISABLE_MAX_MTU,
            Self::DisableJobAutoSync => keys::DISABLE_JOB_AUTO_SYNC,
            Self::DisableAssetDownload => keys::DISABLE_ASSET_DOWNLOAD,
            Self::DisableSdaTokenDownload => keys::DISABLE_SDA_TOKEN_DOWNLOAD,
        }
    }
}

#[derive(Clone)]
pub struct DeveloperOptions {
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for DeveloperOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeveloperOptions")
            .field("developer_mode", &self.developer_mode())
            .finish_non_exhaustive()
    }
}

impl DeveloperOptions {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn developer_mode(&self) -> bool {
        self.store.get_bool(keys::DEVELOPER_MODE)
    }

    /// Raw persisted value, regardless of developer mode.
    pub fn stored(&self, flag: DeveloperFlag) -> bool {
        self.store.get_bool(flag.key())
    }

    /// Whether `flag` is in force right now.
    pub fn is_set(&self, flag: DeveloperFlag) -> bool {
        match flag {
            DeveloperFlag::DeveloperMode => self.developer_mode(),
            other => self.developer_mode() && self.stored(other),
        }
    }

    pub fn set(&self, flag: DeveloperFlag, value: bool) -> Result<(), CoreError> {
        self.store.set_bool(flag.key(), value).map_err(CoreError::from)
    }

    pub fn auto_sync_enabled(&self) -> bool {
        !self.is_set(DeveloperFlag::DisableJobAutoSync)
    }

    pub fn asset_download_enabled(&self) -> bool {
        !self.is_set(DeveloperFlag::DisableAssetDownload)
    }

    pub fn sda_token_download_enabled(&self) -> bool {
        !self.is_set(DeveloperFlag::DisableSdaTokenDownload)
    }

    /// Renew the stored session for the selected account on demand.
    pub fn reauth_enabled(&self) -> bool {
        !self.is_set(DeveloperFlag::DisableReauth)
    }

    /// Negotiate the largest MTU on GATT connections instead of the default.
    pub fn max_mtu_enabled(&self) -> bool {
        !self.is_set(DeveloperFlag::DisableMaxMtu)
    }

    /// Every flag with its effective value, in declaration order.
    pub fn snapshot(&self) -> Vec<(DeveloperFlag, bool)> {
        DeveloperFlag::iter()
            .map(|flag| (flag, self.is_set(flag)))
            .collect()
    }
}
