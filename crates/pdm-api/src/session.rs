// Credential storage boundary and the injected session context.
//
// The key-value store itself is an external collaborator; this module only
// fixes the key layout and the read/write discipline around the token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::Error;
use crate::models::{Account, Session};

/// Persisted key names. Values are strings; booleans are `"true"`/`"false"`.
pub mod keys {
    pub const USER_NAME: &str = "userName";
    pub const ACCESS_TOKEN: &str = "userAccessToken";
    pub const ACCESS_TOKEN_EXPIRES_AT: &str = "accessTokenExpiresAt";
    pub const ACCOUNTS: &str = "accounts";
    pub const SELECTED_USER_ID: &str = "selectedUserId";
    pub const SELECTED_ACCOUNT_ID: &str = "selectedAccountId";
    pub const SELECTED_ACCOUNT_NAME: &str = "selectedAccountName";
    pub const CAPTCHA: &str = "captcha";
    pub const OTP_REQUIRED: &str = "otp_required";
    pub const DARK_THEME: &str = "darkThemeStatus";
    pub const WORKFLOW_ENABLED: &str = "workflowEnabled";

    // Developer overrides
    pub const DEVELOPER_MODE: &str = "developerMode";
    pub const DISABLE_REAUTH: &str = "disableReAuth";
    pub const DISABLE_MAX_MTU: &str = "disableMaxMtu";
    pub const DISABLE_JOB_AUTO_SYNC: &str = "disableJobAutoSync";
    pub const DISABLE_ASSET_DOWNLOAD: &str = "disableAssetDownload";
    pub const DISABLE_SDA_TOKEN_DOWNLOAD: &str = "disableSdaTokenDownload";
}

// ── Store boundary ───────────────────────────────────────────────────

/// Opaque string-keyed persistent store.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    fn remove(&self, key: &str) -> Result<(), Error>;

    /// Read a flag. Missing or unparsable values are `false`.
    fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), Error> {
        self.set(key, if value { "true" } else { "false" })
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// ── Session context ──────────────────────────────────────────────────

/// The one active session, shared by every client and repository.
///
/// The token is cached in an [`ArcSwapOption`] so request decoration never
/// touches the backing store. Only [`store_session`](Self::store_session),
/// [`switch_account`](Self::switch_account) and [`clear`](Self::clear) write.
pub struct SessionContext {
    store: Arc<dyn CredentialStore>,
    token: ArcSwapOption<SecretString>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("has_token", &self.has_token())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Wrap a store, picking up any token it already holds.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let token = store
            .get(keys::ACCESS_TOKEN)
            .filter(|t| !t.is_empty())
            .map(|t| Arc::new(SecretString::from(t)));
        Self {
            store,
            token: ArcSwapOption::new(token),
        }
    }

    /// Session backed by a fresh [`MemoryCredentialStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Current bearer token, if any.
    pub fn token(&self) -> Option<Arc<SecretString>> {
        self.token.load_full()
    }

    pub fn has_token(&self) -> bool {
        self.token.load().is_some()
    }

    /// Persist a login or impersonation result and make its token active.
    ///
    /// A lifetime that cannot be represented as a timestamp is rejected
    /// before anything is written.
    pub fn store_session(&self, session: &Session) -> Result<(), Error> {
        let expires_at = Duration::try_seconds(session.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| Error::Deserialization {
                message: format!("token lifetime out of range: {}s", session.expires_in),
                body: String::new(),
            })?;

        let token = session.token.expose_secret();
        self.store.set(keys::ACCESS_TOKEN, token)?;
        self.store
            .set(keys::ACCESS_TOKEN_EXPIRES_AT, &expires_at.to_rfc3339())?;

        if !session.accounts.is_empty() {
            let json = serde_json::to_string(&session.accounts)
                .map_err(|e| Error::Store(format!("cannot encode accounts: {e}")))?;
            self.store.set(keys::ACCOUNTS, &json)?;
        }
        if !session.account_id.is_empty() {
            self.store.set(keys::SELECTED_ACCOUNT_ID, &session.account_id)?;
            if let Some(account) = session.accounts.iter().find(|a| a.id == session.account_id) {
                self.store
                    .set(keys::SELECTED_ACCOUNT_NAME, account.label())?;
            }
        }
        if !session.user_id.is_empty() {
            self.store.set(keys::SELECTED_USER_ID, &session.user_id)?;
        }

        self.token
            .store(Some(Arc::new(SecretString::from(token.to_owned()))));
        debug!(account = %session.account_id, "session stored");
        Ok(())
    }

    /// Mark `account_id` as the selected account before re-authenticating.
    pub fn switch_account(&self, account_id: &str) -> Result<(), Error> {
        let name = self
            .accounts()
            .into_iter()
            .find(|a| a.id == account_id)
            .map(|a| a.label().to_owned())
            .unwrap_or_default();
        self.store.set(keys::SELECTED_ACCOUNT_ID, account_id)?;
        self.store.set(keys::SELECTED_ACCOUNT_NAME, &name)
    }

    /// Drop the token and everything tied to it. Preferences survive.
    pub fn clear(&self) -> Result<(), Error> {
        self.token.store(None);
        for key in [
            keys::ACCESS_TOKEN,
            keys::ACCESS_TOKEN_EXPIRES_AT,
            keys::ACCOUNTS,
            keys::SELECTED_ACCOUNT_ID,
            keys::SELECTED_ACCOUNT_NAME,
            keys::SELECTED_USER_ID,
        ] {
            self.store.remove(key)?;
        }
        debug!("session cleared");
        Ok(())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.store
            .get(keys::ACCESS_TOKEN_EXPIRES_AT)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// `true` when there is no token or its recorded expiry has passed.
    /// A token without a recorded expiry is trusted until the server says otherwise.
    pub fn token_expired(&self) -> bool {
        if !self.has_token() {
            return true;
        }
        self.expires_at().is_some_and(|at| at <= Utc::now())
    }

    /// Known accounts, with only the selected one flagged.
    pub fn accounts(&self) -> Vec<Account> {
        let selected = self.selected_account_id();
        let mut accounts: Vec<Account> = self
            .store
            .get(keys::ACCOUNTS)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        for account in &mut accounts {
            account.is_selected = selected.as_deref() == Some(account.id.as_str());
        }
        accounts
    }

    pub fn selected_account_id(&self) -> Option<String> {
        self.store
            .get(keys::SELECTED_ACCOUNT_ID)
            .filter(|id| !id.is_empty())
    }

    pub fn user_id(&self) -> Option<String> {
        self.store
            .get(keys::SELECTED_USER_ID)
            .filter(|id| !id.is_empty())
    }

    pub fn user_name(&self) -> Option<String> {
        self.store.get(keys::USER_NAME).filter(|n| !n.is_empty())
    }

    pub fn set_user_name(&self, name: &str) -> Result<(), Error> {
        self.store.set(keys::USER_NAME, name)
    }
}
