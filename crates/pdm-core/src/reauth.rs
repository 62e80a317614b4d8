// Session renewal for the selected account.
//
// A restarted client re-impersonates the account it last worked in so the
// stored token is fresh before any workflow traffic. Developer options can
// switch this off to keep a hand-placed token untouched.

use pdm_api::CloudClient;
use pdm_api::models::Session;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::options::DeveloperOptions;

#[derive(Debug)]
pub enum ReauthOutcome {
    /// A fresh session is stored and active.
    Renewed(Session),
    /// Renewal is switched off in developer options.
    Disabled,
    /// Nothing to renew: no session or no account has been chosen.
    NoSelectedAccount,
}

/// Impersonate the selected account again and store the returned session.
pub async fn reauthenticate(
    client: &CloudClient,
    options: &DeveloperOptions,
) -> Result<ReauthOutcome, CoreError> {
    if !options.reauth_enabled() {
        debug!("re-authentication disabled");
        return Ok(ReauthOutcome::Disabled);
    }
    let session = client.session();
    let account_id = match session.selected_account_id() {
        Some(id) if session.has_token() => id,
        _ => return Ok(ReauthOutcome::NoSelectedAccount),
    };

    let renewed = client.impersonate(&account_id).await?;
    session.store_session(&renewed)?;
    info!(account = %renewed.account_id, "session renewed");
    Ok(ReauthOutcome::Renewed(renewed))
}
