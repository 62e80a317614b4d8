//! Sign-in, session and profile handlers.

use pdm_api::models::{Account, LoginRequest};
use pdm_core::{ReauthOutcome, reauthenticate};
use secrecy::SecretString;
use tabled::Tabled;

use crate::cli::{LoginArgs, ProfileCommand};
use crate::context::Context;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AccountRow {
    #[tabled(rename = "")]
    selected: &'static str,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&Account> for AccountRow {
    fn from(a: &Account) -> Self {
        Self {
            selected: if a.is_selected { "*" } else { "" },
            id: a.id.clone(),
            name: a.label().to_owned(),
            status: a.status.clone(),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

fn read_password() -> Result<SecretString, CliError> {
    if let Some(password) = pdm_config::password_from_env() {
        return Ok(password);
    }
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(SecretString::from(password))
}

pub async fn login(ctx: &Context, args: LoginArgs) -> Result<(), CliError> {
    let password = read_password()?;

    let mut request = LoginRequest::new(&args.username, password);
    if let Some(account) = args.account.filter(|a| !a.is_empty()) {
        request = request.with_account(account);
    }
    if let (Some(id), Some(answer)) = (args.captcha_id, args.captcha) {
        request = request.with_captcha(id, answer);
    }
    if let Some(otp) = args.otp {
        request = request.with_otp(otp);
    }

    let session = ctx
        .repository
        .authenticate_with(&request)
        .await
        .ok_or(CliError::AuthFailed)?;

    let account = session
        .accounts
        .iter()
        .find(|a| a.id == session.account_id)
        .map_or(session.account_id.as_str(), Account::label);
    ctx.notice(&format!("Signed in as {} ({account})", args.username));
    Ok(())
}

pub async fn impersonate(ctx: &Context, account_id: &str) -> Result<(), CliError> {
    ctx.require_session()?;
    ctx.repository
        .impersonate(account_id)
        .await
        .ok_or_else(|| CliError::NotAcknowledged {
            operation: format!("Switch to account '{account_id}'"),
        })?;
    ctx.notice(&format!("Switched to account {account_id}"));
    Ok(())
}

pub fn logout(ctx: &Context) -> Result<(), CliError> {
    if !ctx.repository.sign_out() {
        return Err(CliError::NotAcknowledged {
            operation: "Sign-out".into(),
        });
    }
    ctx.notice("Signed out");
    Ok(())
}

pub fn accounts(ctx: &Context) -> Result<(), CliError> {
    let accounts = ctx.session().accounts();
    if accounts.is_empty() {
        return Err(CliError::NotSignedIn);
    }
    let out = output::render_list(ctx.format, &accounts, |a| AccountRow::from(a), |a| a.id.clone())?;
    ctx.print(&out);
    Ok(())
}

pub async fn select_account(ctx: &Context, account_id: &str) -> Result<(), CliError> {
    ctx.require_session()?;
    let session = ctx.session();
    if !session.accounts().iter().any(|a| a.id == account_id) {
        return Err(CliError::NotFound {
            resource: "account".into(),
            identifier: account_id.to_owned(),
        });
    }
    session.switch_account(account_id)?;
    report_reauth(ctx, reauthenticate(ctx.client(), &ctx.options()).await?);
    Ok(())
}

pub async fn reauth(ctx: &Context) -> Result<(), CliError> {
    ctx.require_session()?;
    match reauthenticate(ctx.client(), &ctx.options()).await? {
        ReauthOutcome::NoSelectedAccount => Err(CliError::Validation {
            field: "account".into(),
            reason: "no account selected, run `pdm accounts select`".into(),
        }),
        outcome => {
            report_reauth(ctx, outcome);
            Ok(())
        }
    }
}

fn report_reauth(ctx: &Context, outcome: ReauthOutcome) {
    match outcome {
        ReauthOutcome::Renewed(session) => {
            ctx.notice(&format!("Session renewed for account {}", session.account_id));
        }
        ReauthOutcome::Disabled => ctx.notice("Re-authentication is disabled"),
        ReauthOutcome::NoSelectedAccount => ctx.notice("No account selected"),
    }
}

pub async fn profile(ctx: &Context, command: ProfileCommand) -> Result<(), CliError> {
    ctx.require_session()?;
    let out = match command {
        ProfileCommand::User => {
            let user = ctx.client().get_user_profile().await?;
            output::render_single(
                ctx.format,
                &user,
                |u| {
                    vec![
                        ("ID", u.id.clone()),
                        ("Name", u.full_name.clone()),
                        ("Email", u.email.clone()),
                        ("Account", u.account_id.clone()),
                        ("Status", u.status.clone()),
                        ("2FA", u.is_totp_enabled.to_string()),
                        ("Logins", u.login_history.len().to_string()),
                    ]
                },
                |u| u.id.clone(),
            )?
        }
        ProfileCommand::Account => {
            let account = ctx.client().get_account_profile().await?;
            output::render_single(
                ctx.format,
                &account,
                |a| {
                    vec![
                        ("ID", a.id.clone()),
                        ("Name", a.display_name.clone()),
                        ("Email", a.email.clone()),
                        ("Company", a.company.clone().unwrap_or_default()),
                        (
                            "Theme",
                            a.custom_fields.default_theme.clone().unwrap_or_default(),
                        ),
                    ]
                },
                |a| a.id.clone(),
            )?
        }
    };
    ctx.print(&out);
    Ok(())
}
