//! Command dispatch: bridges CLI args -> cloud operations -> output formatting.

pub mod auth;
pub mod branding;
pub mod config_cmd;
pub mod developer;
pub mod devices;
pub mod workflows;

use crate::cli::{AccountsCommand, Command};
use crate::context::Context;
use crate::error::CliError;

/// Dispatch a cloud-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => auth::login(ctx, args).await,
        Command::Impersonate { account } => auth::impersonate(ctx, &account).await,
        Command::Logout => auth::logout(ctx),
        Command::Accounts { command: None } => auth::accounts(ctx),
        Command::Accounts {
            command: Some(AccountsCommand::Select { account }),
        } => auth::select_account(ctx, &account).await,
        Command::Reauth => auth::reauth(ctx).await,
        Command::Profile { command } => auth::profile(ctx, command).await,
        Command::Workflows(args) => workflows::list(ctx, args).await,
        Command::Sync { workflow } => workflows::sync(ctx, &workflow).await,
        Command::Download { file, dest } => workflows::download(ctx, &file, &dest).await,
        Command::Upload { path, mime } => workflows::upload(ctx, &path, mime).await,
        Command::UploadLogs { json_file } => workflows::upload_logs(ctx, &json_file).await,
        Command::Branding { command } => branding::handle(ctx, command).await,
        Command::Licenses => branding::licenses(ctx).await,
        Command::Devices(args) => devices::devices(ctx, &args).await,
        Command::Enrollments(args) => devices::enrollments(ctx, &args).await,
        Command::Enroll { identity } => devices::enroll(ctx, &identity).await,
        Command::Developer { command } => developer::handle(ctx, command),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
