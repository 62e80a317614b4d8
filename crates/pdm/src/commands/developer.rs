//! Developer override handlers.

use pdm_core::DeveloperFlag;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::DeveloperCommand;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct FlagState {
    flag: DeveloperFlag,
    stored: bool,
    effective: bool,
}

#[derive(Tabled)]
struct FlagRow {
    #[tabled(rename = "Flag")]
    flag: String,
    #[tabled(rename = "Stored")]
    stored: bool,
    #[tabled(rename = "Effective")]
    effective: bool,
}

pub fn handle(ctx: &Context, command: DeveloperCommand) -> Result<(), CliError> {
    let options = ctx.options();
    match command {
        DeveloperCommand::Show => {
            let states: Vec<FlagState> = options
                .snapshot()
                .into_iter()
                .map(|(flag, effective)| FlagState {
                    flag,
                    stored: options.stored(flag),
                    effective,
                })
                .collect();
            let out = output::render_list(
                ctx.format,
                &states,
                |s| FlagRow {
                    flag: s.flag.to_string(),
                    stored: s.stored,
                    effective: s.effective,
                },
                |s| format!("{}={}", s.flag, s.effective),
            )?;
            ctx.print(&out);
        }
        DeveloperCommand::Set { flag, value } => {
            options.set(flag, value)?;
            if flag != DeveloperFlag::DeveloperMode && !options.developer_mode() {
                ctx.notice("Stored; takes effect once developer-mode is on");
            } else {
                ctx.notice(&format!("{flag} = {value}"));
            }
        }
    }
    Ok(())
}
