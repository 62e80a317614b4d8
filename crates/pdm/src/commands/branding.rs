//! Branding and license handlers.

use pdm_api::models::{BrandingColor, BrandingImage, License};
use tabled::Tabled;

use crate::cli::{BrandingArgs, BrandingCommand};
use crate::context::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ImageRow {
    #[tabled(rename = "Reference")]
    reference: String,
    #[tabled(rename = "URI")]
    uri: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&BrandingImage> for ImageRow {
    fn from(i: &BrandingImage) -> Self {
        Self {
            reference: i.reference.clone(),
            uri: i.static_uri.clone().unwrap_or_default(),
            updated: i.updated_at.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct ColorRow {
    #[tabled(rename = "Reference")]
    reference: String,
    #[tabled(rename = "Color")]
    color: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&BrandingColor> for ColorRow {
    fn from(c: &BrandingColor) -> Self {
        Self {
            reference: c.reference.clone(),
            color: c.color.clone().unwrap_or_default(),
            updated: c.updated_at.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct LicenseRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "License")]
    license: String,
}

fn account(ctx: &Context, args: &BrandingArgs) -> Result<String, CliError> {
    match &args.account {
        Some(account) => Ok(account.clone()),
        None => ctx.account_id(),
    }
}

pub async fn handle(ctx: &Context, command: BrandingCommand) -> Result<(), CliError> {
    ctx.require_session()?;
    let out = match command {
        BrandingCommand::Images(args) => {
            let account_id = account(ctx, &args)?;
            let images = ctx
                .client()
                .get_branding_images(&account_id, args.theme)
                .await?;
            output::render_list(
                ctx.format,
                &images.data,
                |i| ImageRow::from(i),
                |i| i.reference.clone(),
            )?
        }
        BrandingCommand::Colors(args) => {
            let account_id = account(ctx, &args)?;
            let colors = ctx
                .client()
                .get_branding_colors(&account_id, args.theme)
                .await?;
            output::render_list(
                ctx.format,
                &colors.data,
                |c| ColorRow::from(c),
                |c| c.reference.clone(),
            )?
        }
    };
    ctx.print(&out);
    Ok(())
}

pub async fn licenses(ctx: &Context) -> Result<(), CliError> {
    let licenses = ctx.client().get_licenses().await?;
    let out = output::render_list(
        ctx.format,
        &licenses,
        |l: &License| LicenseRow {
            name: l.name.clone(),
            license: l.license.clone(),
        },
        |l| l.name.clone(),
    )?;
    ctx.print(&out);
    Ok(())
}
