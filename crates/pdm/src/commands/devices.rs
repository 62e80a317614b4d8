//! Device and enrollment handlers.

use pdm_api::models::{DeviceQuery, Enrollment, IoTDevice};
use tabled::Tabled;

use crate::cli::ListArgs;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl DeviceRow {
    fn new(d: &IoTDevice, color: bool) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone().unwrap_or_default(),
            endpoint: d.endpoint_name.clone().unwrap_or_default(),
            state: output::paint_status(&d.state, color),
            created: d.created_at.clone(),
        }
    }
}

#[derive(Tabled)]
struct EnrollmentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Expires")]
    expires: String,
}

impl From<&Enrollment> for EnrollmentRow {
    fn from(e: &Enrollment) -> Self {
        Self {
            id: e.id.clone(),
            identity: e.enrollment_identity.clone(),
            device: e.enrolled_device_id.clone().unwrap_or_default(),
            expires: e.expires_at.clone().unwrap_or_default(),
        }
    }
}

fn query(args: &ListArgs) -> DeviceQuery {
    DeviceQuery {
        limit: Some(args.limit),
        after: args.after.clone(),
        order: args.order.map(|o| o.as_query().to_owned()),
        filter: args.filter.clone(),
    }
}

/// Cursor hint for the next page, on stderr.
fn more_hint(ctx: &Context, cursor: Option<String>) {
    if let Some(cursor) = cursor {
        ctx.notice(&format!("More results: --after {cursor}"));
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn devices(ctx: &Context, args: &ListArgs) -> Result<(), CliError> {
    ctx.require_session()?;
    let page = ctx.client().get_devices(&query(args)).await?;
    let color = ctx.color;
    let out = output::render_list(
        ctx.format,
        &page.data,
        |d| DeviceRow::new(d, color),
        |d| d.id.clone(),
    )?;
    ctx.print(&out);
    more_hint(ctx, page.next_cursor());
    Ok(())
}

pub async fn enrollments(ctx: &Context, args: &ListArgs) -> Result<(), CliError> {
    ctx.require_session()?;
    let page = ctx.client().get_enrolling_devices(&query(args)).await?;
    let out = output::render_list(
        ctx.format,
        &page.data,
        |e| EnrollmentRow::from(e),
        |e| e.id.clone(),
    )?;
    ctx.print(&out);
    more_hint(ctx, page.next_cursor());
    Ok(())
}

pub async fn enroll(ctx: &Context, identity: &str) -> Result<(), CliError> {
    ctx.require_session()?;
    if identity.trim().is_empty() {
        return Err(CliError::Validation {
            field: "identity".into(),
            reason: "must not be empty".into(),
        });
    }
    let enrollment = ctx.client().enroll_device(identity).await?;
    let out = output::render_single(
        ctx.format,
        &enrollment,
        |e| {
            vec![
                ("ID", e.id.clone()),
                ("Identity", e.enrollment_identity.clone()),
                ("Account", e.account_id.clone()),
                ("Expires", e.expires_at.clone().unwrap_or_default()),
            ]
        },
        |e| e.id.clone(),
    )?;
    ctx.print(&out);
    Ok(())
}
