//! Workflow listing, sync and asset transfer handlers.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use pdm_api::models::{FilePart, UploadAck, Workflow};
use pdm_core::{
    AllWorkflows, AssetOutcome, AssignedWorkflows, LoadState, PageOutcome, SdaOutcome,
    SyncOutcome, WorkflowPageSource, WorkflowPager, WorkflowSyncer,
};
use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::WorkflowsArgs;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct WorkflowRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Tasks")]
    tasks: usize,
    #[tabled(rename = "Created")]
    created: String,
}

impl WorkflowRow {
    fn new(w: &Workflow, color: bool) -> Self {
        Self {
            id: w.id.clone(),
            name: w.name.clone(),
            status: output::paint_status(&w.status, color),
            tasks: w.tasks.len(),
            created: w.created_at.clone(),
        }
    }
}

fn ack_detail(ack: &UploadAck) -> Vec<(&'static str, String)> {
    vec![
        ("ID", ack.id.clone()),
        ("Created", ack.created_at.clone().unwrap_or_default()),
    ]
}

// ── Progress ────────────────────────────────────────────────────────

fn spinner(ctx: &Context, message: &str) -> ProgressBar {
    if ctx.quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_owned());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

// ── Handlers ────────────────────────────────────────────────────────

/// Pull up to `pages` pages (all when 0) through the pager.
async fn fetch_pages<S: WorkflowPageSource>(
    ctx: &Context,
    pager: &WorkflowPager<S>,
    pages: u32,
) -> Result<Vec<Workflow>, CliError> {
    let bar = spinner(ctx, "Loading workflows");
    let mut workflows = Vec::new();
    let mut fetched = 0u32;

    while pages == 0 || fetched < pages {
        match pager.load_next().await {
            Ok(PageOutcome::Items(items)) => {
                fetched += 1;
                workflows.extend(items);
                bar.set_message(format!("Loaded {} workflows", workflows.len()));
            }
            Ok(PageOutcome::Exhausted | PageOutcome::Busy | PageOutcome::Superseded) => break,
            Err(e) => {
                bar.finish_and_clear();
                return Err(e.into());
            }
        }
    }
    bar.finish_and_clear();

    debug!(pages = fetched, state = ?pager.state(), "workflow paging stopped");
    if pager.state() == Some(LoadState::Empty) {
        ctx.notice("No workflows");
    }
    Ok(workflows)
}

pub async fn list(ctx: &Context, args: WorkflowsArgs) -> Result<(), CliError> {
    ctx.require_session()?;
    let page_size = args.limit.unwrap_or(ctx.config.page_size);
    let client = ctx.client().clone();

    let mut workflows = if args.all {
        let pager = WorkflowPager::new(AllWorkflows::new(client), page_size);
        fetch_pages(ctx, &pager, args.pages).await?
    } else {
        let user_id = ctx.session().user_id().ok_or(CliError::NotSignedIn)?;
        let pager = WorkflowPager::new(AssignedWorkflows::new(client, user_id), page_size);
        fetch_pages(ctx, &pager, args.pages).await?
    };

    if args.sync {
        sync_page(ctx, &mut workflows, args.pop_key.as_deref()).await?;
    }

    let color = ctx.color;
    let out = output::render_list(
        ctx.format,
        &workflows,
        |w| WorkflowRow::new(w, color),
        |w| w.id.clone(),
    )?;
    ctx.print(&out);
    Ok(())
}

async fn sync_page(
    ctx: &Context,
    workflows: &mut [Workflow],
    pop_key: Option<&Path>,
) -> Result<(), CliError> {
    let mut syncer = WorkflowSyncer::new(
        ctx.client().clone(),
        ctx.options(),
        ctx.config.assets_dir(),
    );
    if let Some(pop_key) = pop_key {
        syncer = syncer.with_pop_key(tokio::fs::read_to_string(pop_key).await?);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let bar = spinner(ctx, "Syncing workflows");
    let report = syncer.process(workflows, &cancel).await;
    bar.finish_and_clear();
    interrupt.abort();

    for workflow in &report.workflows {
        if let SdaOutcome::Failed(reason) = &workflow.sda_token {
            ctx.notice(&format!(
                "{}: device-access token failed: {reason}",
                workflow.workflow_id
            ));
        }
        if let SyncOutcome::Failed(reason) = &workflow.sync {
            ctx.notice(&format!("{}: sync failed: {reason}", workflow.workflow_id));
        }
        for asset in &workflow.assets {
            if let AssetOutcome::Failed(reason) = &asset.outcome {
                ctx.notice(&format!(
                    "{}: asset {} failed: {reason}",
                    workflow.workflow_id, asset.file_id
                ));
            }
        }
    }
    let mut summary = format!(
        "Synced {}, downloaded {} assets, {} failures",
        report.synced(),
        report.downloaded(),
        report.failures()
    );
    if report.cancelled {
        summary.push_str(" (interrupted)");
    }
    ctx.notice(&summary);
    Ok(())
}

pub async fn sync(ctx: &Context, workflow_id: &str) -> Result<(), CliError> {
    ctx.require_session()?;
    if !ctx.client().sync_workflow(workflow_id).await? {
        return Err(CliError::NotAcknowledged {
            operation: format!("Sync of workflow '{workflow_id}'"),
        });
    }
    ctx.notice(&format!("Workflow {workflow_id} synced"));
    Ok(())
}

pub async fn download(ctx: &Context, file_id: &str, dest: &Path) -> Result<(), CliError> {
    ctx.require_session()?;
    let download = ctx
        .client()
        .download_workflow_file(file_id)
        .await
        .map_err(|e| match e.status() {
            Some(404) => CliError::NotFound {
                resource: "file".into(),
                identifier: file_id.to_owned(),
            },
            _ => e.into(),
        })?;

    let bar = spinner(ctx, &format!("Downloading {file_id}"));
    let written = download.save_to(dest).await;
    bar.finish_and_clear();

    let bytes = written?;
    ctx.notice(&format!("Saved {bytes} bytes to {}", dest.display()));
    Ok(())
}

pub async fn upload(ctx: &Context, path: &Path, mime: String) -> Result<(), CliError> {
    ctx.require_session()?;
    let part = FilePart::from_path(path).await?.with_mime(mime);
    let ack = ctx.client().upload_workflow_file(part).await?;
    let out = output::render_single(ctx.format, &ack, ack_detail, |a| a.id.clone())?;
    ctx.print(&out);
    Ok(())
}

pub async fn upload_logs(ctx: &Context, json_file: &Path) -> Result<(), CliError> {
    ctx.require_session()?;
    let raw = tokio::fs::read_to_string(json_file).await?;
    // Sent verbatim; parsed only to reject a malformed file before the upload.
    serde_json::from_str::<serde_json::Value>(&raw)?;
    let ack = ctx.client().upload_device_run_logs(raw).await?;
    let out = output::render_single(ctx.format, &ack, ack_detail, |a| a.id.clone())?;
    ctx.print(&out);
    Ok(())
}
