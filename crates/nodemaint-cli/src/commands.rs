use std::sync::Arc;

use anyhow::{Context, Result};
use nodemaint_core::NodeMaintConfig;
use nodemaint_directory::DirectoryClient;
use nodemaint_scheduler::{CycleOutcome, Request, RequestScheduler, RequestSpec};
use tracing::{info, warn};

pub fn open_scheduler(config: &NodeMaintConfig) -> Result<RequestScheduler> {
    let directory = DirectoryClient::new(&config.directory, config.node.node_id())
        .context("failed to build directory client")?;
    info!(
        node = %config.node.id,
        spool = %config.spool.path.display(),
        directory = %config.directory.base_url,
        "nodemaint starting"
    );
    Ok(RequestScheduler::from_config(config, Arc::new(directory)))
}

pub async fn cycle(scheduler: &mut RequestScheduler) -> Result<()> {
    let report = scheduler.run_cycle().await.context("maintenance cycle failed")?;
    match &report.outcome {
        CycleOutcome::PrepareFailed { exit_code } => {
            warn!(exit_code, "prepare failed; will retry next cycle")
        }
        CycleOutcome::FinishFailed { exit_code, .. } => {
            warn!(exit_code, "finish failed; node is flagged in service")
        }
        _ => {}
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn add(
    scheduler: &mut RequestScheduler,
    estimate: i64,
    comment: String,
    script: Option<String>,
    applicable: Option<String>,
    uuid: Option<String>,
) -> Result<()> {
    let mut spec = RequestSpec::new(estimate, comment);
    if let Some(script) = script {
        spec = spec.with_script(script);
    }
    if let Some(applicable) = applicable {
        spec = spec.with_applicable(applicable);
    }
    if let Some(uuid) = uuid {
        spec = spec.with_uuid(uuid);
    }

    let request = scheduler.add_request(spec)?;
    println!("{} {}", request.reqid(), request.uuid());
    Ok(())
}

pub fn list(scheduler: &mut RequestScheduler, archive: bool) -> Result<()> {
    let requests = if archive {
        scheduler.archived_requests()?
    } else {
        scheduler.requests()?
    };
    for request in &requests {
        println!("{}", list_line(request));
    }
    Ok(())
}

pub fn show(scheduler: &mut RequestScheduler, reqid: u64) -> Result<()> {
    let request = scheduler.request(reqid)?;
    println!("{}", serde_json::to_string_pretty(&request.summary())?);
    Ok(())
}

fn list_line(request: &Request) -> String {
    format!(
        "{:>6}  {}  {:<10}  {:>3}  {}",
        request.reqid(),
        request.short_uuid(),
        request.state().to_string(),
        request.attempts(),
        request.comment()
    )
}
