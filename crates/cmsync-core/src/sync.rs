use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::reconcile::{reconcile, CycleReport};
use crate::state::{StateProvider, SyncError};

/// What to do when a cycle fails. `Fail` surfaces the error and the process
/// exits; `Retry` logs it and waits for the next interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Fail,
    Retry,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub namespace: String,
    pub selector: String,
    pub output_dir: PathBuf,
    pub interval: Duration,
    pub on_error: ErrorPolicy,
}

/// One fetch-then-reconcile pass.
///
/// # Errors
///
/// Returns `SyncError::Remote` when the provider cannot deliver the full
/// matching set, `SyncError::Filesystem` when materialization fails.
pub async fn run_cycle<P: StateProvider>(
    provider: &P,
    settings: &SyncSettings,
) -> Result<CycleReport, SyncError> {
    let desired = provider
        .list(&settings.namespace, &settings.selector)
        .await?;
    info!(
        count = desired.len(),
        selector = %settings.selector,
        "fetched matching objects"
    );

    let mut report = reconcile(&desired, &settings.output_dir)?;
    report.fetched_objects = desired.len();
    for failure in &report.cleanup_errors {
        warn!(path = %failure.path.display(), error = %failure.error, "stale cleanup failed");
    }
    Ok(report)
}

/// Runs cycles forever, sleeping `interval` between them. Creates the output
/// root up front. Returns only on a cycle error under the `Fail` policy;
/// otherwise the process runs until externally signaled.
///
/// # Errors
///
/// Propagates the first cycle error when `on_error` is `ErrorPolicy::Fail`,
/// and any failure to create the output root.
pub async fn run_loop<P: StateProvider>(
    provider: &P,
    settings: &SyncSettings,
) -> Result<(), SyncError> {
    fs::create_dir_all(&settings.output_dir)
        .map_err(|err| SyncError::fs(&settings.output_dir, err))?;

    loop {
        match run_cycle(provider, settings).await {
            Ok(report) => info!(
                fetched = report.fetched_objects,
                removed_objects = report.removed_objects,
                removed_files = report.removed_files,
                written_files = report.written_files,
                cleanup_errors = report.cleanup_errors.len(),
                "cycle complete"
            ),
            Err(err) => absorb_cycle_error(settings.on_error, err)?,
        }
        tokio::time::sleep(settings.interval).await;
    }
}

/// Applies the configured policy to a failed cycle.
fn absorb_cycle_error(policy: ErrorPolicy, err: SyncError) -> Result<(), SyncError> {
    match policy {
        ErrorPolicy::Fail => Err(err),
        ErrorPolicy::Retry => {
            warn!(error = %err, "cycle failed; retrying after the next interval");
            Ok(())
        }
    }
}
