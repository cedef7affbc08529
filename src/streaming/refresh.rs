//! The per-session refresh task.
//!
//! Ticks on a fixed interval anchored at the session start and republishes
//! the manifest. While an optimistically promoted transcode is still running,
//! the task also watches it and fails the session if it errors out.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::task::AbortOnDropHandle;

use super::session::{Session, TickOutcome};

/// A packaging run still in flight. Dropping it kills the engine.
pub type TranscodeHandle = AbortOnDropHandle<loopcast_av::Result<()>>;

/// Spawn the refresh task for `session` and register it for `stop()`.
///
/// The task runs under a supervisor that fails the session if it panics.
pub fn spawn(session: Arc<Session>, transcode: Option<TranscodeHandle>) {
    let inner = tokio::spawn(run(session.clone(), transcode));
    let supervised = session.clone();
    let handle: JoinHandle<()> = tokio::spawn(async move {
        if let Err(e) = inner.await {
            if e.is_panic() {
                supervised.fail(format!("refresh task panicked: {e}"));
            }
        }
    });
    session.set_refresh_handle(handle);
}

async fn run(session: Arc<Session>, mut transcode: Option<TranscodeHandle>) {
    let period = session.refresh_interval();
    let cancel = session.cancel_token();
    let mut interval = tokio::time::interval_at(session.started_at() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(
        session_id = %session.id(),
        period_ms = period.as_millis() as u64,
        "Refresh task started"
    );

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = transcode_finished(&mut transcode) => {
                transcode = None;
                match result {
                    Ok(Ok(())) => {
                        session.store().source().mark_packaged();
                        tracing::info!(session_id = %session.id(), "Packaging finished");
                    }
                    Ok(Err(e)) => {
                        session.fail(format!("transcode failed: {e}"));
                        break;
                    }
                    Err(e) => {
                        session.fail(format!("transcode task failed: {e}"));
                        break;
                    }
                }
            }

            deadline = interval.tick() => {
                if let TickOutcome::AssetGone(e) = session.tick(deadline) {
                    session.fail(format!("packaged asset is gone: {e}"));
                    break;
                }
            }
        }
    }

    tracing::debug!(session_id = %session.id(), "Refresh task stopped");
}

async fn transcode_finished(
    transcode: &mut Option<TranscodeHandle>,
) -> Result<loopcast_av::Result<()>, JoinError> {
    match transcode {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
