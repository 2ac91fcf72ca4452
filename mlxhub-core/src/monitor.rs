//! Monitor Loop (spec §4.F): a background task that periodically reaps
//! exited children and enforces idle-unload on JIT-enabled groups.
//!
//! Runs as a `tokio::spawn`ed task rather than a dedicated OS thread — an
//! explicit, semantics-preserving substitution for the reference
//! implementation's background thread, since every operation it performs
//! (`try_wait`, table mutation) is non-blocking and fits naturally on the
//! async runtime the rest of the daemon already uses.

use std::sync::Arc;

use tracing::{info, warn};

use crate::runtime::{HubRuntime, HUB_POLL_INTERVAL_SECONDS};
use crate::state::{now_epoch_seconds, Status};

/// Spawn the monitor loop. The returned handle can be aborted on shutdown.
pub fn spawn_monitor(runtime: Arc<HubRuntime>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HUB_POLL_INTERVAL_SECONDS);
        loop {
            interval.tick().await;
            if runtime.is_shutting_down() {
                break;
            }
            reap_exited(&runtime);
            enforce_idle_unload(&runtime).await;
        }
    })
}

/// Non-blocking scan for children that exited without going through
/// `stop_model` (crashes, OOM kills, or a clean self-exit). Transitions them
/// to `stopped` on a zero exit code or `failed` otherwise, and bumps
/// `last_active` so idle-unload accounting stays current. Shared between
/// the monitor tick and the Status Projector (spec §4.G), which runs this
/// pass before every snapshot.
pub(crate) fn reap_exited(runtime: &Arc<HubRuntime>) {
    let names = runtime.table().model_names();
    for name in names {
        let exit_code: Option<Option<i32>> = runtime.table().with_model(&name, |state| {
            if state.status != Status::Running {
                return None;
            }
            let process = state.process.as_mut()?;
            match process.try_wait() {
                Ok(Some(exit_status)) => Some(exit_status.code()),
                _ => None,
            }
        });

        let Some(code) = exit_code.flatten() else { continue };
        let reported_code = code;
        runtime.table().with_model(&name, |state| {
            state.process = None;
            state.return_code = reported_code;
            state.last_active = Some(now_epoch_seconds());
            match reported_code {
                Some(0) => {
                    state.status = Status::Stopped;
                    state.last_error = None;
                }
                _ => {
                    state.status = Status::Failed;
                    state.last_error = Some("process exited unexpectedly".to_string());
                }
            }
        });
        warn!(model = %name, code = ?reported_code, "model process exited unexpectedly");
    }
}

/// Stops JIT-enabled, running models in groups with `idle_unload_trigger_min`
/// set once they have been idle (no `touch_active`) past the trigger.
async fn enforce_idle_unload(runtime: &Arc<HubRuntime>) {
    let groups = runtime.table().groups();
    let now = now_epoch_seconds();

    for group in groups {
        let Some(trigger_min) = group.idle_unload_trigger_min else { continue };
        let trigger_seconds = trigger_min as f64 * 60.0;

        let candidates: Vec<String> = runtime
            .table()
            .group_peers(&group.name)
            .into_iter()
            .filter(|(_, _, running)| *running)
            .map(|(name, _, _)| name)
            .collect();

        for name in candidates {
            let idle_for = runtime
                .table()
                .with_model(&name, |state| state.last_active.map(|last| now - last))
                .flatten();
            if idle_for.is_some_and(|idle| idle >= trigger_seconds) {
                info!(model = %name, group = %group.name, "idle-unloading model");
                if let Err(err) = runtime.unload_model(&name).await {
                    warn!(model = %name, error = %err, "idle unload failed");
                }
            }
        }
    }
}
