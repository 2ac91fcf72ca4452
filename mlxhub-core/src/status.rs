//! Status Projector (spec §4.G): turns live process-table state into the
//! `GET /hub/status` wire payload (spec §6.3).

use std::sync::Arc;

use mlxhub_wire::{GroupStatusEntry, ModelStatusEntry, StatusPayload};

use crate::launcher::supervisor_log_path;
use crate::monitor::reap_exited;
use crate::runtime::HubRuntime;
use crate::state::now_epoch_seconds;

/// Builds the status payload after running the Reap pass (spec §4.G) so a
/// child that exited since the last monitor tick is reflected immediately
/// rather than left reporting stale `running`/pid state.
pub fn project(runtime: &Arc<HubRuntime>) -> StatusPayload {
    reap_exited(runtime);
    let table = runtime.table();
    let now = now_epoch_seconds();
    let log_path = table.log_path();

    let models = table.with_all(|name, state| ModelStatusEntry {
        name: name.to_string(),
        port: state.spec.port,
        host: state.spec.host.clone(),
        jit_enabled: state.spec.jit_enabled,
        group: state.spec.group.clone(),
        status: state.status.as_str().to_string(),
        pid: state.pid(),
        return_code: state.return_code,
        last_error: state.last_error.clone(),
        started_at: state.start_timestamp,
        last_active: state.last_active,
        uptime_seconds: state.start_timestamp.map(|started| (now - started).max(0.0)),
        supervisor_log: supervisor_log_path(&log_path, name).to_string_lossy().into_owned(),
    });

    let groups = table
        .groups()
        .into_iter()
        .map(|group| {
            let peers = table.group_peers(&group.name);
            GroupStatusEntry {
                name: group.name.clone(),
                max_loaded: group.max_loaded,
                idle_unload_trigger_min: group.idle_unload_trigger_min,
                running: peers.iter().filter(|(_, _, running)| *running).count(),
                total: peers.len(),
            }
        })
        .collect();

    StatusPayload {
        host: table.host(),
        port: table.port(),
        model_starting_port: table.model_starting_port(),
        enable_status_page: table.enable_status_page(),
        log_level: table.log_level(),
        models,
        groups,
        started_at: runtime.started_at(),
    }
}
