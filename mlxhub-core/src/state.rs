use std::time::{SystemTime, UNIX_EPOCH};

use mlxhub_config::ModelSpec;

/// Wall-clock seconds since the Unix epoch. Used throughout instead of
/// `Instant` because the status payload (spec §6.3) reports `started_at`/
/// `last_active` as epoch timestamps, and group-eviction / idle-unload
/// ordering only ever needs to compare two such timestamps.
pub fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// The five-way (plus `configured`) status enum from spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Configured,
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Configured => "configured",
            Status::Stopped => "stopped",
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Stopping => "stopping",
            Status::Failed => "failed",
        }
    }
}

/// Mutable per-model runtime state, keyed by name in the Process Table.
///
/// Invariants (spec §3), checked at every lock release by construction
/// rather than assertion:
/// 1. `process.is_some() => status in {Starting, Running, Stopping}`
/// 2. `process.is_none() => status in {Configured, Stopped, Failed}`
pub struct ModelState {
    pub spec: ModelSpec,
    pub status: Status,
    pub process: Option<tokio::process::Child>,
    pub return_code: Option<i32>,
    pub last_error: Option<String>,
    pub start_timestamp: Option<f64>,
    pub last_active: Option<f64>,
}

impl ModelState {
    /// Construct the initial state for a freshly loaded spec (spec §3
    /// invariant 5: `configured` when JIT, else `stopped`).
    pub fn fresh(spec: ModelSpec) -> Self {
        let status = if spec.jit_enabled {
            Status::Configured
        } else {
            Status::Stopped
        };
        Self {
            spec,
            status,
            process: None,
            return_code: None,
            last_error: None,
            start_timestamp: None,
            last_active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|c| c.id())
    }

    pub fn touch_active(&mut self) {
        self.last_active = Some(now_epoch_seconds());
    }
}
