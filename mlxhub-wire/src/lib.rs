//! Wire types shared between the daemon's HTTP control plane
//! (`mlxhub-daemon`) and its clients (`mlxhub-cli`). These are plain
//! serializable DTOs — no behavior lives here.

use serde::{Deserialize, Serialize};

/// `GET /hub/status` response body (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    pub host: String,
    pub port: u16,
    pub model_starting_port: u16,
    pub enable_status_page: bool,
    pub log_level: String,
    pub models: Vec<ModelStatusEntry>,
    pub groups: Vec<GroupStatusEntry>,
    pub started_at: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelStatusEntry {
    pub name: String,
    pub port: u16,
    pub host: String,
    pub jit_enabled: bool,
    pub group: Option<String>,
    pub status: String,
    pub pid: Option<u32>,
    pub return_code: Option<i32>,
    pub last_error: Option<String>,
    pub started_at: Option<f64>,
    pub last_active: Option<f64>,
    pub uptime_seconds: Option<f64>,
    pub supervisor_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupStatusEntry {
    pub name: String,
    pub max_loaded: Option<u32>,
    pub idle_unload_trigger_min: Option<u32>,
    pub running: usize,
    pub total: usize,
}

/// Generic `{"detail": "..."}` body used by every mutating route on success
/// and by the 400 error path (spec §6.1, §7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
