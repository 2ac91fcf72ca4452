//! Lifecycle Coordinator (spec §4.E) and Shutdown Controller (spec §4.H).
//!
//! `HubRuntime` is the public entry point `mlxhub-daemon`'s HTTP layer calls
//! into. Every mutating operation follows the same shape: take the table
//! lock for a synchronous state transition, drop it, do the blocking I/O
//! (spawn/probe/wait/sleep), then take the lock again to record the
//! outcome. A per-model [`tokio::sync::Notify`] serializes concurrent
//! callers against the same model name so a second `start_model("alpha")`
//! that arrives while the first is still starting waits for the first to
//! finish rather than racing it or erroring outright.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mlxhub_config::{load_hub_config, HubConfig};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::HubRuntimeError;
use crate::health::{wait_for_health, HealthOutcome};
use crate::launcher;
use crate::policy::eviction_candidate;
use crate::state::{now_epoch_seconds, Status};
use crate::table::ProcessTable;

/// Interval between `/health` polls while a child is starting.
pub const DEFAULT_SIDECAR_HEALTH_INTERVAL: Duration = Duration::from_millis(500);
/// Total time a start is allowed before it is declared failed.
pub const DEFAULT_SIDECAR_HEALTH_TIMEOUT: Duration = Duration::from_secs(120);
/// Grace period after SIGTERM before a child is SIGKILLed.
pub const DEFAULT_SIDECAR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
/// Extra time given to the SIGKILL itself to be observed via `wait`.
const SHUTDOWN_KILL_GRACE: Duration = Duration::from_secs(5);
/// Background monitor tick (spec §4.F).
pub const HUB_POLL_INTERVAL_SECONDS: Duration = Duration::from_secs(5);

fn sidecar_binary() -> String {
    std::env::var("MLXHUB_SIDECAR_BIN").unwrap_or_else(|_| "mlx-openai-server".to_string())
}

pub struct HubRuntime {
    table: Arc<ProcessTable>,
    config_path: PathBuf,
    binary: String,
    client: reqwest::Client,
    notifies: Mutex<HashMap<String, Arc<Notify>>>,
    started_at: f64,
    shutting_down: std::sync::atomic::AtomicBool,
}

impl HubRuntime {
    pub fn new(config: HubConfig, config_path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            table: ProcessTable::new(config),
            config_path,
            binary: sidecar_binary(),
            client: reqwest::Client::new(),
            notifies: Mutex::new(HashMap::new()),
            started_at: now_epoch_seconds(),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn table(&self) -> &Arc<ProcessTable> {
        &self.table
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    fn notify_for(&self, name: &str) -> Arc<Notify> {
        self.notifies
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Start every configured model that is not `jit_enabled` (spec §8 E1:
    /// the hub brings up its non-JIT catalog on boot).
    pub async fn start_initial_models(self: &Arc<Self>) {
        let names = self.table.model_names();
        for name in names {
            let is_jit = self
                .table
                .with_model(&name, |state| state.spec.jit_enabled)
                .unwrap_or(true);
            if is_jit {
                continue;
            }
            if let Err(err) = self.start_model(&name).await {
                warn!(model = %name, error = %err, "failed to start model during boot");
            }
        }
    }

    pub async fn start_model(self: &Arc<Self>, name: &str) -> Result<(), HubRuntimeError> {
        self.begin_start(name).await
    }

    /// `load` and `start` share the same underlying transition: both bring a
    /// model from a non-running status to `running`. `load` is the verb
    /// used for JIT models triggered on demand; `start` is the explicit
    /// operator action. Both route through the same serialized start path
    /// so a JIT load racing an operator start cannot double-spawn.
    pub async fn load_model(self: &Arc<Self>, name: &str) -> Result<(), HubRuntimeError> {
        self.begin_start(name).await
    }

    async fn begin_start(self: &Arc<Self>, name: &str) -> Result<(), HubRuntimeError> {
        if !self.table.contains(name) {
            return Err(HubRuntimeError::UnknownModel(name.to_string()));
        }
        if self.is_shutting_down() {
            return Err(HubRuntimeError::Internal(format!(
                "hub is shutting down, refusing to start '{name}'"
            )));
        }

        loop {
            let claim = self.table.with_model(name, |state| {
                match state.status {
                    Status::Running => Some(Ok(())),
                    Status::Starting | Status::Stopping => None,
                    Status::Configured | Status::Stopped | Status::Failed => {
                        state.status = Status::Starting;
                        state.last_error = None;
                        Some(Err(()))
                    }
                }
            });

            match claim {
                None => {
                    self.notify_for(name).notified().await;
                    continue;
                }
                Some(Ok(())) => return Ok(()),
                Some(Err(())) => break,
            }
        }

        let result = self.do_start(name).await;
        self.notify_for(name).notify_waiters();
        result
    }

    async fn do_start(self: &Arc<Self>, name: &str) -> Result<(), HubRuntimeError> {
        self.enforce_group_capacity(name).await?;

        let spec = self
            .table
            .with_model(name, |state| state.spec.clone())
            .ok_or_else(|| HubRuntimeError::UnknownModel(name.to_string()))?;

        let log_path = self.table.log_path();
        let spawned = launcher::spawn(&spec, &self.binary, &log_path, name).await;

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                let message = err.to_string();
                self.table.with_model(name, |state| {
                    state.status = Status::Failed;
                    state.last_error = Some(message.clone());
                });
                return Err(HubRuntimeError::StartFailed { name: name.to_string(), message });
            }
        };

        let pid = child.id();
        let outcome = wait_for_health(
            &self.client,
            &spec.host,
            spec.port,
            &mut child,
            DEFAULT_SIDECAR_HEALTH_INTERVAL,
            DEFAULT_SIDECAR_HEALTH_TIMEOUT,
        )
        .await;

        match outcome {
            HealthOutcome::Healthy => {
                let now = now_epoch_seconds();
                self.table.with_model(name, |state| {
                    state.process = Some(child);
                    state.status = Status::Running;
                    state.start_timestamp = Some(now);
                    state.last_active = Some(now);
                    state.return_code = None;
                    state.last_error = None;
                });
                info!(model = %name, pid = ?pid, "model started");
                Ok(())
            }
            HealthOutcome::TimedOut => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                let message = "Health check failed: timed out waiting for /health".to_string();
                self.table.with_model(name, |state| {
                    state.status = Status::Failed;
                    state.last_error = Some(message.clone());
                });
                Err(HubRuntimeError::HealthCheckFailed(name.to_string()))
            }
            HealthOutcome::ProcessExited => {
                let status = child.wait().await.ok();
                let message = "process exited before becoming healthy".to_string();
                self.table.with_model(name, |state| {
                    state.status = Status::Failed;
                    state.return_code = status.and_then(|s| s.code());
                    state.last_error = Some(message.clone());
                });
                Err(HubRuntimeError::StartFailed { name: name.to_string(), message })
            }
        }
    }

    async fn enforce_group_capacity(&self, name: &str) -> Result<(), HubRuntimeError> {
        let group = self.table.with_model(name, |state| state.spec.group.clone()).flatten();
        let Some(group) = group else { return Ok(()) };
        let Some(max_loaded) = self
            .table
            .groups()
            .into_iter()
            .find(|g| g.name == group)
            .and_then(|g| g.max_loaded)
        else {
            return Ok(());
        };

        loop {
            let peers: Vec<_> = self
                .table
                .group_peers(&group)
                .into_iter()
                .filter(|(peer, _, _)| peer != name)
                .collect();
            let Some(victim) = eviction_candidate(&peers, max_loaded) else {
                return Ok(());
            };
            self.stop_model(&victim).await?;
        }
    }

    pub async fn stop_model(self: &Arc<Self>, name: &str) -> Result<(), HubRuntimeError> {
        self.unload_model(name).await
    }

    pub async fn unload_model(self: &Arc<Self>, name: &str) -> Result<(), HubRuntimeError> {
        if !self.table.contains(name) {
            return Err(HubRuntimeError::UnknownModel(name.to_string()));
        }

        loop {
            let claim = self.table.with_model(name, |state| match state.status {
                Status::Stopped | Status::Configured | Status::Failed => {
                    state.touch_active();
                    Some(Ok(()))
                }
                Status::Starting | Status::Stopping => None,
                Status::Running => {
                    state.status = Status::Stopping;
                    Some(Err(()))
                }
            });

            match claim {
                None => {
                    self.notify_for(name).notified().await;
                    continue;
                }
                Some(Ok(())) => return Ok(()),
                Some(Err(())) => break,
            }
        }

        let child = self.table.with_model(name, |state| state.process.take());

        if let Some(mut child) = child {
            stop_process(&mut child).await;
            let status = child.wait().await.ok();
            let return_code = status.and_then(|s| s.code());
            self.table.with_model(name, |state| {
                state.return_code = return_code;
                let now = now_epoch_seconds();
                state.last_active = Some(now);
                match return_code {
                    None | Some(0) => {
                        state.status = Status::Stopped;
                        state.last_error = None;
                    }
                    Some(code) => {
                        state.status = Status::Failed;
                        if state.last_error.is_none() {
                            state.last_error = Some(format!("exited with code {code}"));
                        }
                    }
                }
            });
        } else {
            self.table.with_model(name, |state| {
                state.status = Status::Stopped;
                state.touch_active();
            });
        }

        self.notify_for(name).notify_waiters();
        Ok(())
    }

    pub async fn stop_all_models(self: &Arc<Self>) {
        let names = self.table.running_model_names();
        for name in names {
            if let Err(err) = self.stop_model(&name).await {
                warn!(model = %name, error = %err, "failed to stop model during shutdown");
            }
        }
    }

    /// Config reload (spec §8 E4): re-read and re-validate `hub.toml`,
    /// reusing running children whose spec is still process-compatible.
    pub async fn reload_config(self: &Arc<Self>) -> Result<(), HubRuntimeError> {
        let persisted_ports = self.persisted_ports();
        let config = load_hub_config(&self.config_path, &persisted_ports)
            .map_err(|err| HubRuntimeError::ReloadFailed(err.to_string()))?;

        let new_by_name: HashMap<&str, &mlxhub_config::ModelSpec> =
            config.models.iter().map(|spec| (spec.name.as_str(), spec)).collect();

        for name in self.table.running_model_names() {
            let still_compatible = self
                .table
                .with_model(&name, |state| {
                    new_by_name.get(name.as_str()).is_some_and(|new_spec| {
                        state.spec.process_compatible(new_spec)
                    })
                })
                .unwrap_or(false);
            if !still_compatible {
                self.stop_model(&name).await?;
            }
        }

        self.table.replace(config);
        self.start_initial_models().await;
        Ok(())
    }

    fn persisted_ports(&self) -> HashMap<String, u16> {
        self.table
            .with_all(|name, state| (name.to_string(), state.spec.port))
            .into_iter()
            .collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Shutdown Controller (spec §4.H): stop every running model, then let
    /// the caller (the HTTP server's graceful-shutdown future) tear down
    /// the listener.
    pub async fn request_shutdown(self: &Arc<Self>) {
        self.shutting_down.store(true, std::sync::atomic::Ordering::SeqCst);
        self.stop_all_models().await;
    }
}

/// Graceful-then-forced stop: SIGTERM, wait up to
/// `DEFAULT_SIDECAR_SHUTDOWN_TIMEOUT`, then SIGKILL and wait up to
/// `SHUTDOWN_KILL_GRACE` more.
async fn stop_process(child: &mut tokio::process::Child) {
    let Some(pid) = child.id() else {
        return;
    };

    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }

    let graceful = tokio::time::timeout(DEFAULT_SIDECAR_SHUTDOWN_TIMEOUT, child.wait()).await;
    if graceful.is_ok() {
        return;
    }

    let _ = child.start_kill();
    let _ = tokio::time::timeout(SHUTDOWN_KILL_GRACE, child.wait()).await;
}
