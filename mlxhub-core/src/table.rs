//! Process Table (spec §4.A): the single source of truth for per-model
//! runtime state, guarded by one `parking_lot::Mutex`.
//!
//! The guard returned by [`ProcessTable::lock`] must never be held across an
//! `.await` point — spawning a child, probing health, waiting on exit, and
//! sleeping are all blocking-I/O boundaries that run with the lock released.
//! Every public method here is synchronous for exactly that reason; callers
//! in `runtime.rs` take the lock, do a quick synchronous read/mutate, and
//! drop it before doing anything that awaits.

use std::collections::HashMap;
use std::sync::Arc;

use mlxhub_config::{GroupSpec, HubConfig};
use parking_lot::{Mutex, MutexGuard};

use crate::state::ModelState;

pub struct ProcessTable {
    inner: Mutex<Inner>,
}

struct Inner {
    models: HashMap<String, ModelState>,
    groups: Vec<GroupSpec>,
    host: String,
    port: u16,
    model_starting_port: u16,
    enable_status_page: bool,
    log_level: String,
    log_path: std::path::PathBuf,
}

impl ProcessTable {
    pub fn new(config: HubConfig) -> Arc<Self> {
        let models = config
            .models
            .into_iter()
            .map(|spec| (spec.name.clone(), ModelState::fresh(spec)))
            .collect();
        Arc::new(Self {
            inner: Mutex::new(Inner {
                models,
                groups: config.groups,
                host: config.host,
                port: config.port,
                model_starting_port: config.model_starting_port,
                enable_status_page: config.enable_status_page,
                log_level: config.log_level,
                log_path: config.log_path,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    pub fn host(&self) -> String {
        self.lock().host.clone()
    }

    pub fn port(&self) -> u16 {
        self.lock().port
    }

    pub fn model_starting_port(&self) -> u16 {
        self.lock().model_starting_port
    }

    pub fn enable_status_page(&self) -> bool {
        self.lock().enable_status_page
    }

    pub fn log_level(&self) -> String {
        self.lock().log_level.clone()
    }

    pub fn log_path(&self) -> std::path::PathBuf {
        self.lock().log_path.clone()
    }

    pub fn groups(&self) -> Vec<GroupSpec> {
        self.lock().groups.clone()
    }

    pub fn model_names(&self) -> Vec<String> {
        self.lock().models.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().models.contains_key(name)
    }

    /// Run `f` against the named model's state under the table lock. `f`
    /// must be synchronous; it must never block on I/O.
    pub fn with_model<R>(&self, name: &str, f: impl FnOnce(&mut ModelState) -> R) -> Option<R> {
        self.lock().models.get_mut(name).map(f)
    }

    /// Run `f` against every model's state under a single lock acquisition.
    pub fn with_all<R>(&self, mut f: impl FnMut(&str, &mut ModelState) -> R) -> Vec<R> {
        self.lock()
            .models
            .iter_mut()
            .map(|(name, state)| f(name, state))
            .collect()
    }

    /// Spec's group-eviction and idle-unload scans need read access to every
    /// peer sharing a group; this snapshots just enough to decide without
    /// holding the lock across the eventual stop.
    pub fn group_peers(&self, group: &str) -> Vec<(String, Option<f64>, bool)> {
        self.lock()
            .models
            .values()
            .filter(|state| state.spec.group.as_deref() == Some(group))
            .map(|state| (state.spec.name.clone(), state.start_timestamp, state.is_running()))
            .collect()
    }

    /// Atomically replace the table contents on a successful reload. Models
    /// whose spec is still process-compatible keep their running `process`
    /// handle and timestamps; everything else is recreated fresh.
    pub fn replace(&self, config: HubConfig) {
        let mut inner = self.lock();
        let mut next = HashMap::with_capacity(config.models.len());
        for spec in config.models {
            let carried = inner
                .models
                .remove(&spec.name)
                .filter(|existing| existing.spec.process_compatible(&spec) && existing.is_running());
            let state = match carried {
                Some(mut existing) => {
                    existing.spec = spec;
                    existing
                }
                None => ModelState::fresh(spec),
            };
            next.insert(state.spec.name.clone(), state);
        }
        inner.models = next;
        inner.groups = config.groups;
        inner.host = config.host;
        inner.port = config.port;
        inner.model_starting_port = config.model_starting_port;
        inner.enable_status_page = config.enable_status_page;
        inner.log_level = config.log_level;
        inner.log_path = config.log_path;
    }

    /// Every model still holding a running `process` handle. Used by the
    /// Shutdown Controller to stop everything on the way down.
    pub fn running_model_names(&self) -> Vec<String> {
        self.lock()
            .models
            .iter()
            .filter(|(_, state)| state.is_running())
            .map(|(name, _)| name.clone())
            .collect()
    }
}
