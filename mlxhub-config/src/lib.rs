//! Configuration loading and validation for the mlx-hub daemon.
//!
//! Parses `hub.toml` into an immutable [`HubConfig`] value: a list of
//! [`ModelSpec`] and [`GroupSpec`], plus daemon bind info. The Hub Runtime
//! (`mlxhub-core`) only ever consumes the result of [`load_hub_config`]; it
//! never reads the file itself.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default port the first model without an explicit port is assigned.
pub const DEFAULT_STARTING_PORT: u16 = 5005;

#[derive(Debug, Error)]
pub enum HubConfigError {
    #[error("failed to read hub config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse hub config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("hub config has no models defined")]
    NoModels,
    #[error("duplicate model name '{0}'")]
    DuplicateModel(String),
    #[error("model '{0}' is missing required field 'model_path'")]
    MissingModelPath(String),
    #[error("model '{model}' references undeclared group '{group}'")]
    UnknownGroup { model: String, group: String },
    #[error("duplicate group name '{0}'")]
    DuplicateGroup(String),
    #[error("group '{0}' has invalid max_loaded; it must be a positive integer")]
    InvalidMaxLoaded(String),
    #[error(
        "group '{0}' sets idle_unload_trigger_min but not every member has jit_enabled = true"
    )]
    IdleUnloadRequiresJit(String),
}

/// A single managed model, as declared in `hub.toml`.
///
/// Two specs are *process-compatible* ([`ModelSpec::process_compatible`])
/// iff every field below other than `name` is equal; config reload reuses a
/// running child only when its spec is still process-compatible with the
/// reloaded one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub model_path: String,
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub context_length: Option<u32>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout: u32,
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default)]
    pub quantize: Option<String>,
    #[serde(default)]
    pub disable_auto_resize: bool,
    #[serde(default)]
    pub lora_paths: Vec<String>,
    #[serde(default)]
    pub lora_scales: Vec<String>,
    #[serde(default)]
    pub enable_auto_tool_choice: bool,
    #[serde(default)]
    pub tool_call_parser: Option<String>,
    #[serde(default)]
    pub reasoning_parser: Option<String>,
    #[serde(default)]
    pub message_converter: Option<String>,
    #[serde(default)]
    pub trust_remote_code: bool,
    #[serde(default)]
    pub chat_template_file: Option<String>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub no_log_file: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub jit_enabled: bool,
}

impl ModelSpec {
    /// True iff `self` and `other` would launch an identical child process.
    /// `name` is excluded: it is the table key, not a launch parameter.
    pub fn process_compatible(&self, other: &ModelSpec) -> bool {
        self.model_path == other.model_path
            && self.model_type == other.model_type
            && self.host == other.host
            && self.port == other.port
            && self.context_length == other.context_length
            && self.max_concurrency == other.max_concurrency
            && self.queue_timeout == other.queue_timeout
            && self.queue_size == other.queue_size
            && self.log_level == other.log_level
            && self.config_name == other.config_name
            && self.quantize == other.quantize
            && self.disable_auto_resize == other.disable_auto_resize
            && self.lora_paths == other.lora_paths
            && self.lora_scales == other.lora_scales
            && self.enable_auto_tool_choice == other.enable_auto_tool_choice
            && self.tool_call_parser == other.tool_call_parser
            && self.reasoning_parser == other.reasoning_parser
            && self.message_converter == other.message_converter
            && self.trust_remote_code == other.trust_remote_code
            && self.chat_template_file == other.chat_template_file
            && self.log_file == other.log_file
            && self.no_log_file == other.no_log_file
            && self.debug == other.debug
            && self.group == other.group
            && self.jit_enabled == other.jit_enabled
    }
}

fn default_model_type() -> String {
    "mlx".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_queue_timeout() -> u32 {
    300
}

fn default_queue_size() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A named bucket of models sharing a capacity cap and optional idle policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub max_loaded: Option<u32>,
    #[serde(default)]
    pub idle_unload_trigger_min: Option<u32>,
}

/// Immutable, validated hub configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    pub model_starting_port: u16,
    pub enable_status_page: bool,
    pub log_level: String,
    pub log_path: PathBuf,
    pub models: Vec<ModelSpec>,
    pub groups: Vec<GroupSpec>,
}

impl HubConfig {
    pub fn group(&self, name: &str) -> Option<&GroupSpec> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Raw, unvalidated TOML shape. Mirrors `HubConfig` but with serde defaults
/// applied before cross-field validation runs.
#[derive(Debug, Deserialize)]
struct RawHubConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_hub_port")]
    port: u16,
    #[serde(default = "default_model_starting_port")]
    model_starting_port: u16,
    #[serde(default = "default_true")]
    enable_status_page: bool,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_log_path")]
    log_path: PathBuf,
    #[serde(default)]
    models: Vec<ModelSpec>,
    #[serde(default)]
    groups: Vec<GroupSpec>,
}

fn default_hub_port() -> u16 {
    8700
}

fn default_model_starting_port() -> u16 {
    DEFAULT_STARTING_PORT
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> PathBuf {
    dirs_home().join("mlx-hub").join("logs")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load and validate `hub.toml` at `path`.
///
/// `persisted_ports` maps model name to the port it was last known to be
/// bound on (typically the current runtime's live table); a model entry
/// without an explicit `port` in the file is assigned its persisted port
/// when one exists, otherwise the next free port starting at
/// `model_starting_port`.
pub fn load_hub_config(
    path: &Path,
    persisted_ports: &HashMap<String, u16>,
) -> Result<HubConfig, HubConfigError> {
    let raw_text = std::fs::read_to_string(path).map_err(|source| HubConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawHubConfig =
        toml::from_str(&raw_text).map_err(|source| HubConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if raw.models.is_empty() {
        return Err(HubConfigError::NoModels);
    }

    let mut seen_groups = HashSet::new();
    for group in &raw.groups {
        if !seen_groups.insert(group.name.clone()) {
            return Err(HubConfigError::DuplicateGroup(group.name.clone()));
        }
        if let Some(max_loaded) = group.max_loaded {
            if max_loaded == 0 {
                return Err(HubConfigError::InvalidMaxLoaded(group.name.clone()));
            }
        }
    }

    let mut seen_names = HashSet::new();
    let mut next_port = raw.model_starting_port;
    let mut models = Vec::with_capacity(raw.models.len());
    for mut model in raw.models {
        if !seen_names.insert(model.name.clone()) {
            return Err(HubConfigError::DuplicateModel(model.name));
        }
        if model.model_path.trim().is_empty() {
            return Err(HubConfigError::MissingModelPath(model.name));
        }
        if let Some(group_name) = &model.group {
            if raw.groups.iter().all(|g| &g.name != group_name) {
                return Err(HubConfigError::UnknownGroup {
                    model: model.name,
                    group: group_name.clone(),
                });
            }
        }

        if model.port == 0 {
            model.port = persisted_ports.get(&model.name).copied().unwrap_or_else(|| {
                let assigned = next_port;
                next_port += 1;
                assigned
            });
        }

        if !model.no_log_file && model.log_file.is_none() {
            let default_log = raw.log_path.join(format!("{}.log", model.name));
            model.log_file = Some(default_log.to_string_lossy().into_owned());
        }

        models.push(model);
    }

    for group in &raw.groups {
        if group.idle_unload_trigger_min.is_some() {
            let all_jit = models
                .iter()
                .filter(|m| m.group.as_deref() == Some(group.name.as_str()))
                .all(|m| m.jit_enabled);
            if !all_jit {
                return Err(HubConfigError::IdleUnloadRequiresJit(group.name.clone()));
            }
        }
    }

    Ok(HubConfig {
        host: raw.host,
        port: raw.port,
        model_starting_port: raw.model_starting_port,
        enable_status_page: raw.enable_status_page,
        log_level: raw.log_level,
        log_path: raw.log_path,
        models,
        groups: raw.groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("hub.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn applies_defaults_and_persisted_ports() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs");
        let contents = format!(
            "host = \"127.0.0.1\"\nport = 18080\nmodel_starting_port = 19000\nlog_path = \"{}\"\n\n\
             [[models]]\nname = \"alpha\"\nmodel_path = \"/models/a\"\nport = 19001\n\n\
             [[models]]\nname = \"beta\"\nmodel_path = \"/models/b\"\njit_enabled = true\ngroup = \"runners\"\n\n\
             [[groups]]\nname = \"runners\"\nmax_loaded = 1\n",
            log_path.display()
        );
        let path = write_config(&dir, &contents);

        let mut persisted = HashMap::new();
        persisted.insert("beta".to_string(), 19005u16);

        let hub = load_hub_config(&path, &persisted).unwrap();
        assert_eq!(hub.host, "127.0.0.1");
        assert_eq!(hub.port, 18080);
        assert_eq!(hub.model_starting_port, 19000);
        assert!(hub.enable_status_page);

        let by_name: HashMap<_, _> = hub.models.iter().map(|m| (m.name.clone(), m)).collect();
        assert_eq!(by_name["alpha"].port, 19001);
        assert!(by_name["alpha"].log_file.is_some());
        assert_eq!(by_name["beta"].port, 19005);
        assert!(by_name["beta"].jit_enabled);
        assert_eq!(by_name["beta"].group.as_deref(), Some("runners"));

        assert_eq!(hub.groups[0].name, "runners");
        assert_eq!(hub.groups[0].max_loaded, Some(1));
    }

    #[test]
    fn idle_unload_group_requires_jit() {
        let dir = tempfile::tempdir().unwrap();
        let contents = "\
            [[models]]\nname = \"alpha\"\nmodel_path = \"/models/a\"\nport = 19501\ngroup = \"slow\"\n\n\
            [[groups]]\nname = \"slow\"\nmax_loaded = 2\nidle_unload_trigger_min = 5\n";
        let path = write_config(&dir, contents);

        let result = load_hub_config(&path, &HashMap::new());
        assert!(matches!(result, Err(HubConfigError::IdleUnloadRequiresJit(_))));
    }

    #[test]
    fn rejects_duplicate_model_names() {
        let dir = tempfile::tempdir().unwrap();
        let contents = "\
            [[models]]\nname = \"alpha\"\nmodel_path = \"/models/a\"\nport = 1\n\n\
            [[models]]\nname = \"alpha\"\nmodel_path = \"/models/b\"\nport = 2\n";
        let path = write_config(&dir, contents);

        let result = load_hub_config(&path, &HashMap::new());
        assert!(matches!(result, Err(HubConfigError::DuplicateModel(ref n)) if n == "alpha"));
    }

    #[test]
    fn rejects_unknown_group_reference() {
        let dir = tempfile::tempdir().unwrap();
        let contents = "[[models]]\nname = \"alpha\"\nmodel_path = \"/models/a\"\ngroup = \"ghost\"\n";
        let path = write_config(&dir, contents);

        let result = load_hub_config(&path, &HashMap::new());
        assert!(matches!(result, Err(HubConfigError::UnknownGroup { .. })));
    }

    #[test]
    fn process_compatible_ignores_name() {
        let dir = tempfile::tempdir().unwrap();
        let contents = "[[models]]\nname = \"alpha\"\nmodel_path = \"/models/a\"\nport = 1\n";
        let path = write_config(&dir, contents);
        let hub = load_hub_config(&path, &HashMap::new()).unwrap();
        let mut renamed = hub.models[0].clone();
        renamed.name = "alpha-renamed".to_string();
        assert!(hub.models[0].process_compatible(&renamed));

        let mut reported = hub.models[0].clone();
        reported.port = 2;
        assert!(!hub.models[0].process_compatible(&reported));
    }
}
