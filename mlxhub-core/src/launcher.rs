//! Launcher (spec §4.B): builds the child argv, attaches the supervisor log
//! file, and spawns the managed inference server process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use mlxhub_config::ModelSpec;
use tokio::fs::OpenOptions;
use tokio::process::{Child, Command};

/// Flag surface for the managed inference server, in the exact order spec
/// §6.2 requires for bit-exact compatibility with operator tooling that
/// parses recorded command lines.
fn build_argv(spec: &ModelSpec) -> Vec<String> {
    let mut args = vec![
        "--model-path".to_string(),
        spec.model_path.clone(),
        "--model-type".to_string(),
        spec.model_type.clone(),
        "--port".to_string(),
        spec.port.to_string(),
        "--host".to_string(),
        spec.host.clone(),
        "--max-concurrency".to_string(),
        spec.max_concurrency.to_string(),
        "--queue-timeout".to_string(),
        spec.queue_timeout.to_string(),
        "--queue-size".to_string(),
        spec.queue_size.to_string(),
        "--log-level".to_string(),
        spec.log_level.clone(),
    ];

    if let Some(context_length) = spec.context_length {
        args.push("--context-length".to_string());
        args.push(context_length.to_string());
    }
    if let Some(config_name) = &spec.config_name {
        args.push("--config-name".to_string());
        args.push(config_name.clone());
    }
    if let Some(quantize) = &spec.quantize {
        args.push("--quantize".to_string());
        args.push(quantize.clone());
    }
    if spec.disable_auto_resize {
        args.push("--disable-auto-resize".to_string());
    }
    if let Some(log_file) = &spec.log_file {
        args.push("--log-file".to_string());
        args.push(log_file.clone());
    }
    if spec.no_log_file {
        args.push("--no-log-file".to_string());
    }
    if !spec.lora_paths.is_empty() {
        args.push("--lora-paths".to_string());
        args.push(spec.lora_paths.join(","));
    }
    if !spec.lora_scales.is_empty() {
        args.push("--lora-scales".to_string());
        args.push(spec.lora_scales.join(","));
    }
    if spec.enable_auto_tool_choice {
        args.push("--enable-auto-tool-choice".to_string());
    }
    if let Some(tool_call_parser) = &spec.tool_call_parser {
        args.push("--tool-call-parser".to_string());
        args.push(tool_call_parser.clone());
    }
    if let Some(reasoning_parser) = &spec.reasoning_parser {
        args.push("--reasoning-parser".to_string());
        args.push(reasoning_parser.clone());
    }
    if let Some(message_converter) = &spec.message_converter {
        args.push("--message-converter".to_string());
        args.push(message_converter.clone());
    }
    if spec.trust_remote_code {
        args.push("--trust-remote-code".to_string());
    }
    if let Some(chat_template_file) = &spec.chat_template_file {
        args.push("--chat-template-file".to_string());
        args.push(chat_template_file.clone());
    }
    if spec.debug {
        args.push("--debug".to_string());
    }

    args
}

/// Return the supervisor-captured stdout+stderr log path for `name`.
pub fn supervisor_log_path(log_path: &Path, name: &str) -> PathBuf {
    log_path.join(format!("{name}.supervisor.log"))
}

/// Spawn the managed inference server for `spec`.
///
/// The child runs in its own process group/session (so a hard kill of the
/// child does not propagate to the hub), with stdout/stderr appended to the
/// per-model supervisor log, and `PYTHONUNBUFFERED=1` forced in the
/// inherited environment — a bit-exact compatibility item carried from the
/// reference implementation.
pub async fn spawn(
    spec: &ModelSpec,
    binary: &str,
    log_path: &Path,
    name: &str,
) -> std::io::Result<Child> {
    let log_file_path = supervisor_log_path(log_path, name);
    if let Some(parent) = log_file_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)
        .await?;
    let log_file_for_stderr = log_file.try_clone().await?;

    let mut cmd = Command::new(binary);
    cmd.args(build_argv(spec))
        .env("PYTHONUNBUFFERED", "1")
        .stdout(Stdio::from(log_file.into_std().await))
        .stderr(Stdio::from(log_file_for_stderr.into_std().await))
        .kill_on_drop(false);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.spawn()
}
