//! End-to-end lifecycle scenarios (mirrors spec §8's E1/E2 literally), run
//! against a tiny Python stand-in sidecar (`tests/fixtures/fake_sidecar.py`)
//! that only understands `--host`/`--port` and answers `/health`.

use std::path::PathBuf;
use std::time::Duration;

use mlxhub_config::{GroupSpec, HubConfig, ModelSpec};
use mlxhub_core::runtime::HubRuntime;
use mlxhub_core::state::Status;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_sidecar.py")
}

fn set_sidecar_bin() {
    std::env::set_var("MLXHUB_SIDECAR_BIN", fixture_path());
}

fn model(name: &str, port: u16, group: Option<&str>, jit_enabled: bool) -> ModelSpec {
    ModelSpec {
        name: name.to_string(),
        model_path: "/dev/null".to_string(),
        model_type: "mlx".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        context_length: None,
        max_concurrency: 1,
        queue_timeout: 300,
        queue_size: 100,
        log_level: "info".to_string(),
        config_name: None,
        quantize: None,
        disable_auto_resize: false,
        lora_paths: vec![],
        lora_scales: vec![],
        enable_auto_tool_choice: false,
        tool_call_parser: None,
        reasoning_parser: None,
        message_converter: None,
        trust_remote_code: false,
        chat_template_file: None,
        log_file: None,
        no_log_file: true,
        debug: false,
        group: group.map(str::to_string),
        jit_enabled,
    }
}

fn config(models: Vec<ModelSpec>, groups: Vec<GroupSpec>, log_path: PathBuf) -> HubConfig {
    HubConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        model_starting_port: 19000,
        enable_status_page: true,
        log_level: "info".to_string(),
        log_path,
        models,
        groups,
    }
}

/// E1: basic start/stop.
#[tokio::test]
async fn e1_basic_start_stop() {
    set_sidecar_bin();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(vec![model("alpha", 19101, None, false)], vec![], tmp.path().to_path_buf());
    let runtime = HubRuntime::new(cfg, tmp.path().join("hub.toml"));

    runtime.start_model("alpha").await.unwrap();
    let (status, pid) = runtime
        .table()
        .with_model("alpha", |s| (s.status, s.pid()))
        .unwrap();
    assert_eq!(status, Status::Running);
    assert!(pid.is_some());

    runtime.stop_model("alpha").await.unwrap();
    let (status, pid) = runtime
        .table()
        .with_model("alpha", |s| (s.status, s.pid()))
        .unwrap();
    assert_eq!(status, Status::Stopped);
    assert!(pid.is_none());
}

/// E2: group eviction — loading a second JIT member past `max_loaded`
/// evicts the oldest running peer.
#[tokio::test]
async fn e2_group_eviction() {
    set_sidecar_bin();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(
        vec![
            model("beta", 19102, Some("runners"), true),
            model("gamma", 19103, Some("runners"), true),
        ],
        vec![GroupSpec { name: "runners".to_string(), max_loaded: Some(1), idle_unload_trigger_min: None }],
        tmp.path().to_path_buf(),
    );
    let runtime = HubRuntime::new(cfg, tmp.path().join("hub.toml"));

    runtime.load_model("beta").await.unwrap();
    assert_eq!(
        runtime.table().with_model("beta", |s| s.status).unwrap(),
        Status::Running
    );

    // Ensure beta's start_timestamp is strictly earlier than gamma's.
    tokio::time::sleep(Duration::from_millis(20)).await;

    runtime.load_model("gamma").await.unwrap();

    assert_eq!(
        runtime.table().with_model("gamma", |s| s.status).unwrap(),
        Status::Running
    );
    let beta_status = runtime.table().with_model("beta", |s| s.status).unwrap();
    assert_eq!(beta_status, Status::Stopped);
}

/// Property 3: `stop_model` is idempotent.
#[tokio::test]
async fn stop_model_is_idempotent() {
    set_sidecar_bin();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(vec![model("alpha", 19104, None, false)], vec![], tmp.path().to_path_buf());
    let runtime = HubRuntime::new(cfg, tmp.path().join("hub.toml"));

    runtime.start_model("alpha").await.unwrap();
    runtime.stop_model("alpha").await.unwrap();
    runtime.stop_model("alpha").await.unwrap();

    let (status, pid) = runtime
        .table()
        .with_model("alpha", |s| (s.status, s.pid()))
        .unwrap();
    assert_eq!(status, Status::Stopped);
    assert!(pid.is_none());
}

/// Property 6: after `request_shutdown`, no model retains a process handle.
#[tokio::test]
async fn request_shutdown_clears_every_handle() {
    set_sidecar_bin();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(
        vec![model("alpha", 19105, None, false), model("beta", 19106, None, false)],
        vec![],
        tmp.path().to_path_buf(),
    );
    let runtime = HubRuntime::new(cfg, tmp.path().join("hub.toml"));

    runtime.start_initial_models().await;
    runtime.request_shutdown().await;

    for name in ["alpha", "beta"] {
        let pid = runtime.table().with_model(name, |s| s.pid()).unwrap();
        assert!(pid.is_none());
    }
}

/// Unknown model names are rejected without touching the table.
#[tokio::test]
async fn unknown_model_is_rejected() {
    set_sidecar_bin();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(vec![model("alpha", 19107, None, false)], vec![], tmp.path().to_path_buf());
    let runtime = HubRuntime::new(cfg, tmp.path().join("hub.toml"));

    let err = runtime.start_model("ghost").await.unwrap_err();
    assert!(err.to_string().contains("ghost"));
}
