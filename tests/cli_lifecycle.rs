//! Workspace-level end-to-end specs: drives the built `mlxhubd` and
//! `mlxhub` binaries against each other exactly as an operator would,
//! using the same fake sidecar fixture `mlxhub-core`'s own lifecycle tests
//! use.

use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use assert_cmd::cargo::CommandCargoExt;

const HUB_PORT: u16 = 19500;
const MODEL_PORT: u16 = 19501;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_sidecar.py")
}

fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn wait_for_port_closed(port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if TcpStream::connect(("127.0.0.1", port)).is_err() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

struct DaemonGuard(Child);

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_daemon(config_path: &std::path::Path) -> DaemonGuard {
    let child = Command::cargo_bin("mlxhubd")
        .expect("mlxhubd binary built")
        .arg("--config")
        .arg(config_path)
        .env("MLXHUB_SIDECAR_BIN", fixture_path())
        .spawn()
        .expect("spawn mlxhubd");
    DaemonGuard(child)
}

fn mlxhub() -> Command {
    let mut cmd = Command::cargo_bin("mlxhub").expect("mlxhub binary built");
    cmd.arg("--host").arg("127.0.0.1").arg("--port").arg(HUB_PORT.to_string());
    cmd
}

#[test]
fn start_status_stop_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let hub_toml = format!(
        "host = \"127.0.0.1\"\nport = {HUB_PORT}\nlog_path = \"{}\"\n\n\
         [[models]]\nname = \"alpha\"\nmodel_path = \"/dev/null\"\nport = {MODEL_PORT}\nno_log_file = true\n",
        tmp.path().join("logs").display(),
    );
    let config_path = tmp.path().join("hub.toml");
    std::fs::write(&config_path, hub_toml).unwrap();

    let _daemon = spawn_daemon(&config_path);
    assert!(wait_for_port(HUB_PORT, Duration::from_secs(10)), "daemon should come up");

    let status = mlxhub().arg("status").output().unwrap();
    assert!(status.status.success());
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("alpha"));

    let start = mlxhub().arg("start-model").arg("alpha").output().unwrap();
    assert!(start.status.success());

    // Give the sidecar a moment to answer /health.
    std::thread::sleep(Duration::from_millis(500));

    let status_after_start = mlxhub().arg("status").output().unwrap();
    let stdout = String::from_utf8_lossy(&status_after_start.stdout);
    assert!(stdout.contains("running"), "expected a running model in: {stdout}");

    let shutdown = mlxhub().arg("shutdown").output().unwrap();
    assert!(shutdown.status.success());

    assert!(wait_for_port_closed(HUB_PORT, Duration::from_secs(10)), "daemon should stop listening");
}
