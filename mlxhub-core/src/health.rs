//! Health Prober (spec §4.C): polls a managed server's `/health` endpoint
//! until it answers 200, the deadline elapses, or the child exits early.

use std::time::Duration;

use tokio::process::Child;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy,
    TimedOut,
    ProcessExited,
}

/// Poll `http://{host}:{port}/health` every `interval` until it returns a
/// successful status, the child exits (checked with a non-blocking
/// `try_wait`), or `timeout` elapses since the call started.
pub async fn wait_for_health(
    client: &reqwest::Client,
    host: &str,
    port: u16,
    child: &mut Child,
    interval: Duration,
    timeout: Duration,
) -> HealthOutcome {
    let probe_host = if host == "0.0.0.0" || host == "::" {
        "127.0.0.1"
    } else {
        host
    };
    let url = format!("http://{probe_host}:{port}/health");
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait() {
            Ok(Some(_status)) => return HealthOutcome::ProcessExited,
            Ok(None) => {}
            Err(_) => return HealthOutcome::ProcessExited,
        }

        if let Ok(response) = client.get(&url).send().await {
            if response.status().is_success() {
                return HealthOutcome::Healthy;
            }
        }

        if Instant::now() >= deadline {
            return HealthOutcome::TimedOut;
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn serve_one_health_ok(listener: TcpListener) {
        if let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await;
        }
    }

    #[tokio::test]
    async fn reports_healthy_once_server_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_one_health_ok(listener));

        let client = reqwest::Client::new();
        let mut child = tokio::process::Command::new("sleep").arg("5").spawn().unwrap();

        let outcome = wait_for_health(
            &client,
            "127.0.0.1",
            port,
            &mut child,
            Duration::from_millis(20),
            Duration::from_secs(2),
        )
        .await;

        assert_eq!(outcome, HealthOutcome::Healthy);
        let _ = child.kill().await;
    }

    #[tokio::test]
    async fn times_out_when_nothing_listens() {
        let client = reqwest::Client::new();
        let mut child = tokio::process::Command::new("sleep").arg("5").spawn().unwrap();

        let outcome = wait_for_health(
            &client,
            "127.0.0.1",
            1, // reserved port, nothing should be listening
            &mut child,
            Duration::from_millis(10),
            Duration::from_millis(60),
        )
        .await;

        assert_eq!(outcome, HealthOutcome::TimedOut);
        let _ = child.kill().await;
    }

    #[tokio::test]
    async fn detects_early_process_exit() {
        let client = reqwest::Client::new();
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let _ = child.wait().await;

        let outcome = wait_for_health(
            &client,
            "127.0.0.1",
            1,
            &mut child,
            Duration::from_millis(10),
            Duration::from_secs(2),
        )
        .await;

        assert_eq!(outcome, HealthOutcome::ProcessExited);
    }
}
