//! Thin HTTP client for a running `mlxhubd`, mirroring the routes in
//! spec §6.1 one-to-one.

use anyhow::{bail, Result};
use mlxhub_wire::{DetailResponse, StatusPayload};

pub struct HubClient {
    base_url: String,
    client: reqwest::Client,
}

impl HubClient {
    pub fn new(host: &str, port: u16) -> Self {
        // A daemon bound to a wildcard address is reachable over loopback
        // from the same machine; the CLI always connects there.
        let connect_host = if host == "0.0.0.0" || host == "::" { "127.0.0.1" } else { host };
        Self {
            base_url: format!("http://{connect_host}:{port}"),
            client: reqwest::Client::new(),
        }
    }

    pub async fn status(&self) -> Result<StatusPayload> {
        let response = self.client.get(format!("{}/hub/status", self.base_url)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn reload(&self) -> Result<StatusPayload> {
        let response = self.client.post(format!("{}/hub/reload", self.base_url)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn shutdown(&self) -> Result<DetailResponse> {
        self.post_detail("/hub/shutdown").await
    }

    pub async fn start_model(&self, name: &str) -> Result<DetailResponse> {
        self.post_detail(&format!("/hub/models/{name}/start")).await
    }

    pub async fn stop_model(&self, name: &str) -> Result<DetailResponse> {
        self.post_detail(&format!("/hub/models/{name}/stop")).await
    }

    pub async fn load_model(&self, name: &str) -> Result<DetailResponse> {
        self.post_detail(&format!("/hub/models/{name}/load")).await
    }

    pub async fn unload_model(&self, name: &str) -> Result<DetailResponse> {
        self.post_detail(&format!("/hub/models/{name}/unload")).await
    }

    pub async fn stop_all_models(&self) -> Result<DetailResponse> {
        self.post_detail("/hub/models/stop-all").await
    }

    async fn post_detail(&self, path: &str) -> Result<DetailResponse> {
        let response = self.client.post(format!("{}{path}", self.base_url)).send().await?;
        let status = response.status();
        let body: DetailResponse = response.json().await?;
        if !status.is_success() {
            bail!(body.detail);
        }
        Ok(body)
    }
}
