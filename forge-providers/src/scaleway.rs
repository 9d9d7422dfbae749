use crate::{ComputeProvider, InstanceDetails, LaunchSpec};
use anyhow::Result;
use async_trait::async_trait;
use forge_common::NetworkSegment;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

const API_BASE: &str = "https://api.scaleway.com/instance/v1";

pub struct ScalewayProvider {
    client: Client,
    project_id: String,
    secret_key: String,
    zone: String,
}

impl ScalewayProvider {
    pub fn new(project_id: String, secret_key: String, zone: String) -> Self {
        // Default reqwest client has no overall timeout. If the API stalls,
        // a run can hang forever; the launcher treats a client timeout as a
        // per-segment failure.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap();
        Self {
            client,
            project_id: project_id.trim().to_string(),
            secret_key: secret_key.trim().to_string(),
            zone: zone.trim().to_string(),
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "X-Auth-Token",
            reqwest::header::HeaderValue::from_str(&self.secret_key).unwrap(),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    fn server_url(&self, server_id: &str) -> String {
        format!("{}/zones/{}/servers/{}", API_BASE, self.zone, server_id)
    }

    async fn create_server(&self, spec: &LaunchSpec) -> Result<String> {
        let url = format!("{}/zones/{}/servers", API_BASE, self.zone);
        let mut body = json!({
            "name": spec.name,
            "commercial_type": spec.instance_type,
            "image": spec.image_id,
            "project": self.project_id,
            "tags": spec.tags,
            "dynamic_ip_required": true,
        });
        if let Some(sg) = &spec.security_group {
            body["security_group"] = json!(sg);
        }

        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Scaleway create_server failed: status={} body={}",
                status.as_u16(),
                text
            ));
        }

        let json_resp: serde_json::Value = resp.json().await?;
        let server_id = json_resp["server"]["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("No server id in create response"))?
            .to_string();
        Ok(server_id)
    }

    async fn set_cloud_init(&self, server_id: &str, user_data: &str) -> Result<()> {
        let url = format!("{}/user_data/cloud-init", self.server_url(server_id));
        let resp = self
            .client
            .put(&url)
            .header("X-Auth-Token", &self.secret_key)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(user_data.to_string())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Scaleway set_cloud_init failed for {}: status={} body={}",
                server_id,
                status.as_u16(),
                text
            ));
        }
        Ok(())
    }

    async fn attach_private_nic(&self, server_id: &str, segment: &NetworkSegment) -> Result<()> {
        let url = format!("{}/private_nics", self.server_url(server_id));
        let body = json!({ "private_network_id": segment.as_str() });
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Scaleway attach_private_nic failed for {} on network {}: status={} body={}",
                server_id,
                segment,
                status.as_u16(),
                text
            ));
        }
        Ok(())
    }

    async fn server_action(&self, server_id: &str, action: &str) -> Result<()> {
        let url = format!("{}/action", self.server_url(server_id));
        let body = json!({ "action": action });
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Scaleway {} failed for {}: status={} body={}",
                action,
                server_id,
                status.as_u16(),
                text
            ));
        }
        Ok(())
    }

    async fn server_state(&self, server_id: &str) -> Result<Option<String>> {
        match self.describe_instance(server_id).await? {
            Some(details) => Ok(Some(details.state)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ComputeProvider for ScalewayProvider {
    async fn launch_instance(
        &self,
        spec: &LaunchSpec,
        segment: &NetworkSegment,
        user_data: &str,
    ) -> Result<String> {
        let server_id = self.create_server(spec).await?;
        // Boot script must be in place before poweron; the agent registers
        // itself on first boot.
        self.set_cloud_init(&server_id, user_data).await?;
        self.attach_private_nic(&server_id, segment).await?;
        self.server_action(&server_id, "poweron").await?;
        info!(
            "Scaleway server {} created in zone {} (network {})",
            server_id, self.zone, segment
        );
        Ok(server_id)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<InstanceDetails>> {
        let url = self.server_url(instance_id);
        let resp = self.client.get(&url).headers(self.headers()).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Scaleway describe failed for {}: status={} body={}",
                instance_id,
                status.as_u16(),
                text
            ));
        }
        let json_resp: serde_json::Value = resp.json().await?;
        let state = json_resp["server"]["state"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        let private_ip = json_resp["server"]["private_ip"]
            .as_str()
            .map(|s| s.to_string());
        Ok(Some(InstanceDetails {
            id: instance_id.to_string(),
            state,
            private_ip,
        }))
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<bool> {
        // Scaleway requires instances to be powered off before deletion.
        match self.server_state(instance_id).await? {
            None => return Ok(false),
            Some(state) if state.eq_ignore_ascii_case("stopped") => {}
            Some(_) => {
                if let Err(e) = self.server_action(instance_id, "poweroff").await {
                    warn!("poweroff before delete failed for {}: {:#}", instance_id, e);
                }
                // Wait for the poweroff to land; deletion of a running server
                // is rejected with resource_still_in_use.
                for _ in 0..30 {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    match self.server_state(instance_id).await? {
                        Some(state) if state.eq_ignore_ascii_case("stopped") => break,
                        Some(_) => {}
                        None => return Ok(true),
                    }
                }
            }
        }

        let url = self.server_url(instance_id);
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(true);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "Scaleway terminate failed for {}: status={} body={}",
            instance_id,
            status.as_u16(),
            text
        ))
    }
}
