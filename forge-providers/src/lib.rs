use anyhow::Result;
use async_trait::async_trait;
use forge_common::NetworkSegment;

/// Fixed instance specification for one orchestration run. Everything except
/// the network segment is decided up front; the launcher varies only the
/// segment between attempts.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub name: String,
    pub instance_type: String,
    pub image_id: String,
    pub security_group: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InstanceDetails {
    pub id: String,
    pub state: String,
    pub private_ip: Option<String>,
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Create a server attached to `segment`, hand it `user_data` as its
    /// boot-time script, and power it on. Returns the provider instance id.
    ///
    /// Not idempotent: a launch request that times out client-side may still
    /// have created an instance. Callers get an error in that case and no
    /// reconciliation is attempted.
    async fn launch_instance(
        &self,
        spec: &LaunchSpec,
        segment: &NetworkSegment,
        user_data: &str,
    ) -> Result<String>;

    /// `None` when the provider no longer knows the id.
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<InstanceDetails>>;

    async fn terminate_instance(&self, instance_id: &str) -> Result<bool>;
}

pub mod scaleway;

#[cfg(feature = "mock")]
pub mod mock;
