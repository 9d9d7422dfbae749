use crate::github::RunnerRegistry;
use forge_common::{RunError, RunnerIdentity};
use forge_providers::ComputeProvider;
use tracing::{error, info};

/// Releases the compute instance and the runner registration. The two
/// operations are independent and order-insensitive; both are best-effort
/// with failures surfaced to the caller.
pub struct TeardownCoordinator<'a> {
    provider: &'a dyn ComputeProvider,
    registry: &'a dyn RunnerRegistry,
}

impl<'a> TeardownCoordinator<'a> {
    pub fn new(provider: &'a dyn ComputeProvider, registry: &'a dyn RunnerRegistry) -> Self {
        Self { provider, registry }
    }

    /// Terminates the compute instance. Errors propagate: a failed
    /// termination is partial cleanup that needs operator attention.
    pub async fn terminate_instance(&self, instance_id: &str) -> Result<(), RunError> {
        match self.provider.terminate_instance(instance_id).await {
            Ok(_) => {
                info!("instance {} is terminated", instance_id);
                Ok(())
            }
            Err(e) => {
                error!("instance {} termination error: {:#}", instance_id, e);
                Err(RunError::Provider(e))
            }
        }
    }

    /// De-registers the runner. The registration name is the instance id in
    /// deployments where the agent named itself after the instance, else the
    /// orchestrator-assigned label, so lookup prefers the id and falls back
    /// to the label. A runner that is not found already vanished or never
    /// registered; removal is skipped as a no-op success.
    pub async fn deregister_runner(
        &self,
        instance_id: Option<&str>,
        label: Option<&str>,
    ) -> Result<(), RunError> {
        let runner = self.resolve_runner(instance_id, label).await;

        let Some(runner) = runner else {
            info!(
                "runner '{}' is not registered, removal skipped",
                instance_id.or(label).unwrap_or("<unnamed>")
            );
            return Ok(());
        };

        match self.registry.remove_runner(runner.id).await {
            Ok(()) => {
                info!("runner '{}' is removed", runner.name);
                Ok(())
            }
            Err(e) => {
                error!("runner '{}' removal error: {:#}", runner.name, e);
                Err(RunError::Provider(e))
            }
        }
    }

    async fn resolve_runner(
        &self,
        instance_id: Option<&str>,
        label: Option<&str>,
    ) -> Option<RunnerIdentity> {
        if let Some(id) = instance_id {
            if let Some(runner) = self.registry.find_runner(id).await {
                return Some(runner);
            }
        }
        if let Some(label) = label {
            return self.registry.find_runner(label).await;
        }
        None
    }
}
