//! The two orchestration flows behind the CLI modes. All collaborators come
//! in as trait objects so the flows run unchanged against the real Scaleway
//! and GitHub clients or the test doubles.

use crate::bootstrap;
use crate::config::Config;
use crate::github::RunnerRegistry;
use crate::launcher::{SegmentFailure, SubnetFailoverLauncher};
use crate::poller::{PollSchedule, RegistrationPoller};
use crate::teardown::TeardownCoordinator;
use forge_common::{Instance, InstanceState, RunError};
use forge_providers::{ComputeProvider, LaunchSpec};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub struct StartOutcome {
    pub label: String,
    pub instance: Instance,
    pub segment_failures: Vec<SegmentFailure>,
}

/// Issues a registration token, launches the instance with subnet failover,
/// waits for it to boot, then polls until its runner registers online.
pub async fn start_runner(
    config: &Config,
    provider: &dyn ComputeProvider,
    registry: &dyn RunnerRegistry,
) -> Result<StartOutcome, RunError> {
    let label = config
        .runner
        .label
        .clone()
        .unwrap_or_else(|| format!("runner-{}", Uuid::new_v4().simple()));

    let token = registry
        .create_registration_token()
        .await
        .map_err(RunError::Credential)?;

    let user_data = bootstrap::build_user_data(
        &config.github.owner,
        &config.github.repo,
        &token,
        &label,
        config.runner.home_dir.as_deref(),
    );

    let spec = LaunchSpec {
        name: label.clone(),
        instance_type: config.provider.instance_type.clone(),
        image_id: config.provider.image_id.clone(),
        security_group: config.provider.security_group.clone(),
        tags: vec!["forge-runner".to_string()],
    };
    let mut launcher =
        SubnetFailoverLauncher::new(provider, spec, config.provider.segments.clone());
    let launch = launcher.launch(&user_data).await?;
    let mut instance = launch.instance;

    wait_until_running(provider, &instance.id, config.poll.running_timeout).await?;
    instance.state = InstanceState::Running;

    let schedule = PollSchedule::new(
        config.poll.initial_delay,
        config.poll.backoff_multiplier,
        config.poll.max_delay,
    );
    let mut poller =
        RegistrationPoller::new(registry, schedule, config.poll.registration_timeout);
    poller.wait_until_online(&label).await?;

    Ok(StartOutcome {
        label,
        instance,
        segment_failures: launch.failures,
    })
}

/// Terminates the instance (when an id is configured) and de-registers the
/// runner. Both operations run regardless of the other's outcome; the first
/// failure is reported after both had their chance.
pub async fn stop_runner(
    config: &Config,
    provider: &dyn ComputeProvider,
    registry: &dyn RunnerRegistry,
) -> Result<(), RunError> {
    let teardown = TeardownCoordinator::new(provider, registry);
    let instance_id = config.runner.instance_id.as_deref();
    let label = config.runner.label.as_deref();

    let terminated = match instance_id {
        Some(id) => teardown.terminate_instance(id).await,
        None => Ok(()),
    };
    let deregistered = teardown.deregister_runner(instance_id, label).await;

    terminated?;
    deregistered
}

/// Bounded wait for the provider to report the instance running. The boot
/// process cannot register the runner before that, so polling registration
/// earlier would only burn the backoff budget.
async fn wait_until_running(
    provider: &dyn ComputeProvider,
    instance_id: &str,
    timeout: Duration,
) -> Result<(), RunError> {
    let deadline = Instant::now() + timeout;
    loop {
        match provider.describe_instance(instance_id).await {
            Ok(Some(details)) if details.state.eq_ignore_ascii_case("running") => {
                info!("instance {} is up and running", instance_id);
                return Ok(());
            }
            // Not visible yet or still booting; keep waiting.
            Ok(_) => {}
            Err(e) => return Err(RunError::Provider(e)),
        }
        if Instant::now() >= deadline {
            return Err(RunError::Provider(anyhow::anyhow!(
                "instance {} did not reach running state within {}s",
                instance_id,
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
