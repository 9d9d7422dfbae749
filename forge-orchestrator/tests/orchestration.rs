//! End-to-end flows over the in-memory provider and a scripted registry:
//! launch with subnet failover, boot wait, registration polling, teardown.

use anyhow::Result;
use async_trait::async_trait;
use forge_common::{InstanceState, NetworkSegment, RunError, RunnerIdentity, RunnerStatus};
use forge_orchestrator::config::{Config, GithubConfig, PollConfig, ProviderConfig, RunnerConfig};
use forge_orchestrator::github::RunnerRegistry;
use forge_orchestrator::run::{start_runner, stop_runner};
use forge_providers::mock::MockProvider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Registry double: the runner "registers itself" by coming online after a
/// fixed number of lookups, echoing whatever name was asked for.
struct FakeRegistry {
    online_after: usize,
    lookups: AtomicUsize,
    fail_token: bool,
    removed: Mutex<Vec<i64>>,
}

impl FakeRegistry {
    fn online_after(lookups: usize) -> Self {
        Self {
            online_after: lookups,
            lookups: AtomicUsize::new(0),
            fail_token: false,
            removed: Mutex::new(Vec::new()),
        }
    }

    fn with_failing_token() -> Self {
        Self {
            fail_token: true,
            ..Self::online_after(1)
        }
    }
}

#[async_trait]
impl RunnerRegistry for FakeRegistry {
    async fn find_runner(&self, name: &str) -> Option<RunnerIdentity> {
        let seen = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
        if seen >= self.online_after {
            Some(RunnerIdentity {
                id: 42,
                name: name.to_string(),
                status: RunnerStatus::Online,
            })
        } else {
            None
        }
    }

    async fn create_registration_token(&self) -> Result<String> {
        if self.fail_token {
            anyhow::bail!("registration token rejected (fake)");
        }
        Ok("fake-token".to_string())
    }

    async fn remove_runner(&self, id: i64) -> Result<()> {
        self.removed.lock().unwrap().push(id);
        Ok(())
    }
}

fn test_config(segments: &[&str]) -> Config {
    Config {
        github: GithubConfig {
            token: "ghp_test".to_string(),
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
        },
        provider: ProviderConfig {
            project_id: "proj-1".to_string(),
            secret_key: "key-1".to_string(),
            zone: "fr-par-1".to_string(),
            instance_type: "DEV1-S".to_string(),
            image_id: "img-1".to_string(),
            security_group: None,
            segments: segments.iter().map(|s| NetworkSegment::from(*s)).collect(),
        },
        runner: RunnerConfig {
            label: Some("runner-e2e".to_string()),
            home_dir: None,
            instance_id: None,
        },
        poll: PollConfig::default(),
    }
}

#[tokio::test(start_paused = true)]
async fn start_flow_survives_two_failing_segments() {
    let provider = MockProvider::new();
    provider.fail_segment("pn-a");
    provider.fail_segment("pn-b");
    provider.set_boot_ticks(2);
    let registry = FakeRegistry::online_after(3);
    let config = test_config(&["pn-a", "pn-b", "pn-c"]);

    let outcome = start_runner(&config, &provider, &registry)
        .await
        .expect("start must succeed when one segment works");

    assert_eq!(outcome.label, "runner-e2e");
    assert_eq!(outcome.instance.state, InstanceState::Running);
    assert_eq!(
        provider.segment_of(&outcome.instance.id),
        Some(NetworkSegment::from("pn-c"))
    );
    // Visit order is randomized, so the number of failing segments tried
    // before pn-c varies; every one of them must be recorded, none lost.
    let attempts = provider.attempts().len();
    assert_eq!(outcome.segment_failures.len(), attempts - 1);
    assert!(attempts <= 3);

    // The boot script carries the token and the registration name.
    let user_data = provider.user_data_of(&outcome.instance.id).unwrap();
    assert!(user_data.contains("--token fake-token"));
    assert!(user_data.contains("--name runner-e2e"));
    assert!(user_data.contains("https://github.com/acme/widgets"));
}

#[tokio::test(start_paused = true)]
async fn start_flow_reports_exhaustion_as_an_error() {
    let provider = MockProvider::new();
    provider.fail_segment("pn-a");
    provider.fail_segment("pn-b");
    let registry = FakeRegistry::online_after(1);
    let config = test_config(&["pn-a", "pn-b"]);

    let err = start_runner(&config, &provider, &registry).await.unwrap_err();
    assert!(matches!(err, RunError::LaunchExhausted { attempted: 2 }));
}

#[tokio::test(start_paused = true)]
async fn start_flow_fails_fast_without_a_token() {
    let provider = MockProvider::new();
    let registry = FakeRegistry::with_failing_token();
    let config = test_config(&["pn-a"]);

    let err = start_runner(&config, &provider, &registry).await.unwrap_err();
    assert!(matches!(err, RunError::Credential(_)));
    // No launch may be attempted without a registration credential.
    assert!(provider.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_flow_fails_when_the_instance_never_boots() {
    let provider = MockProvider::new();
    provider.set_boot_ticks(u32::MAX);
    let registry = FakeRegistry::online_after(1);
    let mut config = test_config(&["pn-a"]);
    config.poll.running_timeout = Duration::from_secs(30);

    let err = start_runner(&config, &provider, &registry).await.unwrap_err();
    assert!(matches!(err, RunError::Provider(_)));
    // Registration polling never starts for an instance that is not up.
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn start_flow_surfaces_instance_lookup_errors() {
    let provider = MockProvider::new();
    provider.fail_describes();
    let registry = FakeRegistry::online_after(1);
    let config = test_config(&["pn-a"]);

    let err = start_runner(&config, &provider, &registry).await.unwrap_err();
    assert!(matches!(err, RunError::Provider(_)));
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn start_flow_times_out_when_the_runner_never_registers() {
    let provider = MockProvider::new();
    let registry = FakeRegistry::online_after(usize::MAX);
    let config = test_config(&["pn-a"]);

    let err = start_runner(&config, &provider, &registry).await.unwrap_err();
    assert!(matches!(err, RunError::RegistrationTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn stop_flow_terminates_and_deregisters() {
    let provider = MockProvider::new();
    provider.set_boot_ticks(0);
    let registry = FakeRegistry::online_after(1);

    // Start first so there is a live instance to tear down.
    let mut config = test_config(&["pn-a"]);
    let outcome = start_runner(&config, &provider, &registry).await.unwrap();

    config.runner.instance_id = Some(outcome.instance.id.clone());
    stop_runner(&config, &provider, &registry).await.unwrap();

    assert!(provider.is_terminated(&outcome.instance.id));
    assert_eq!(*registry.removed.lock().unwrap(), vec![42]);
}

#[tokio::test(start_paused = true)]
async fn stop_flow_is_a_noop_for_an_unregistered_runner() {
    let provider = MockProvider::new();
    let registry = FakeRegistry::online_after(usize::MAX);

    let mut config = test_config(&["pn-a"]);
    config.runner.instance_id = None;
    config.runner.label = Some("runner-ghost".to_string());

    stop_runner(&config, &provider, &registry).await.unwrap();
    assert!(registry.removed.lock().unwrap().is_empty());
}
