use anyhow::{Context, Result};
use forge_common::NetworkSegment;
use std::env;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub project_id: String,
    pub secret_key: String,
    pub zone: String,
    pub instance_type: String,
    pub image_id: String,
    pub security_group: Option<String>,
    pub segments: Vec<NetworkSegment>,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Registration name assigned before launch; generated when absent.
    pub label: Option<String>,
    /// Directory with a pre-installed actions-runner in the image. When
    /// unset, the boot script downloads the runner release instead.
    pub home_dir: Option<String>,
    /// Instance to tear down (stop mode only).
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub registration_timeout: Duration,
    pub running_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(4),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(60),
            registration_timeout: Duration::from_secs(15 * 60),
            running_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Explicit configuration for one orchestration run. Built once in main and
/// handed to each component; nothing reads the environment after this.
#[derive(Debug, Clone)]
pub struct Config {
    pub github: GithubConfig,
    pub provider: ProviderConfig,
    pub runner: RunnerConfig,
    pub poll: PollConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github = GithubConfig {
            token: secret_var("GITHUB_TOKEN")?,
            owner: env_var("GITHUB_OWNER")?,
            repo: env_var("GITHUB_REPO")?,
        };

        let provider = ProviderConfig {
            project_id: env_var("SCW_PROJECT_ID")?,
            secret_key: secret_var("SCW_SECRET_KEY")?,
            zone: env_opt("SCW_ZONE").unwrap_or_else(|| "fr-par-1".to_string()),
            instance_type: env_opt("INSTANCE_TYPE").unwrap_or_default(),
            image_id: env_opt("IMAGE_ID").unwrap_or_default(),
            security_group: env_opt("SECURITY_GROUP_ID"),
            segments: parse_segments(&env_opt("PRIVATE_NETWORK_IDS").unwrap_or_default()),
        };

        let runner = RunnerConfig {
            label: env_opt("RUNNER_LABEL"),
            home_dir: env_opt("RUNNER_HOME_DIR"),
            instance_id: env_opt("INSTANCE_ID"),
        };

        let defaults = PollConfig::default();
        let poll = PollConfig {
            initial_delay: env_duration_secs("POLL_INITIAL_DELAY_SECS", defaults.initial_delay),
            backoff_multiplier: defaults.backoff_multiplier,
            max_delay: env_duration_secs("POLL_MAX_DELAY_SECS", defaults.max_delay),
            registration_timeout: env_duration_secs(
                "REGISTRATION_TIMEOUT_SECS",
                defaults.registration_timeout,
            ),
            running_timeout: env_duration_secs("RUNNING_TIMEOUT_SECS", defaults.running_timeout),
        };

        Ok(Self {
            github,
            provider,
            runner,
            poll,
        })
    }

    pub fn validate_start(&self) -> Result<()> {
        if self.provider.instance_type.is_empty() {
            anyhow::bail!("INSTANCE_TYPE must be set for start");
        }
        if self.provider.image_id.is_empty() {
            anyhow::bail!("IMAGE_ID must be set for start");
        }
        if self.provider.segments.is_empty() {
            anyhow::bail!("PRIVATE_NETWORK_IDS must list at least one network for start");
        }
        Ok(())
    }

    pub fn validate_stop(&self) -> Result<()> {
        if self.runner.instance_id.is_none() && self.runner.label.is_none() {
            anyhow::bail!("INSTANCE_ID or RUNNER_LABEL must be set for stop");
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} must be set", name))
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Prefer *_FILE for secrets (Docker/K8s friendly), fallback to the env var.
fn secret_var(name: &str) -> Result<String> {
    if let Some(path) = env_opt(&format!("{}_FILE", name)) {
        let value = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {} from {}", name, path))?;
        return Ok(value.trim().to_string());
    }
    env_var(name).map(|s| s.trim().to_string())
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    env_opt(name)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

pub fn parse_segments(raw: &str) -> Vec<NetworkSegment> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(NetworkSegment::from)
        .collect()
}
