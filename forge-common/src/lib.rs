use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Enums ---

/// Lifecycle of the single instance managed by one orchestration run.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Requested, // Launch call accepted by the provider
    Running,   // Provider reports the instance up
    Terminated,
    LaunchFailed,
}

/// Registration status as reported by the CI coordination service.
/// Only `Online` means the runner accepts jobs; `Offline` is registered but
/// not ready, and anything unrecognized parses to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    Online,
    Offline,
    Unknown,
}

impl RunnerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "online" => RunnerStatus::Online,
            "offline" => RunnerStatus::Offline,
            _ => RunnerStatus::Unknown,
        }
    }

    pub fn is_online(self) -> bool {
        self == RunnerStatus::Online
    }
}

// --- Entities ---

/// One candidate private network for a launch attempt. Segments are
/// independent fault domains: a failure in one says nothing about the others.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct NetworkSegment(pub String);

impl NetworkSegment {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NetworkSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkSegment {
    fn from(value: &str) -> Self {
        NetworkSegment(value.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Instance {
    pub id: String,
    pub segment: NetworkSegment,
    pub state: InstanceState,
}

/// A runner record as the CI service knows it. `name` is the key the
/// orchestrator assigned before launch; `id` is service-assigned and only
/// learned through lookup.
#[derive(Debug, Clone)]
pub struct RunnerIdentity {
    pub id: i64,
    pub name: String,
    pub status: RunnerStatus,
}

// --- Run-level failures ---

/// Terminal outcomes an orchestration run reports to its invoker.
/// Per-attempt failures (one segment, one lookup) are absorbed internally
/// and never appear here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("all {attempted} network segment(s) exhausted, no instance was launched")]
    LaunchExhausted { attempted: usize },

    #[error("runner '{name}' was not registered and online within {waited_secs}s")]
    RegistrationTimeout { name: String, waited_secs: u64 },

    #[error("failed to obtain a registration token")]
    Credential(#[source] anyhow::Error),

    #[error("provider call failed")]
    Provider(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_status_parses_case_insensitively() {
        assert_eq!(RunnerStatus::parse("online"), RunnerStatus::Online);
        assert_eq!(RunnerStatus::parse("Online"), RunnerStatus::Online);
        assert_eq!(RunnerStatus::parse("offline"), RunnerStatus::Offline);
        assert_eq!(RunnerStatus::parse("idle"), RunnerStatus::Unknown);
        assert_eq!(RunnerStatus::parse(""), RunnerStatus::Unknown);
    }

    #[test]
    fn launch_exhausted_names_the_attempt_count() {
        let err = RunError::LaunchExhausted { attempted: 3 };
        assert!(err.to_string().contains("3 network segment(s)"));
    }
}
