use crate::github::RunnerRegistry;
use forge_common::RunError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// Backoff between registration checks. Delays grow by a fixed multiplier up
/// to a cap; the schedule is in-memory only and advanced once per
/// unsuccessful tick.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    delay_ms: f64,
    multiplier: f64,
    cap_ms: f64,
}

impl PollSchedule {
    pub fn new(initial: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            delay_ms: initial.as_millis() as f64,
            multiplier,
            cap_ms: cap.as_millis() as f64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms as u64)
    }

    pub fn advance(&mut self) {
        self.delay_ms = (self.delay_ms * self.multiplier).min(self.cap_ms);
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(Duration::from_millis(4000), 1.5, Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Checking,
    Ready,
    TimedOut,
}

/// Single-timeline polling state machine: Waiting -> Checking -> Ready, or
/// back to Waiting with a longer delay, or TimedOut once the absolute
/// deadline passes. Exactly one registry lookup per tick.
pub struct RegistrationPoller<'a> {
    registry: &'a dyn RunnerRegistry,
    schedule: PollSchedule,
    timeout: Duration,
    state: PollState,
}

impl<'a> RegistrationPoller<'a> {
    pub fn new(registry: &'a dyn RunnerRegistry, schedule: PollSchedule, timeout: Duration) -> Self {
        Self {
            registry,
            schedule,
            timeout,
            state: PollState::Waiting,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Resolves once the runner named `name` reports online, or with
    /// `RegistrationTimeout` when the deadline passes first. A runner that is
    /// registered but offline counts the same as one that is not registered
    /// at all; both are "not ready yet".
    pub async fn wait_until_online(&mut self, name: &str) -> Result<(), RunError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        info!(
            "waiting up to {}s for runner '{}' to register",
            self.timeout.as_secs(),
            name
        );

        loop {
            self.state = PollState::Waiting;
            tokio::time::sleep(self.schedule.delay()).await;

            self.state = PollState::Checking;
            if let Some(runner) = self.registry.find_runner(name).await {
                if runner.status.is_online() {
                    info!("runner '{}' is registered and ready to use", runner.name);
                    self.state = PollState::Ready;
                    return Ok(());
                }
            }

            // The deadline is re-checked before committing to another wait so
            // a stuck runner fails the run at the bound, not one backoff
            // interval later.
            if Instant::now() >= deadline {
                error!("runner '{}' registration timed out", name);
                self.state = PollState::TimedOut;
                // The last sleep can overshoot the bound; report the time
                // actually spent, not the configured timeout.
                return Err(RunError::RegistrationTimeout {
                    name: name.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            self.schedule.advance();
        }
    }
}
