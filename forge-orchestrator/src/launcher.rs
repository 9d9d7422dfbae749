use forge_common::{Instance, InstanceState, NetworkSegment, RunError};
use forge_providers::{ComputeProvider, LaunchSpec};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{error, info, warn};

/// One failed launch attempt, kept for the run report. Individually these are
/// non-fatal; only the full set failing ends the run.
#[derive(Debug)]
pub struct SegmentFailure {
    pub segment: NetworkSegment,
    pub cause: String,
}

#[derive(Debug)]
pub struct Launch {
    pub instance: Instance,
    pub failures: Vec<SegmentFailure>,
}

/// Tries each candidate network segment once, in uniform-random order,
/// stopping at the first successful launch. Attempts are strictly sequential
/// so a success never leaves a second instance provisioning elsewhere.
pub struct SubnetFailoverLauncher<'a> {
    provider: &'a dyn ComputeProvider,
    spec: LaunchSpec,
    segments: Vec<NetworkSegment>,
    rng: Box<dyn RngCore + Send>,
}

impl<'a> SubnetFailoverLauncher<'a> {
    pub fn new(
        provider: &'a dyn ComputeProvider,
        spec: LaunchSpec,
        segments: Vec<NetworkSegment>,
    ) -> Self {
        Self {
            provider,
            spec,
            segments,
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    /// Shuffle source override for deterministic tests.
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = rng;
        self
    }

    /// Candidates in a fresh random order. Each segment gets an independent
    /// sort key and the list is sorted by key, which is bias-free (a
    /// truncated swap shuffle is not).
    fn shuffled_segments(&mut self) -> Vec<NetworkSegment> {
        let mut keyed: Vec<(f64, NetworkSegment)> = self
            .segments
            .iter()
            .map(|segment| (self.rng.gen::<f64>(), segment.clone()))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        keyed.into_iter().map(|(_, segment)| segment).collect()
    }

    /// Returns the launched instance, or `LaunchExhausted` once every segment
    /// has been tried and failed. Exhaustion is a hard error for the run, not
    /// a log line.
    pub async fn launch(&mut self, user_data: &str) -> Result<Launch, RunError> {
        let ordered = self.shuffled_segments();
        let attempted = ordered.len();
        let mut failures = Vec::new();

        for segment in ordered {
            match self
                .provider
                .launch_instance(&self.spec, &segment, user_data)
                .await
            {
                Ok(id) => {
                    info!("instance {} launched in segment {}", id, segment);
                    return Ok(Launch {
                        instance: Instance {
                            id,
                            segment,
                            state: InstanceState::Requested,
                        },
                        failures,
                    });
                }
                Err(e) => {
                    let cause = format!("{:#}", e);
                    warn!("failed to launch instance in segment {}: {}", segment, cause);
                    failures.push(SegmentFailure { segment, cause });
                }
            }
        }

        error!(
            "exhausted all {} segment(s), permanent failure of instance launch",
            attempted
        );
        Err(RunError::LaunchExhausted { attempted })
    }
}
