//! In-memory provider for tests. Segments can be marked as failing, launch
//! attempts are recorded in order, and a boot delay (in describe calls) can
//! be simulated.

use crate::{ComputeProvider, InstanceDetails, LaunchSpec};
use anyhow::Result;
use async_trait::async_trait;
use forge_common::NetworkSegment;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

struct MockInstance {
    segment: NetworkSegment,
    user_data: String,
    // Number of describe calls left before the state flips to "running".
    boot_ticks_left: u32,
    terminated: bool,
}

#[derive(Default)]
struct MockState {
    failing_segments: HashSet<String>,
    attempts: Vec<NetworkSegment>,
    instances: HashMap<String, MockInstance>,
    boot_ticks: u32,
    describe_fails: bool,
    next_id: u64,
}

#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch attempt in this segment will fail.
    pub fn fail_segment(&self, segment: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_segments.insert(segment.to_string());
    }

    /// Number of describe calls an instance reports "starting" before
    /// reaching "running". Zero (the default) means running immediately.
    pub fn set_boot_ticks(&self, ticks: u32) {
        self.state.lock().unwrap().boot_ticks = ticks;
    }

    /// Every describe call fails with an API error.
    pub fn fail_describes(&self) {
        self.state.lock().unwrap().describe_fails = true;
    }

    /// Every launch attempt so far, in visit order, across all calls.
    pub fn attempts(&self) -> Vec<NetworkSegment> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn is_terminated(&self, instance_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(instance_id)
            .map(|i| i.terminated)
            .unwrap_or(false)
    }

    pub fn user_data_of(&self, instance_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(instance_id)
            .map(|i| i.user_data.clone())
    }

    pub fn segment_of(&self, instance_id: &str) -> Option<NetworkSegment> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(instance_id)
            .map(|i| i.segment.clone())
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    async fn launch_instance(
        &self,
        _spec: &LaunchSpec,
        segment: &NetworkSegment,
        user_data: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(segment.clone());
        if state.failing_segments.contains(segment.as_str()) {
            return Err(anyhow::anyhow!(
                "no capacity in segment {} (mock)",
                segment
            ));
        }
        state.next_id += 1;
        let id = format!("mock-{:04}", state.next_id);
        let boot_ticks = state.boot_ticks;
        state.instances.insert(
            id.clone(),
            MockInstance {
                segment: segment.clone(),
                user_data: user_data.to_string(),
                boot_ticks_left: boot_ticks,
                terminated: false,
            },
        );
        Ok(id)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<InstanceDetails>> {
        let mut state = self.state.lock().unwrap();
        if state.describe_fails {
            return Err(anyhow::anyhow!("describe rejected (mock)"));
        }
        let Some(instance) = state.instances.get_mut(instance_id) else {
            return Ok(None);
        };
        let state_str = if instance.terminated {
            "terminated"
        } else if instance.boot_ticks_left > 0 {
            instance.boot_ticks_left -= 1;
            "starting"
        } else {
            "running"
        };
        Ok(Some(InstanceDetails {
            id: instance_id.to_string(),
            state: state_str.to_string(),
            private_ip: Some("10.0.0.2".to_string()),
        }))
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.instances.get_mut(instance_id) {
            Some(instance) => {
                instance.terminated = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
