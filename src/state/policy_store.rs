use crate::config::PolicyConfig;
use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Shared handle to one host's state
pub type HostHandle = Arc<AsyncMutex<HostState>>;

/// Process-wide per-host policy state
///
/// Created once by the host process and handed to the orchestrator. The map
/// lock is held only while looking up or inserting a host's handle; all
/// policy work then happens under that host's own lock, so requests to
/// different hosts never wait on each other.
#[derive(Debug)]
pub struct PolicyStore {
    hosts: Mutex<HashMap<String, HostHandle>>,
    requests_per_minute: u32,
}

impl PolicyStore {
    /// Creates an empty store using the configured rate limit
    pub fn new(config: &PolicyConfig) -> Self {
        Self::with_rate(config.requests_per_minute)
    }

    /// Creates an empty store allowing `requests_per_minute` per host
    pub fn with_rate(requests_per_minute: u32) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            requests_per_minute,
        }
    }

    /// Returns the handle for `host`, creating its state on first use
    pub fn host(&self, host: &str) -> HostHandle {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(HostState::new(self.requests_per_minute))))
            .clone()
    }

    /// Number of hosts seen since process start
    pub fn host_count(&self) -> usize {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }
}
