//! Process-wide policy state
//!
//! This module holds the state the Policy Gate shares across concurrent
//! requests: a token bucket and a robots.txt cache entry per host.
//!
//! # Components
//!
//! - `TokenBucket`: per-host request budget refilled over time
//! - `HostState`: everything known about one host
//! - `PolicyStore`: the injectable map from host key to `HostState`

mod host_state;
mod policy_store;

// Re-export main types
pub use host_state::{HostState, TokenBucket};
pub use policy_store::{HostHandle, PolicyStore};
