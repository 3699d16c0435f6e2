use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub keepalive_path: String,
    pub keepalive_interval_ms: u64,
    pub keepalive_timeout_ms: u64,
    pub task_timeout_ms: u64,
    pub worker_timeout_ms: u64,
    pub cache_purge_threshold: usize,
    pub max_cache_attempts: u32,
    pub progress_every: u64,
    pub retry_cached: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keepalive_path: "/v1/keepalive".to_string(),
            keepalive_interval_ms: 55_000,
            keepalive_timeout_ms: 10_000,
            task_timeout_ms: 60_000,
            worker_timeout_ms: 60_000,
            cache_purge_threshold: 250,
            max_cache_attempts: 3,
            progress_every: 10,
            retry_cached: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Credentials {
    pub number: String,
    pub device_id: u32,
    pub signaling_key: Vec<u8>,
}
