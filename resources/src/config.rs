use serde::{Deserialize, Serialize};

/// Controller-wide configuration, loaded once from a config file (if
/// present) and overridden by `STACKSET_`-prefixed environment variables and
/// CLI flags, following the host project's `ClusterConfig` pattern.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Namespace to reconcile StackSets in. Empty means all namespaces.
    pub namespace: String,
    /// Cluster API server URL used for list/get/put.
    pub api_server_url: String,
    /// Cluster API server URL used for the watch WebSocket.
    pub api_server_watch_url: String,
    /// Default full-resync period, in seconds.
    pub sync_period_seconds: u64,
    /// How long a Stack may stay in `Active` prescaling before it is force
    /// advanced to `Cooldown`.
    pub prescaling_timeout_seconds: i64,
    /// How long the prescaling replica floor is retained after entering
    /// `Cooldown`, before being dropped.
    pub prescaling_cooldown_seconds: i64,
    pub leader_election: bool,
    pub leader_election_namespace: String,
    pub leader_election_lease_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            namespace: String::new(),
            api_server_url: "http://localhost:8080".to_string(),
            api_server_watch_url: "ws://localhost:8080".to_string(),
            sync_period_seconds: 15,
            prescaling_timeout_seconds: 600,
            prescaling_cooldown_seconds: 300,
            leader_election: false,
            leader_election_namespace: "kube-system".to_string(),
            leader_election_lease_name: "stackset-controller".to_string(),
        }
    }
}
