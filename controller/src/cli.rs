use clap::Parser;

/// Command-line overrides for `ControllerConfig`. Anything left unset here
/// falls through to the config file and then to `ControllerConfig::default`.
#[derive(Parser, Debug)]
#[clap(author, version, about = "StackSet controller", long_about = None)]
pub struct Cli {
    /// Namespace to reconcile StackSets in. Empty means all namespaces.
    #[clap(long)]
    pub namespace: Option<String>,

    /// Default full-resync period, in seconds.
    #[clap(long)]
    pub sync_interval: Option<u64>,

    /// Enable leader election so only one replica reconciles at a time.
    #[clap(long)]
    pub leader_election: bool,

    #[clap(long)]
    pub leader_election_namespace: Option<String>,

    #[clap(long)]
    pub leader_election_lease_name: Option<String>,
}

impl Cli {
    /// Apply any flag the user actually passed on top of a loaded config.
    pub fn apply(self, mut config: resources::config::ControllerConfig) -> resources::config::ControllerConfig {
        if let Some(namespace) = self.namespace {
            config.namespace = namespace;
        }
        if let Some(sync_interval) = self.sync_interval {
            config.sync_period_seconds = sync_interval;
        }
        if self.leader_election {
            config.leader_election = true;
        }
        if let Some(namespace) = self.leader_election_namespace {
            config.leader_election_namespace = namespace;
        }
        if let Some(lease_name) = self.leader_election_lease_name {
            config.leader_election_lease_name = lease_name;
        }
        config
    }
}
