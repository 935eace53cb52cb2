//! Pure in-memory aggregate assembled fresh from cluster-API state at the
//! start of every reconcile, and torn down when the reconcile returns. It
//! carries no methods beyond assembly; the Traffic Reconciler and Lifecycle
//! Manager operate on it, and the controller writes the result back out.

pub mod lifecycle;
pub mod traffic;

use chrono::NaiveDateTime;
use resources::objects::stack::Stack;
use resources::objects::stackset::StackSet;

/// In-memory wrapper around one Stack, carrying the fields the Traffic
/// Reconciler and Lifecycle Manager read and write during a single reconcile.
#[derive(Debug, Clone)]
pub struct StackContainer {
    pub stack: Stack,
    pub stackset_name: String,
    pub desired_traffic_weight: f64,
    pub actual_traffic_weight: f64,
    pub current_replicas: u32,
    pub ready_replicas: u32,
    pub resources_updated: bool,
    pub prescaling_active: bool,
    pub prescaling_replicas: u32,
    /// The `desiredTrafficWeight` that was in effect when this Stack last
    /// entered prescaling `Active`, kept on status purely for observability
    /// (external tooling can show what traffic shift triggered a prescale).
    pub prescaling_desired_traffic_weight: f64,
    pub prescaling_last_traffic_increase: Option<NaiveDateTime>,
    pub no_traffic_since: Option<NaiveDateTime>,
    /// Derived from the Stack's `deletionTimestamp`: once the cluster API
    /// server has accepted a delete request, the next reconcile that
    /// observes it excludes the Stack from new traffic via `is_eligible()`,
    /// without needing a separate in-memory flag.
    pub being_deleted: bool,
    /// Set by the HPA Synthesizer when metric translation fails for this
    /// Stack; surfaced as an `InvalidMetricConfig` condition on the Stack's
    /// status instead of aborting the whole reconcile (§7).
    pub invalid_metric_config: Option<String>,
    /// Set by the Lifecycle Manager when prescaling is force-advanced to
    /// `Cooldown` by timeout rather than by catching up; surfaced as a
    /// `PrescalingTimeout` condition.
    pub prescaling_timed_out: bool,
}

impl StackContainer {
    fn from_stack(stackset_name: String, stack: Stack) -> Self {
        let status = stack.status.clone().unwrap_or_default();
        let being_deleted = stack.metadata.deletion_timestamp.is_some();
        Self {
            desired_traffic_weight: status.desired_traffic_weight,
            actual_traffic_weight: status.actual_traffic_weight,
            current_replicas: status.replicas,
            ready_replicas: status.ready_replicas,
            resources_updated: status.resources_updated,
            prescaling_active: status.prescaling_active,
            prescaling_replicas: status.prescaling_replicas,
            prescaling_desired_traffic_weight: status.prescaling_desired_traffic_weight,
            prescaling_last_traffic_increase: status.prescaling_last_traffic_increase,
            no_traffic_since: status.no_traffic_since,
            being_deleted,
            invalid_metric_config: None,
            prescaling_timed_out: false,
            stackset_name,
            stack,
        }
    }

    pub fn name(&self) -> &str {
        self.stack.metadata.name.as_str()
    }

    pub fn created(&self) -> Option<NaiveDateTime> {
        self.stack.metadata.creation_timestamp
    }

    /// Eligible for actual traffic: resources fully updated, at least one
    /// ready replica, not currently being deleted.
    pub fn is_eligible(&self) -> bool {
        self.resources_updated && self.ready_replicas > 0 && !self.being_deleted
    }

    pub fn max_replicas(&self) -> Option<i32> {
        self.stack
            .spec
            .autoscaler
            .as_ref()
            .map(|a| a.max_replicas)
    }
}

/// Pure aggregate over one StackSet and its child Stacks, rebuilt from
/// scratch on every reconcile to avoid stale-cache hazards.
#[derive(Debug, Clone)]
pub struct StackSetContainer {
    pub stackset: StackSet,
    /// Keyed by Stack name; `BTreeMap` gives deterministic iteration so
    /// tie-breaks on "newest Stack" etc. are reproducible in tests.
    pub stacks: std::collections::BTreeMap<String, StackContainer>,
}

impl StackSetContainer {
    /// Assemble the aggregate from the StackSet and its currently known
    /// child Stacks. Traffic weights and other status fields observed on
    /// each Stack are treated as authoritative until the Traffic Reconciler
    /// and Lifecycle Manager write new values later in the same reconcile.
    pub fn new(stackset: StackSet, stacks: Vec<Stack>) -> Self {
        let stackset_name = stackset.metadata.name.clone();
        let stacks = stacks
            .into_iter()
            .map(|stack| {
                let container = StackContainer::from_stack(stackset_name.clone(), stack);
                (container.name().to_string(), container)
            })
            .collect();
        Self { stackset, stacks }
    }

    pub fn scaledown_ttl_seconds(&self) -> i64 {
        self.stackset.spec.stack_lifecycle.scaledown_ttl_seconds
    }

    pub fn stack_limit(&self) -> u32 {
        self.stackset.spec.stack_lifecycle.limit
    }

    /// Sum of `actualTrafficWeight` across all Stacks, for checking I2.
    pub fn total_actual_weight(&self) -> f64 {
        self.stacks.values().map(|s| s.actual_traffic_weight).sum()
    }

    /// Fold a newly minted Stack into this reconcile's in-memory aggregate,
    /// so the rest of the pipeline (traffic reconciliation, prescaling,
    /// synthesis) sees it in the same pass it was created in rather than
    /// waiting a full reconcile to notice it through the informer.
    pub fn insert_stack(&mut self, stack: Stack) {
        let stackset_name = self.stackset.metadata.name.clone();
        let container = StackContainer::from_stack(stackset_name, stack);
        self.stacks.insert(container.name().to_string(), container);
    }
}
