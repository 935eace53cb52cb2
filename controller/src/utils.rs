//! Thin collaborator calls between the pure core and the cluster API client:
//! gathering a StackSet's child Stacks from the informer store, and writing
//! back the status/HPA updates a reconcile produces.

use chrono::NaiveDateTime;
use resources::client;
use resources::config::ControllerConfig;
use resources::informer::Store;
use resources::objects::hpa::HorizontalPodAutoscaler;
use resources::objects::stack::Stack;
use resources::objects::stackset::{StackSetStatus, StackSummary};
use resources::objects::{Condition, ConditionStatus, Object};

use crate::core::{StackContainer, StackSetContainer};
use crate::errors::{ControllerError, Result};

const INVALID_METRIC_CONFIG_CONDITION: &str = "InvalidMetricConfig";
const PRESCALING_TIMEOUT_CONDITION: &str = "PrescalingTimeout";

/// Stacks belonging to a StackSet, identified by namespace plus an owner
/// reference of kind `StackSet` naming it. The informer store holds every
/// Stack the controller watches; this is the only place that narrows it
/// down per reconcile.
pub fn stacks_owned_by(store: &Store<Stack>, namespace: &str, stackset_name: &str) -> Vec<Stack> {
    store
        .iter()
        .filter(|entry| {
            let stack = entry.value();
            stack.metadata.namespace == namespace
                && stack
                    .metadata
                    .owner_references
                    .iter()
                    .any(|owner| owner.kind == "StackSet" && owner.name == stackset_name)
        })
        .map(|entry| entry.value().clone())
        .collect()
}

/// Push the Traffic Reconciler's and Lifecycle Manager's output back onto
/// every Stack's status subresource, including the `InvalidMetricConfig`/
/// `PrescalingTimeout` conditions the HPA Synthesizer and Lifecycle Manager
/// recorded on the container for this reconcile (§7).
pub async fn apply_stack_status(
    config: &ControllerConfig,
    container: &StackSetContainer,
    now: NaiveDateTime,
) -> Result<()> {
    for stack_container in container.stacks.values() {
        let mut stack = stack_container.stack.clone();
        let mut status = stack.status.clone().unwrap_or_default();
        status.desired_traffic_weight = stack_container.desired_traffic_weight;
        status.actual_traffic_weight = stack_container.actual_traffic_weight;
        status.prescaling_active = stack_container.prescaling_active;
        status.prescaling_replicas = stack_container.prescaling_replicas;
        status.prescaling_desired_traffic_weight = stack_container.prescaling_desired_traffic_weight;
        status.prescaling_last_traffic_increase = stack_container.prescaling_last_traffic_increase;
        status.no_traffic_since = stack_container.no_traffic_since;
        status.conditions = build_conditions(&status.conditions, stack_container, now);
        stack.status = Some(status);
        client::put(config, &stack).await.map_err(ControllerError::TransientApiError)?;
    }
    Ok(())
}

/// Replace the `InvalidMetricConfig`/`PrescalingTimeout` entries of
/// `existing` with this reconcile's observations, leaving any other
/// condition types (set by out-of-scope collaborators) untouched.
fn build_conditions(
    existing: &[Condition],
    stack_container: &StackContainer,
    now: NaiveDateTime,
) -> Vec<Condition> {
    let mut conditions: Vec<Condition> = existing
        .iter()
        .filter(|c| c.type_ != INVALID_METRIC_CONFIG_CONDITION && c.type_ != PRESCALING_TIMEOUT_CONDITION)
        .cloned()
        .collect();

    conditions.push(Condition {
        type_: INVALID_METRIC_CONFIG_CONDITION.to_string(),
        status: if stack_container.invalid_metric_config.is_some() {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        },
        reason: stack_container.invalid_metric_config.is_some().then(|| "MetricTranslationFailed".to_string()),
        message: stack_container.invalid_metric_config.clone(),
        last_transition_time: now,
    });

    conditions.push(Condition {
        type_: PRESCALING_TIMEOUT_CONDITION.to_string(),
        status: if stack_container.prescaling_timed_out {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        },
        reason: stack_container.prescaling_timed_out.then(|| "PrescalingWindowElapsed".to_string()),
        message: None,
        last_transition_time: now,
    });

    conditions
}

pub async fn apply_hpa(config: &ControllerConfig, hpa: &HorizontalPodAutoscaler) -> Result<()> {
    client::put(config, hpa).await.map_err(ControllerError::TransientApiError)
}

/// Mint a Stack the Lifecycle Manager decided is missing for the StackSet's
/// current template. `put` doubles as create here: the cluster API server
/// this controller talks to is a declarative object store keyed by URI, not
/// a strict create-vs-replace REST resource.
pub async fn create_stack(config: &ControllerConfig, stack: &Stack) -> Result<()> {
    client::put(config, stack).await.map_err(ControllerError::TransientApiError)
}

/// Refresh `status.stacks`, the summary list external tooling reads. Never
/// read back into reconcile decisions, per the StackSet Container contract.
pub async fn apply_stackset_status(config: &ControllerConfig, container: &StackSetContainer) -> Result<()> {
    let mut stackset = container.stackset.clone();
    let observed_stack_version = stackset
        .status
        .as_ref()
        .map(|s| s.observed_stack_version.clone())
        .unwrap_or_default();
    let stacks = container
        .stacks
        .values()
        .map(|s| StackSummary {
            name: s.name().to_string(),
            actual_traffic_weight: s.actual_traffic_weight,
            desired_traffic_weight: s.desired_traffic_weight,
            created: s.created(),
        })
        .collect();
    stackset.status = Some(StackSetStatus {
        observed_stack_version,
        stacks,
    });
    client::put(config, &stackset).await.map_err(ControllerError::TransientApiError)
}

pub async fn delete_stack(config: &ControllerConfig, stack: &Stack) -> Result<()> {
    client::delete(config, &stack.uri()).await.map_err(ControllerError::TransientApiError)
}
