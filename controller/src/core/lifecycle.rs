//! Tracks the three state machines hung off a Stack's status: prescaling,
//! no-traffic tracking, and deletion eligibility. Decisions are derived from
//! timestamps on every reconcile rather than held in memory, so a controller
//! restart never loses lifecycle state. Also decides when the StackSet's
//! template has drifted far enough from its existing Stacks to mint a new
//! one.

use chrono::{Duration, NaiveDateTime};
use sha2::{Digest, Sha256};

use resources::objects::stack::{Stack, StackSpec};
use resources::objects::stackset::StackSet;
use resources::objects::{Metadata, ObjectReference};

use super::{StackContainer, StackSetContainer};
use crate::errors::ControllerError;

/// Stable content hash of a Stack template's pod spec/autoscaler/replicas,
/// truncated to 10 hex characters — the same `<parent>-<hash>` naming
/// Kubernetes' Deployment controller uses to derive ReplicaSet names from a
/// pod template, just with SHA-256 over the canonical JSON encoding instead
/// of FNV over a Go `%#v` dump.
pub fn template_hash(spec: &StackSpec) -> String {
    let canonical = serde_json::to_vec(spec).unwrap_or_default();
    let digest = Sha256::digest(canonical);
    format!("{digest:x}")[..10].to_string()
}

/// The name a Stack minted from the StackSet's current template would have.
pub fn desired_stack_name(stackset: &StackSet) -> String {
    format!(
        "{}-{}",
        stackset.metadata.name,
        template_hash(&stackset.spec.stack_template.spec)
    )
}

/// `Some(new Stack)` iff the StackSet's current template hash doesn't match
/// any Stack already owned by it — the StackSet's template is the only
/// required field in the resulting Stack's spec; the controller writes it
/// through `resources::client` exactly like any other object it owns.
pub fn stack_to_create(container: &StackSetContainer) -> Option<Stack> {
    let name = desired_stack_name(&container.stackset);
    if container.stacks.contains_key(&name) {
        return None;
    }

    let mut metadata = Metadata::new(name, container.stackset.metadata.namespace.clone());
    metadata.owner_references = vec![ObjectReference::new("StackSet", container.stackset.metadata.name.clone())];
    metadata.labels.insert("stackset", container.stackset.metadata.name.clone());

    Some(Stack {
        metadata,
        spec: container.stackset.spec.stack_template.spec.clone(),
        status: None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrescalingPhase {
    Inactive,
    Active,
    Cooldown,
}

/// Advance prescaling, no-traffic tracking, and compute which Stacks are now
/// safe to delete. `now` is threaded through rather than read from the clock
/// so the whole pass is deterministic and testable. `prescaling_cooldown` is
/// how long the replica floor is retained past the triggering event before
/// it's dropped, giving the Traffic Reconciler one extra reconcile to
/// observe the raised `actualTrafficWeight` before it vanishes.
///
/// Returns one `ControllerError::PrescalingTimeout` per Stack that was
/// force-advanced to `Cooldown` this reconcile, for the caller to log and
/// surface alongside the status write (§7).
pub fn reconcile(
    container: &mut StackSetContainer,
    now: NaiveDateTime,
    prescaling_timeout: Duration,
    prescaling_cooldown: Duration,
) -> Vec<ControllerError> {
    let traffic_serving_replicas = container
        .stacks
        .values()
        .filter(|s| s.actual_traffic_weight > 0.0)
        .map(|s| s.current_replicas)
        .sum::<u32>();

    let names: Vec<String> = container.stacks.keys().cloned().collect();
    let mut timeouts = Vec::new();
    for name in names {
        let stack = container.stacks.get_mut(&name).expect("key from own keys()");
        if let Some(err) = advance_prescaling(stack, now, prescaling_timeout, prescaling_cooldown, traffic_serving_replicas) {
            timeouts.push(err);
        }
        track_no_traffic(stack, now);
    }
    timeouts
}

fn advance_prescaling(
    stack: &mut StackContainer,
    now: NaiveDateTime,
    prescaling_timeout: Duration,
    prescaling_cooldown: Duration,
    traffic_serving_replicas: u32,
) -> Option<ControllerError> {
    let phase = current_phase(stack);

    match phase {
        PrescalingPhase::Inactive => {
            let entering_active = stack.desired_traffic_weight > 0.0 && stack.actual_traffic_weight == 0.0;
            if entering_active {
                let floor = traffic_serving_replicas.min(
                    stack
                        .max_replicas()
                        .map(|m| m.max(0) as u32)
                        .unwrap_or(traffic_serving_replicas),
                );
                stack.prescaling_active = true;
                stack.prescaling_replicas = stack.prescaling_replicas.max(floor);
                stack.prescaling_desired_traffic_weight = stack.desired_traffic_weight;
                stack.prescaling_last_traffic_increase = Some(now);
                stack.prescaling_timed_out = false;
            }
            None
        },
        PrescalingPhase::Active => {
            let ready_enough = stack.ready_replicas >= stack.prescaling_replicas;
            let timed_out = stack
                .prescaling_last_traffic_increase
                .map(|t| now - t >= prescaling_timeout)
                .unwrap_or(false);
            if ready_enough || timed_out {
                // Entering Cooldown: record the transition time so the grace
                // window below is measured from here, not from the original
                // activation.
                stack.prescaling_last_traffic_increase = Some(now);
                stack.prescaling_timed_out = timed_out && !ready_enough;
                if stack.prescaling_timed_out {
                    return Some(ControllerError::PrescalingTimeout(format!(
                        "stack {} did not reach {} ready replicas within its prescaling window, forcing cooldown",
                        stack.name(),
                        stack.prescaling_replicas
                    )));
                }
            }
            None
        },
        PrescalingPhase::Cooldown => {
            if now - stack.prescaling_last_traffic_increase.unwrap_or(now) >= prescaling_cooldown {
                stack.prescaling_active = false;
                stack.prescaling_replicas = 0;
                stack.prescaling_desired_traffic_weight = 0.0;
            }
            None
        },
    }
}

/// The state machine isn't stored directly; it's derived from
/// `prescalingActive` plus whether the Stack has since caught up. Once caught
/// up (or timed out), `advance_prescaling`'s Active arm resets
/// `prescalingLastTrafficIncrease` to mark the Cooldown entry, so later
/// reconciles see `caught_up == true` and read the grace window from there.
fn current_phase(stack: &StackContainer) -> PrescalingPhase {
    if !stack.prescaling_active {
        return PrescalingPhase::Inactive;
    }
    if stack.ready_replicas >= stack.prescaling_replicas {
        PrescalingPhase::Cooldown
    } else {
        PrescalingPhase::Active
    }
}

fn track_no_traffic(stack: &mut StackContainer, now: NaiveDateTime) {
    if stack.actual_traffic_weight > 0.0 {
        stack.no_traffic_since = None;
    } else if stack.no_traffic_since.is_none() {
        stack.no_traffic_since = Some(now);
    }
}

/// Names of Stacks eligible for garbage collection: `noTrafficSince` older
/// than `scaledownTTLSeconds`, restricted to the oldest surplus once the
/// retained-Stack count exceeds `stackLifecycle.limit`. Invariant P3 (no
/// Stack with positive actual traffic is ever deleted) holds structurally
/// since a live Stack always has `no_traffic_since == None`.
pub fn deletable_stacks(container: &StackSetContainer, now: NaiveDateTime) -> Vec<String> {
    let ttl = Duration::seconds(container.scaledown_ttl_seconds());
    let limit = container.stack_limit() as usize;

    let mut candidates: Vec<&StackContainer> = container
        .stacks
        .values()
        .filter(|s| {
            s.no_traffic_since
                .map(|since| now - since >= ttl)
                .unwrap_or(false)
        })
        .collect();

    if container.stacks.len() <= limit {
        return Vec::new();
    }

    candidates.sort_by_key(|s| s.created());
    let surplus = container.stacks.len() - limit;
    candidates
        .into_iter()
        .take(surplus)
        .map(|s| s.name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use resources::objects::{stack::Stack, stackset::StackSet, Metadata};
    use resources::objects::stackset::{StackLifecycle, StackSetSpec, StackTemplate};

    use super::*;

    fn ts(seconds: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp(seconds, 0).unwrap().naive_utc()
    }

    fn mk_stack(name: &str, created_at: i64) -> Stack {
        let mut metadata = Metadata::new(name, "default");
        metadata.creation_timestamp = Some(ts(created_at));
        Stack {
            metadata,
            spec: resources::objects::stack::StackSpec {
                pod_template: serde_json::Value::Null,
                replicas: None,
                autoscaler: None,
                horizontal_pod_autoscaler: None,
            },
            status: None,
        }
    }

    fn mk_container(scaledown_ttl_seconds: i64, limit: u32, stacks: Vec<Stack>) -> StackSetContainer {
        let stackset = StackSet {
            metadata: Metadata::new("web", "default"),
            spec: StackSetSpec {
                stack_template: StackTemplate {
                    spec: resources::objects::stack::StackSpec {
                        pod_template: serde_json::Value::Null,
                        replicas: None,
                        autoscaler: None,
                        horizontal_pod_autoscaler: None,
                    },
                },
                traffic: vec![],
                stack_lifecycle: StackLifecycle {
                    scaledown_ttl_seconds,
                    limit,
                },
            },
            status: None,
        };
        StackSetContainer::new(stackset, stacks)
    }

    #[test]
    fn entering_active_sets_prescaling_floor_from_traffic_serving_replicas() {
        let mut container = mk_container(300, 10, vec![mk_stack("a", 0), mk_stack("b", 1)]);
        container.stacks.get_mut("a").unwrap().actual_traffic_weight = 100.0;
        container.stacks.get_mut("a").unwrap().current_replicas = 6;
        container.stacks.get_mut("b").unwrap().desired_traffic_weight = 100.0;
        container.stacks.get_mut("b").unwrap().actual_traffic_weight = 0.0;

        reconcile(&mut container, ts(1000), Duration::seconds(600), Duration::seconds(60));

        let b = &container.stacks["b"];
        assert!(b.prescaling_active);
        assert_eq!(b.prescaling_replicas, 6);
        assert_eq!(b.prescaling_desired_traffic_weight, 100.0);
    }

    #[test]
    fn prescaling_replicas_never_decrease_within_a_reconcile() {
        let mut container = mk_container(300, 10, vec![mk_stack("a", 0), mk_stack("b", 1)]);
        container.stacks.get_mut("b").unwrap().prescaling_replicas = 8;
        container.stacks.get_mut("b").unwrap().prescaling_active = true;
        container.stacks.get_mut("b").unwrap().desired_traffic_weight = 100.0;
        container.stacks.get_mut("a").unwrap().current_replicas = 3;
        container.stacks.get_mut("a").unwrap().actual_traffic_weight = 100.0;

        reconcile(&mut container, ts(1000), Duration::seconds(600), Duration::seconds(60));
        assert!(container.stacks["b"].prescaling_replicas >= 8);
    }

    #[test]
    fn prescaling_force_advances_to_cooldown_on_timeout_and_flags_it() {
        let mut container = mk_container(300, 10, vec![mk_stack("b", 0)]);
        {
            let b = container.stacks.get_mut("b").unwrap();
            b.prescaling_active = true;
            b.prescaling_replicas = 8;
            b.ready_replicas = 1; // still short of the floor
            b.prescaling_last_traffic_increase = Some(ts(0));
            b.desired_traffic_weight = 100.0;
        }

        let timeouts = reconcile(&mut container, ts(1000), Duration::seconds(600), Duration::seconds(60));

        let b = &container.stacks["b"];
        assert!(b.prescaling_active);
        assert!(b.prescaling_timed_out);
        assert_eq!(timeouts.len(), 1);
        assert!(matches!(timeouts[0], ControllerError::PrescalingTimeout(_)));
    }

    #[test]
    fn prescaling_catching_up_in_time_does_not_flag_a_timeout() {
        let mut container = mk_container(300, 10, vec![mk_stack("b", 0)]);
        {
            let b = container.stacks.get_mut("b").unwrap();
            b.prescaling_active = true;
            b.prescaling_replicas = 8;
            b.ready_replicas = 8;
            b.prescaling_last_traffic_increase = Some(ts(900));
            b.desired_traffic_weight = 100.0;
        }

        reconcile(&mut container, ts(1000), Duration::seconds(600), Duration::seconds(60));

        let b = &container.stacks["b"];
        assert!(!b.prescaling_timed_out);
    }

    #[test]
    fn no_traffic_since_is_set_on_transition_to_zero_and_cleared_on_recovery() {
        let mut container = mk_container(300, 10, vec![mk_stack("a", 0)]);
        container.stacks.get_mut("a").unwrap().actual_traffic_weight = 0.0;
        reconcile(&mut container, ts(1000), Duration::seconds(600), Duration::seconds(60));
        assert_eq!(container.stacks["a"].no_traffic_since, Some(ts(1000)));

        container.stacks.get_mut("a").unwrap().actual_traffic_weight = 100.0;
        reconcile(&mut container, ts(1100), Duration::seconds(600), Duration::seconds(60));
        assert_eq!(container.stacks["a"].no_traffic_since, None);
    }

    #[test]
    fn deletable_stacks_respects_ttl_and_limit() {
        let mut container = mk_container(100, 1, vec![mk_stack("old", 0), mk_stack("new", 500)]);
        container.stacks.get_mut("old").unwrap().no_traffic_since = Some(ts(0));
        container.stacks.get_mut("new").unwrap().no_traffic_since = Some(ts(500));

        let deletable = deletable_stacks(&container, ts(1000));
        assert_eq!(deletable, vec!["old".to_string()]);
    }

    #[test]
    fn a_stack_with_live_traffic_is_never_deletable() {
        let mut container = mk_container(1, 0, vec![mk_stack("a", 0)]);
        container.stacks.get_mut("a").unwrap().actual_traffic_weight = 100.0;
        // `no_traffic_since` stays None as long as traffic is live.
        assert!(deletable_stacks(&container, ts(10_000)).is_empty());
    }

    #[test]
    fn within_limit_nothing_is_deletable_even_past_ttl() {
        let mut container = mk_container(1, 5, vec![mk_stack("a", 0)]);
        container.stacks.get_mut("a").unwrap().no_traffic_since = Some(ts(0));
        assert!(deletable_stacks(&container, ts(10_000)).is_empty());
    }

    #[test]
    fn template_hash_is_stable_across_calls() {
        let spec = resources::objects::stack::StackSpec {
            pod_template: serde_json::json!({"containers": ["app"]}),
            replicas: Some(3),
            autoscaler: None,
            horizontal_pod_autoscaler: None,
        };
        assert_eq!(template_hash(&spec), template_hash(&spec));
    }

    #[test]
    fn template_hash_changes_when_the_pod_template_changes() {
        let a = resources::objects::stack::StackSpec {
            pod_template: serde_json::json!({"image": "v1"}),
            replicas: None,
            autoscaler: None,
            horizontal_pod_autoscaler: None,
        };
        let b = resources::objects::stack::StackSpec {
            pod_template: serde_json::json!({"image": "v2"}),
            replicas: None,
            autoscaler: None,
            horizontal_pod_autoscaler: None,
        };
        assert_ne!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn stack_to_create_mints_a_stack_named_after_the_template_hash() {
        let container = mk_container(300, 10, vec![]);
        let stackset_name = container.stackset.metadata.name.clone();
        let new_stack = stack_to_create(&container).expect("no stack matches the template hash yet");
        assert_eq!(new_stack.metadata.name, desired_stack_name(&container.stackset));
        assert!(new_stack.metadata.name.starts_with(&format!("{stackset_name}-")));
        assert_eq!(
            new_stack.metadata.owner_references[0].name,
            stackset_name
        );
    }

    #[test]
    fn stack_to_create_is_none_once_the_hash_matches_an_existing_stack() {
        let name = desired_stack_name(&mk_container(300, 10, vec![]).stackset);
        let container = mk_container(300, 10, vec![mk_stack(&name, 0)]);
        assert!(stack_to_create(&container).is_none());
    }
}
