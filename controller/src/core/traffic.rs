//! Computes `desiredTrafficWeight` and `actualTrafficWeight` for every Stack
//! of a StackSet. Pure and total: it never fails, degrading via the fallback
//! rules below instead of raising `InvariantViolation` — callers check the
//! resulting weight-sum invariant separately (see [`weight_sum_invariant`]).

use std::collections::BTreeMap;

use super::StackSetContainer;

/// Recompute both weight vectors in place. Desired weights are derived first
/// since eligible-and-desired Stacks are the primary recipients of
/// redistributed actual traffic.
pub fn reconcile(container: &mut StackSetContainer) {
    assign_desired_weights(container);
    assign_actual_weights(container);
}

fn assign_desired_weights(container: &mut StackSetContainer) {
    if container.stacks.is_empty() {
        return;
    }

    let declared_sum: f64 = container
        .stackset
        .spec
        .traffic
        .iter()
        .filter(|t| container.stacks.contains_key(&t.stack_name))
        .map(|t| t.weight)
        .sum();

    if declared_sum > 0.0 {
        let mut raw: BTreeMap<String, f64> =
            container.stacks.keys().map(|k| (k.clone(), 0.0)).collect();
        for t in &container.stackset.spec.traffic {
            if let Some(existing) = raw.get_mut(&t.stack_name) {
                *existing = t.weight / declared_sum * 100.0;
            }
        }
        for (name, weight) in normalize_to_target(raw, 100.0) {
            if let Some(stack) = container.stacks.get_mut(&name) {
                stack.desired_traffic_weight = weight;
            }
        }
        return;
    }

    // No declared weight names a known Stack (or the StackSet declares none
    // at all). Fall back to the Stack with the greatest actual traffic, or
    // the newest Stack if that's a tie (e.g. nothing has ever served traffic).
    let fallback = container
        .stacks
        .values()
        .max_by(|a, b| {
            a.actual_traffic_weight
                .partial_cmp(&b.actual_traffic_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.created().cmp(&b.created()))
        })
        .map(|s| s.name().to_string());

    for (name, stack) in container.stacks.iter_mut() {
        stack.desired_traffic_weight = if Some(name.as_str()) == fallback.as_deref() {
            100.0
        } else {
            0.0
        };
    }
}

fn assign_actual_weights(container: &mut StackSetContainer) {
    let total_desired: f64 = container.stacks.values().map(|s| s.desired_traffic_weight).sum();

    let eligible: Vec<String> = container
        .stacks
        .iter()
        .filter(|(_, s)| s.is_eligible())
        .map(|(name, _)| name.clone())
        .collect();

    if eligible.is_empty() {
        let anything_live = container.stacks.values().any(|s| s.actual_traffic_weight > 0.0);
        if !anything_live {
            for stack in container.stacks.values_mut() {
                stack.actual_traffic_weight = 0.0;
            }
        }
        // Otherwise preserve the previous actual vector untouched: don't
        // blackhole a live service on a bad rollout.
        return;
    }

    let eligible_desired: Vec<String> = eligible
        .iter()
        .filter(|name| container.stacks[*name].desired_traffic_weight > 0.0)
        .cloned()
        .collect();

    let mut raw: BTreeMap<String, f64> = container.stacks.keys().map(|k| (k.clone(), 0.0)).collect();

    if !eligible_desired.is_empty() {
        let total_ed: f64 = eligible_desired
            .iter()
            .map(|name| container.stacks[name].desired_traffic_weight)
            .sum();
        let lost_mass = total_desired - total_ed;
        for name in &eligible_desired {
            let desired = container.stacks[name].desired_traffic_weight;
            raw.insert(name.clone(), desired + lost_mass * (desired / total_ed));
        }
    } else {
        let total_actual: f64 = eligible
            .iter()
            .map(|name| container.stacks[name].actual_traffic_weight)
            .sum();
        if total_actual > 0.0 {
            for name in &eligible {
                let actual = container.stacks[name].actual_traffic_weight;
                raw.insert(name.clone(), total_desired * (actual / total_actual));
            }
        } else {
            let share = total_desired / eligible.len() as f64;
            for name in &eligible {
                raw.insert(name.clone(), share);
            }
        }
    }

    for (name, weight) in normalize_to_target(raw, total_desired) {
        if let Some(stack) = container.stacks.get_mut(&name) {
            stack.actual_traffic_weight = weight;
        }
    }
}

/// Round every entry to two decimal places, then push whatever drift the
/// rounding introduced onto the entry with the largest pre-rounding share so
/// the result sums to exactly `target`.
fn normalize_to_target(raw: BTreeMap<String, f64>, target: f64) -> BTreeMap<String, f64> {
    if raw.is_empty() {
        return raw;
    }

    const PRECISION: f64 = 100.0;
    let mut rounded: BTreeMap<String, f64> = raw
        .iter()
        .map(|(k, v)| (k.clone(), (v * PRECISION).round() / PRECISION))
        .collect();

    let drift = target - rounded.values().sum::<f64>();
    if drift.abs() > f64::EPSILON {
        if let Some(largest) = raw
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(k, _)| k.clone())
        {
            if let Some(v) = rounded.get_mut(&largest) {
                *v = ((*v + drift) * PRECISION).round() / PRECISION;
            }
        }
    }
    rounded
}

/// Checks invariant I2: the actual-weight vector sums to 100 (steady state)
/// or 0 (never reconciled / fallback-to-zero).
pub fn weight_sum_invariant(container: &StackSetContainer) -> bool {
    if container.stacks.is_empty() {
        return true;
    }
    let sum = container.total_actual_weight();
    (sum - 100.0).abs() < 0.01 || sum.abs() < 0.01
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use resources::objects::{stack::Stack, stackset::StackSet, Metadata};
    use resources::objects::stackset::{StackSetSpec, StackTemplate, TrafficWeight};

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

    fn mk_stackset(traffic: Vec<(&str, f64)>) -> StackSet {
        StackSet {
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
                traffic: traffic
                    .into_iter()
                    .map(|(name, weight)| TrafficWeight {
                        stack_name: name.to_string(),
                        weight,
                    })
                    .collect(),
                stack_lifecycle: Default::default(),
            },
            status: None,
        }
    }

    fn container_with(
        stackset: StackSet,
        stacks: Vec<(Stack, bool, bool, f64)>, // (stack, resources_updated, has_ready_replica, actual_weight)
    ) -> StackSetContainer {
        let mut built = StackSetContainer::new(stackset, stacks.iter().map(|(s, ..)| s.clone()).collect());
        for (stack, resources_updated, ready, actual) in stacks {
            let sc = built.stacks.get_mut(stack.metadata.name.as_str()).unwrap();
            sc.resources_updated = resources_updated;
            sc.ready_replicas = if ready { 1 } else { 0 };
            sc.actual_traffic_weight = actual;
        }
        built
    }

    #[test]
    fn unknown_stack_names_are_dropped_and_renormalized() {
        let stackset = mk_stackset(vec![("v1", 50.0), ("ghost", 50.0)]);
        let mut container = container_with(
            stackset,
            vec![(mk_stack("v1", 0), true, true, 100.0)],
        );
        reconcile(&mut container);
        assert_eq!(container.stacks["v1"].desired_traffic_weight, 100.0);
    }

    #[test]
    fn zero_declared_sum_falls_back_to_greatest_actual_weight() {
        let stackset = mk_stackset(vec![]);
        let mut container = container_with(
            stackset,
            vec![
                (mk_stack("v1", 0), true, true, 30.0),
                (mk_stack("v2", 1), true, true, 70.0),
            ],
        );
        reconcile(&mut container);
        assert_eq!(container.stacks["v2"].desired_traffic_weight, 100.0);
        assert_eq!(container.stacks["v1"].desired_traffic_weight, 0.0);
    }

    #[test]
    fn zero_declared_sum_falls_back_to_newest_when_no_prior_traffic() {
        let stackset = mk_stackset(vec![]);
        let mut container = container_with(
            stackset,
            vec![
                (mk_stack("v1", 0), true, true, 0.0),
                (mk_stack("v2", 100), true, true, 0.0),
            ],
        );
        reconcile(&mut container);
        assert_eq!(container.stacks["v2"].desired_traffic_weight, 100.0);
    }

    #[test]
    fn ineligible_desired_stack_redistributes_to_eligible_desired_peer() {
        // Both v1 and v2 are desired 50/50, but v2 isn't ready yet.
        let stackset = mk_stackset(vec![("v1", 50.0), ("v2", 50.0)]);
        let mut container = container_with(
            stackset,
            vec![
                (mk_stack("v1", 0), true, true, 50.0),
                (mk_stack("v2", 1), false, false, 0.0),
            ],
        );
        reconcile(&mut container);
        assert_eq!(container.stacks["v1"].actual_traffic_weight, 100.0);
        assert_eq!(container.stacks["v2"].actual_traffic_weight, 0.0);
        assert!(weight_sum_invariant(&container));
    }

    #[test]
    fn prescaling_trigger_keeps_old_stack_at_full_traffic() {
        // A currently serves 100, desired has moved fully to B, but B has no
        // ready replicas yet: A is eligible-but-not-desired, B is
        // desired-but-ineligible, so all mass falls back onto A.
        let stackset = mk_stackset(vec![("b", 100.0)]);
        let mut container = container_with(
            stackset,
            vec![
                (mk_stack("a", 0), true, true, 100.0),
                (mk_stack("b", 1), false, false, 0.0),
            ],
        );
        reconcile(&mut container);
        assert_eq!(container.stacks["a"].actual_traffic_weight, 100.0);
        assert_eq!(container.stacks["b"].actual_traffic_weight, 0.0);
        assert!(weight_sum_invariant(&container));
    }

    #[test]
    fn no_eligible_stacks_with_live_traffic_preserves_previous_vector() {
        let stackset = mk_stackset(vec![("v1", 100.0)]);
        let mut container = container_with(
            stackset,
            vec![(mk_stack("v1", 0), false, false, 100.0)],
        );
        reconcile(&mut container);
        assert_eq!(container.stacks["v1"].actual_traffic_weight, 100.0);
    }

    #[test]
    fn no_eligible_stacks_and_no_prior_traffic_zeroes_everything() {
        let stackset = mk_stackset(vec![("v1", 100.0)]);
        let mut container = container_with(
            stackset,
            vec![(mk_stack("v1", 0), false, false, 0.0)],
        );
        reconcile(&mut container);
        assert_eq!(container.stacks["v1"].actual_traffic_weight, 0.0);
    }

    #[test]
    fn recomputing_with_unchanged_inputs_is_a_fixpoint() {
        let stackset = mk_stackset(vec![("v1", 70.0), ("v2", 30.0)]);
        let mut container = container_with(
            stackset,
            vec![
                (mk_stack("v1", 0), true, true, 70.0),
                (mk_stack("v2", 1), true, true, 30.0),
            ],
        );
        reconcile(&mut container);
        let after_first = (
            container.stacks["v1"].actual_traffic_weight,
            container.stacks["v2"].actual_traffic_weight,
        );
        reconcile(&mut container);
        let after_second = (
            container.stacks["v1"].actual_traffic_weight,
            container.stacks["v2"].actual_traffic_weight,
        );
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn rounding_drift_sums_to_exactly_one_hundred() {
        let stackset = mk_stackset(vec![("v1", 1.0), ("v2", 1.0), ("v3", 1.0)]);
        let mut container = container_with(
            stackset,
            vec![
                (mk_stack("v1", 0), true, true, 0.0),
                (mk_stack("v2", 1), true, true, 0.0),
                (mk_stack("v3", 2), true, true, 0.0),
            ],
        );
        reconcile(&mut container);
        assert!(weight_sum_invariant(&container));
    }
}
