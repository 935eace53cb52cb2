//! Assembles a complete `HorizontalPodAutoscaler` for one Stack: translate
//! every declared metric, sort into the canonical order, and apply the
//! prescaling replica floor. The whole emit fails if any single metric fails
//! to translate — there is no such thing as a partially synthesized HPA.

use std::collections::BTreeMap;

use resources::objects::hpa::{HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec};
use resources::objects::object_reference::ObjectReference;
use resources::objects::Metadata;

use super::{translate, TranslatedMetric};
use crate::core::StackContainer;
use crate::errors::{ControllerError, Result};

/// Synthesize the HPA for one Stack. Returns `Ok(None)` when the Stack
/// declares neither a high-level autoscaler nor a raw HPA spec — nothing to
/// emit, and not an error.
pub fn synthesize(container: &StackContainer) -> Result<Option<HorizontalPodAutoscaler>> {
    let stack = &container.stack;
    let name = stack.metadata.name.clone();
    let namespace = stack.metadata.namespace.clone();
    let owner = ObjectReference::new("Stack", name.clone());

    if let Some(raw_spec) = &stack.spec.horizontal_pod_autoscaler {
        let mut metadata = Metadata::new(name, namespace);
        metadata.owner_references = vec![owner];
        return Ok(Some(HorizontalPodAutoscaler {
            metadata,
            spec: raw_spec.clone(),
            status: None,
        }));
    }

    let Some(autoscaler) = stack.spec.autoscaler.as_ref() else {
        return Ok(None);
    };

    let mut indexed: Vec<(usize, TranslatedMetric)> = Vec::with_capacity(autoscaler.metrics.len());
    for (i, metric) in autoscaler.metrics.iter().enumerate() {
        let translated = translate(metric, &name, container.actual_traffic_weight)?;
        indexed.push((i, translated));
    }
    // Canonical order: external < object < pods < resource/container-resource,
    // declaration order preserved as the tie-breaker.
    indexed.sort_by_key(|(declared_at, t)| (t.source.sort_rank(), *declared_at));

    let mut annotations = BTreeMap::new();
    let mut metrics = Vec::with_capacity(indexed.len());
    for (_, translated) in indexed {
        annotations.extend(translated.annotations);
        metrics.push(translated.source);
    }

    let min_replicas = if container.prescaling_active {
        autoscaler.min_replicas.max(container.prescaling_replicas as i32)
    } else {
        autoscaler.min_replicas
    };
    let max_replicas = autoscaler.max_replicas;

    if min_replicas <= 0 || max_replicas <= 0 || min_replicas > max_replicas {
        return Err(ControllerError::InvariantViolation(format!(
            "stack {name} would synthesize an invalid HPA: minReplicas={min_replicas} maxReplicas={max_replicas}"
        )));
    }

    let mut metadata = Metadata::new(name.clone(), namespace);
    metadata.owner_references = vec![owner];
    metadata.annotations = annotations.into_iter().collect();

    Ok(Some(HorizontalPodAutoscaler {
        metadata,
        spec: HorizontalPodAutoscalerSpec {
            scale_target_ref: ObjectReference::new("Deployment", name),
            min_replicas,
            max_replicas,
            metrics,
        },
        status: None,
    }))
}

#[cfg(test)]
mod tests {
    use resources::objects::stack::{
        Autoscaler, AutoscalerMetricType, AutoscalerMetrics, MetricsQueue, Stack, StackSpec,
    };
    use resources::objects::hpa::MetricSource;
    use resources::objects::Metadata;

    use super::*;
    use crate::core::StackSetContainer;

    fn cpu_metric(utilization: i32) -> AutoscalerMetrics {
        AutoscalerMetrics {
            type_: AutoscalerMetricType::Cpu,
            container: String::new(),
            average_utilization: Some(utilization),
            average: None,
            queue: None,
            zmon: None,
            scaling_schedule: None,
            cluster_scaling_schedule: None,
            endpoint: None,
            requests_per_second: None,
        }
    }

    fn ingress_metric(average: i64) -> AutoscalerMetrics {
        AutoscalerMetrics {
            type_: AutoscalerMetricType::Ingress,
            container: String::new(),
            average_utilization: None,
            average: Some(average),
            queue: None,
            zmon: None,
            scaling_schedule: None,
            cluster_scaling_schedule: None,
            endpoint: None,
            requests_per_second: None,
        }
    }

    fn sqs_metric(average: i64) -> AutoscalerMetrics {
        AutoscalerMetrics {
            type_: AutoscalerMetricType::AmazonSqs,
            container: String::new(),
            average_utilization: None,
            average: Some(average),
            queue: Some(MetricsQueue {
                name: "q".to_string(),
                region: "eu-central-1".to_string(),
            }),
            zmon: None,
            scaling_schedule: None,
            cluster_scaling_schedule: None,
            endpoint: None,
            requests_per_second: None,
        }
    }

    fn mk_container(metrics: Vec<AutoscalerMetrics>, min: i32, max: i32) -> StackContainer {
        let stack = Stack {
            metadata: Metadata::new("stackset-v1", "default"),
            spec: StackSpec {
                pod_template: serde_json::Value::Null,
                replicas: None,
                autoscaler: Some(Autoscaler {
                    min_replicas: min,
                    max_replicas: max,
                    metrics,
                }),
                horizontal_pod_autoscaler: None,
            },
            status: None,
        };
        let stackset = resources::objects::stackset::StackSet {
            metadata: Metadata::new("stackset", "default"),
            spec: resources::objects::stackset::StackSetSpec {
                stack_template: resources::objects::stackset::StackTemplate {
                    spec: stack.spec.clone(),
                },
                traffic: vec![],
                stack_lifecycle: Default::default(),
            },
            status: None,
        };
        let mut container = StackSetContainer::new(stackset, vec![stack]);
        container.stacks.remove("stackset-v1").unwrap()
    }

    #[test]
    fn cpu_without_container_synthesizes_resource_metric_with_utilization() {
        let container = mk_container(vec![cpu_metric(80)], 1, 10);
        let hpa = synthesize(&container).unwrap().unwrap();
        assert_eq!(hpa.spec.min_replicas, 1);
        assert_eq!(hpa.spec.max_replicas, 10);
        assert_eq!(hpa.spec.metrics.len(), 1);
        assert!(matches!(hpa.spec.metrics[0], MetricSource::Resource(_)));
    }

    #[test]
    fn ingress_metric_produces_object_metric_named_with_stack() {
        let container = mk_container(vec![ingress_metric(80)], 1, 10);
        let hpa = synthesize(&container).unwrap().unwrap();
        match &hpa.spec.metrics[0] {
            MetricSource::Object(o) => assert_eq!(o.metric_name, "requests-per-second,stackset-v1"),
            other => panic!("expected Object metric, got {other:?}"),
        }
    }

    #[test]
    fn metrics_come_out_in_canonical_sorted_order() {
        // Declared CPU, Ingress, SQS -> expect External(SQS), Object(Ingress), Resource(CPU).
        let container = mk_container(vec![cpu_metric(80), ingress_metric(80), sqs_metric(5)], 1, 10);
        let hpa = synthesize(&container).unwrap().unwrap();
        let ranks: Vec<u8> = hpa.spec.metrics.iter().map(|m| m.sort_rank()).collect();
        assert_eq!(ranks, vec![0, 1, 3]);
    }

    #[test]
    fn prescaling_floor_raises_min_replicas() {
        let mut container = mk_container(vec![cpu_metric(80)], 1, 10);
        container.prescaling_active = true;
        container.prescaling_replicas = 6;
        let hpa = synthesize(&container).unwrap().unwrap();
        assert_eq!(hpa.spec.min_replicas, 6);
    }

    #[test]
    fn single_invalid_metric_fails_the_whole_hpa() {
        let container = mk_container(vec![cpu_metric(80), ingress_metric(80), cpu_metric(0)], 1, 10);
        assert!(synthesize(&container).is_err());
    }

    #[test]
    fn invalid_replica_bounds_is_an_invariant_violation() {
        let container = mk_container(vec![cpu_metric(80)], 10, 1);
        assert!(matches!(
            synthesize(&container),
            Err(ControllerError::InvariantViolation(_))
        ));
    }

    #[test]
    fn stack_with_no_autoscaler_declaration_synthesizes_nothing() {
        let container = mk_container(vec![], 1, 10);
        // mk_container always sets Some(Autoscaler); build one without directly.
        let mut bare = container;
        bare.stack.spec.autoscaler = None;
        bare.stack.spec.horizontal_pod_autoscaler = None;
        assert!(synthesize(&bare).unwrap().is_none());
    }
}
