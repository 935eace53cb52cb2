//! Maps one declared autoscaler metric entry to the metric source (plus any
//! horizontal-pod-autoscaler annotations) it synthesizes to. Each variant is
//! a small pure function; all of them fail with `InvalidMetricConfig` rather
//! than panicking on a malformed entry, so a single bad metric stops only the
//! Stack that declared it.

pub mod synth;

use std::collections::BTreeMap;

use resources::objects::hpa::{
    ContainerResourceMetricSource, ExternalMetricSource, MetricSource, MetricTarget,
    ObjectMetricSource, PodsMetricSource, ResourceMetricSource, ResourceName,
};
use resources::objects::object_reference::ObjectReference;
use resources::objects::stack::{AutoscalerMetricType, AutoscalerMetrics};

use crate::errors::{ControllerError, Result};

pub const ZMON_CHECK_METRIC_NAME: &str = "zmon-check";
pub const ZMON_CHECK_ID_TAG: &str = "check-id";
pub const ZMON_CHECK_DURATION_TAG: &str = "duration";
pub const ZMON_CHECK_AGGREGATORS_TAG: &str = "aggregators";
pub const ZMON_CHECK_KEY_ANNOTATION: &str = "metric-config.external.zmon-check.zmon/key";
pub const ZMON_CHECK_TAG_ANNOTATION_PREFIX: &str = "metric-config.external.zmon-check.zmon/tag-";
pub const SCALING_SCHEDULE_API_VERSION: &str = "zalando.org/v1";

/// One translated metric: the synthesized source plus whatever annotations
/// must land on the enclosing horizontal-pod-autoscaler for it to work.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedMetric {
    pub source: MetricSource,
    pub annotations: BTreeMap<String, String>,
}

fn invalid(msg: impl Into<String>) -> ControllerError {
    ControllerError::InvalidMetricConfig(msg.into())
}

fn no_annotations() -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Translate one metric entry. `stack_name` backs the Ingress/RouteGroup
/// described-object identity; `actual_traffic_weight` backs the ExternalRPS
/// weight annotation.
pub fn translate(
    metric: &AutoscalerMetrics,
    stack_name: &str,
    actual_traffic_weight: f64,
) -> Result<TranslatedMetric> {
    match metric.type_ {
        AutoscalerMetricType::Cpu => resource_metric(metric, ResourceName::Cpu),
        AutoscalerMetricType::Memory => resource_metric(metric, ResourceName::Memory),
        AutoscalerMetricType::AmazonSqs => sqs_metric(metric),
        AutoscalerMetricType::Zmon => zmon_metric(metric),
        AutoscalerMetricType::ScalingSchedule => schedule_metric(metric, false),
        AutoscalerMetricType::ClusterScalingSchedule => schedule_metric(metric, true),
        AutoscalerMetricType::PodJSON => pod_json_metric(metric),
        AutoscalerMetricType::Ingress => ingress_metric(metric, stack_name),
        AutoscalerMetricType::RouteGroup => routegroup_metric(metric, stack_name),
        AutoscalerMetricType::ExternalRps => external_rps_metric(metric, actual_traffic_weight),
    }
}

fn resource_metric(metric: &AutoscalerMetrics, name: ResourceName) -> Result<TranslatedMetric> {
    let utilization = metric
        .average_utilization
        .ok_or_else(|| invalid("averageUtilization is required for CPU/Memory metrics"))?;
    if utilization <= 0 {
        return Err(invalid("averageUtilization must be positive"));
    }
    let target = MetricTarget::AverageUtilization(utilization);
    let source = if metric.container.is_empty() {
        MetricSource::Resource(ResourceMetricSource { name, target })
    } else {
        MetricSource::ContainerResource(ContainerResourceMetricSource {
            name,
            container: metric.container.clone(),
            target,
        })
    };
    Ok(TranslatedMetric {
        source,
        annotations: no_annotations(),
    })
}

fn sqs_metric(metric: &AutoscalerMetrics) -> Result<TranslatedMetric> {
    let queue = metric
        .queue
        .as_ref()
        .ok_or_else(|| invalid("queue is required for AmazonSQS metrics"))?;
    if queue.name.is_empty() || queue.region.is_empty() {
        return Err(invalid("queue.name and queue.region are required"));
    }
    let average = metric
        .average
        .ok_or_else(|| invalid("average is required for AmazonSQS metrics"))?;

    let mut selector = BTreeMap::new();
    selector.insert("queue-name".to_string(), queue.name.clone());
    selector.insert("queue-region".to_string(), queue.region.clone());

    Ok(TranslatedMetric {
        source: MetricSource::External(ExternalMetricSource {
            metric_name: "sqs-queue-length".to_string(),
            metric_selector: selector,
            target: MetricTarget::AverageValue(average),
        }),
        annotations: no_annotations(),
    })
}

fn zmon_metric(metric: &AutoscalerMetrics) -> Result<TranslatedMetric> {
    let zmon = metric
        .zmon
        .as_ref()
        .ok_or_else(|| invalid("zmon config is required for ZMON metrics"))?;
    let average = metric
        .average
        .ok_or_else(|| invalid("average is required for ZMON metrics"))?;

    let mut selector = BTreeMap::new();
    selector.insert(ZMON_CHECK_ID_TAG.to_string(), zmon.check_id.clone());
    selector.insert(ZMON_CHECK_DURATION_TAG.to_string(), zmon.duration.clone());
    if !zmon.aggregators.is_empty() {
        selector.insert(ZMON_CHECK_AGGREGATORS_TAG.to_string(), zmon.aggregators.join(","));
    }

    let mut annotations = BTreeMap::new();
    annotations.insert(ZMON_CHECK_KEY_ANNOTATION.to_string(), zmon.key.clone());
    for (tag, value) in &zmon.tags {
        annotations.insert(format!("{ZMON_CHECK_TAG_ANNOTATION_PREFIX}{tag}"), value.clone());
    }

    Ok(TranslatedMetric {
        source: MetricSource::External(ExternalMetricSource {
            metric_name: ZMON_CHECK_METRIC_NAME.to_string(),
            metric_selector: selector,
            target: MetricTarget::AverageValue(average),
        }),
        annotations,
    })
}

fn schedule_metric(metric: &AutoscalerMetrics, cluster: bool) -> Result<TranslatedMetric> {
    let average = metric
        .average
        .ok_or_else(|| invalid("average is required for scaling schedule metrics"))?;
    let name = if cluster {
        metric.cluster_scaling_schedule.as_ref().map(|s| s.name.clone())
    } else {
        metric.scaling_schedule.as_ref().map(|s| s.name.clone())
    };
    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("scaling schedule name is required"))?;
    let kind = if cluster {
        "ClusterScalingSchedule"
    } else {
        "ScalingSchedule"
    };

    Ok(TranslatedMetric {
        source: MetricSource::Object(ObjectMetricSource {
            described_object: ObjectReference::new(kind, name.clone())
                .with_api_version(SCALING_SCHEDULE_API_VERSION),
            metric_name: name,
            metric_selector: no_annotations(),
            target: MetricTarget::AverageValue(average),
        }),
        annotations: no_annotations(),
    })
}

fn pod_json_metric(metric: &AutoscalerMetrics) -> Result<TranslatedMetric> {
    let endpoint = metric
        .endpoint
        .as_ref()
        .ok_or_else(|| invalid("endpoint is required for PodJSON metrics"))?;
    let average = metric
        .average
        .ok_or_else(|| invalid("average is required for PodJSON metrics"))?;
    if endpoint.name.is_empty() || endpoint.path.is_empty() || endpoint.port <= 0 || endpoint.key.is_empty() {
        return Err(invalid(
            "endpoint.name, endpoint.path, endpoint.port, and endpoint.key are all required",
        ));
    }

    let mut annotations = BTreeMap::new();
    annotations.insert(
        format!("metric-config.pods.{}.json-path/json-key", endpoint.name),
        endpoint.key.clone(),
    );
    annotations.insert(
        format!("metric-config.pods.{}.json-path/path", endpoint.name),
        endpoint.path.clone(),
    );
    annotations.insert(
        format!("metric-config.pods.{}.json-path/port", endpoint.name),
        endpoint.port.to_string(),
    );

    Ok(TranslatedMetric {
        source: MetricSource::Pods(PodsMetricSource {
            metric_name: endpoint.name.clone(),
            target: MetricTarget::AverageValue(average),
        }),
        annotations,
    })
}

fn ingress_metric(metric: &AutoscalerMetrics, stack_name: &str) -> Result<TranslatedMetric> {
    let average = metric
        .average
        .ok_or_else(|| invalid("average is required for Ingress metrics"))?;

    Ok(TranslatedMetric {
        source: MetricSource::Object(ObjectMetricSource {
            described_object: ObjectReference::new("Ingress", stack_name),
            metric_name: format!("requests-per-second,{stack_name}"),
            metric_selector: no_annotations(),
            target: MetricTarget::AverageValue(average),
        }),
        annotations: no_annotations(),
    })
}

fn routegroup_metric(metric: &AutoscalerMetrics, stack_name: &str) -> Result<TranslatedMetric> {
    let average = metric
        .average
        .ok_or_else(|| invalid("average is required for RouteGroup metrics"))?;

    let mut selector = BTreeMap::new();
    selector.insert("backend".to_string(), stack_name.to_string());

    Ok(TranslatedMetric {
        source: MetricSource::Object(ObjectMetricSource {
            described_object: ObjectReference::new("RouteGroup", stack_name),
            metric_name: "requests-per-second".to_string(),
            metric_selector: selector,
            target: MetricTarget::AverageValue(average),
        }),
        annotations: no_annotations(),
    })
}

fn external_rps_metric(metric: &AutoscalerMetrics, actual_traffic_weight: f64) -> Result<TranslatedMetric> {
    let rps = metric
        .requests_per_second
        .as_ref()
        .ok_or_else(|| invalid("requestsPerSecond is required for ExternalRPS metrics"))?;
    let average = metric
        .average
        .ok_or_else(|| invalid("average is required for ExternalRPS metrics"))?;
    if rps.name.is_empty() {
        return Err(invalid("requestsPerSecond.name is required"));
    }
    if rps.hostnames.is_empty() {
        return Err(invalid("requestsPerSecond.hostnames is required"));
    }

    let mut selector = BTreeMap::new();
    selector.insert("type".to_string(), "requests-per-second".to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(
        format!("metric-config.{}.requests-per-second/hostnames", rps.name),
        rps.hostnames.join(","),
    );
    // Truncate toward zero rather than round: the upstream project this was
    // ported from formats the weight with `int(weight)`, and downstream
    // metrics adapters parse this annotation expecting that exact behavior.
    annotations.insert(
        format!("metric-config.{}.requests-per-second/weight", rps.name),
        (actual_traffic_weight.trunc() as i64).to_string(),
    );

    Ok(TranslatedMetric {
        source: MetricSource::External(ExternalMetricSource {
            metric_name: rps.name.clone(),
            metric_selector: selector,
            target: MetricTarget::AverageValue(average),
        }),
        annotations,
    })
}
