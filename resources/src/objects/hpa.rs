use serde::{Deserialize, Serialize};

use super::{ObjectReference, Metadata, Object};

/// HorizontalPodAutoscaler (v2): scales a target's replica count from one or
/// more metric sources. The HPA Synthesizer is the only writer; the core
/// never reads a live horizontal-pod-autoscaler back into its decisions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HorizontalPodAutoscaler {
    pub metadata: Metadata,
    pub spec: HorizontalPodAutoscalerSpec,
    #[serde(default)]
    pub status: Option<HorizontalPodAutoscalerStatus>,
}

impl Object for HorizontalPodAutoscaler {
    fn kind(&self) -> &'static str {
        "HorizontalPodAutoscaler"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }

    fn namespace(&self) -> &String {
        &self.metadata.namespace
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerSpec {
    pub scale_target_ref: ObjectReference,
    pub min_replicas: i32,
    pub max_replicas: i32,
    #[serde(default)]
    pub metrics: Vec<MetricSource>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerStatus {
    #[serde(default)]
    pub current_replicas: i32,
    #[serde(default)]
    pub desired_replicas: i32,
}

/// The five metric-source shapes a horizontal-pod-autoscaler can carry. The
/// sort order used by the HPA Synthesizer (external < object < pods <
/// resource/container-resource) is a total order over these tags.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum MetricSource {
    External(ExternalMetricSource),
    Object(ObjectMetricSource),
    Pods(PodsMetricSource),
    Resource(ResourceMetricSource),
    ContainerResource(ContainerResourceMetricSource),
}

impl MetricSource {
    /// Rank used for the canonical sort; ties broken by declaration order.
    pub fn sort_rank(&self) -> u8 {
        match self {
            MetricSource::External(_) => 0,
            MetricSource::Object(_) => 1,
            MetricSource::Pods(_) => 2,
            MetricSource::Resource(_) | MetricSource::ContainerResource(_) => 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricSource {
    pub metric_name: String,
    #[serde(default)]
    pub metric_selector: std::collections::BTreeMap<String, String>,
    pub target: MetricTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetricSource {
    pub described_object: ObjectReference,
    pub metric_name: String,
    #[serde(default)]
    pub metric_selector: std::collections::BTreeMap<String, String>,
    pub target: MetricTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodsMetricSource {
    pub metric_name: String,
    pub target: MetricTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetricSource {
    pub name: ResourceName,
    pub target: MetricTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourceMetricSource {
    pub name: ResourceName,
    pub container: String,
    pub target: MetricTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ResourceName {
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "memory")]
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum MetricTarget {
    AverageUtilization(i32),
    AverageValue(i64),
}
