use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{hpa::HorizontalPodAutoscalerSpec, Condition, Metadata, Object};

/// One application version within a StackSet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Stack {
    pub metadata: Metadata,
    pub spec: StackSpec,
    #[serde(default)]
    pub status: Option<StackStatus>,
}

impl Object for Stack {
    fn kind(&self) -> &'static str {
        "Stack"
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
pub struct StackSpec {
    /// Opaque pod template, out of the core's scope beyond carrying it
    /// through to the Deployment synthesizer.
    #[serde(default)]
    pub pod_template: serde_json::Value,
    /// Number of replicas to run when no autoscaler is declared.
    #[serde(default)]
    pub replicas: Option<u32>,
    /// High-level autoscaler declaration. Mutually exclusive with
    /// `horizontal_pod_autoscaler`.
    #[serde(default)]
    pub autoscaler: Option<Autoscaler>,
    /// A raw HorizontalPodAutoscaler spec, passed through unchanged by the
    /// HPA Synthesizer apart from name/owner normalization.
    #[serde(default)]
    pub horizontal_pod_autoscaler: Option<HorizontalPodAutoscalerSpec>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Autoscaler {
    pub min_replicas: i32,
    pub max_replicas: i32,
    #[serde(default)]
    pub metrics: Vec<AutoscalerMetrics>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub ready_replicas: u32,
    #[serde(default)]
    pub desired_replicas: u32,
    #[serde(default)]
    pub no_traffic_since: Option<NaiveDateTime>,
    #[serde(default)]
    pub prescaling_active: bool,
    #[serde(default)]
    pub prescaling_replicas: u32,
    #[serde(default)]
    pub prescaling_desired_traffic_weight: f64,
    #[serde(default)]
    pub prescaling_last_traffic_increase: Option<NaiveDateTime>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Set by the (out of scope) Deployment synthesizer once the pod
    /// template backing this Stack matches its spec. The Traffic Reconciler
    /// and Lifecycle Manager treat a Stack as eligible only once this is true.
    #[serde(default)]
    pub resources_updated: bool,
    #[serde(default)]
    pub actual_traffic_weight: f64,
    #[serde(default)]
    pub desired_traffic_weight: f64,
}

/// One declared autoscaler metric. The `type` tag selects which of the
/// variant-specific blocks below is populated; the Metric Translator
/// validates each variant's required fields independently.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerMetrics {
    #[serde(rename = "type")]
    pub type_: AutoscalerMetricType,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub average_utilization: Option<i32>,
    #[serde(default)]
    pub average: Option<i64>,
    #[serde(default)]
    pub queue: Option<MetricsQueue>,
    #[serde(default)]
    pub zmon: Option<MetricsZmon>,
    #[serde(default)]
    pub scaling_schedule: Option<MetricsScalingSchedule>,
    #[serde(default)]
    pub cluster_scaling_schedule: Option<MetricsClusterScalingSchedule>,
    #[serde(default)]
    pub endpoint: Option<MetricsEndpoint>,
    #[serde(default)]
    pub requests_per_second: Option<MetricsRequestsPerSecond>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AutoscalerMetricType {
    #[serde(rename = "CPU")]
    Cpu,
    Memory,
    #[serde(rename = "AmazonSQS")]
    AmazonSqs,
    #[serde(rename = "ZMON")]
    Zmon,
    ScalingSchedule,
    ClusterScalingSchedule,
    PodJSON,
    Ingress,
    RouteGroup,
    #[serde(rename = "ExternalRPS")]
    ExternalRps,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsQueue {
    pub name: String,
    pub region: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MetricsZmon {
    pub check_id: String,
    pub key: String,
    pub duration: String,
    #[serde(default)]
    pub aggregators: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsScalingSchedule {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsClusterScalingSchedule {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsEndpoint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricsRequestsPerSecond {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostnames: Vec<String>,
}
