use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{stack::StackSpec, Metadata, Object};

/// StackSet is the user-declared parent of a versioned family of Stacks.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StackSet {
    pub metadata: Metadata,
    pub spec: StackSetSpec,
    #[serde(default)]
    pub status: Option<StackSetStatus>,
}

impl Object for StackSet {
    fn kind(&self) -> &'static str {
        "StackSet"
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
pub struct StackSetSpec {
    /// Template used to mint a new Stack whenever its pod-template hash changes.
    pub stack_template: StackTemplate,
    /// Declared traffic distribution. Unknown or stale Stack names are
    /// dropped by the Traffic Reconciler rather than rejected here.
    #[serde(default)]
    pub traffic: Vec<TrafficWeight>,
    #[serde(default)]
    pub stack_lifecycle: StackLifecycle,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackTemplate {
    pub spec: StackSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficWeight {
    pub stack_name: String,
    pub weight: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackLifecycle {
    /// Minimum duration a Stack must receive zero actual traffic before it
    /// becomes eligible for garbage collection.
    #[serde(default = "default_scaledown_ttl_seconds")]
    pub scaledown_ttl_seconds: i64,
    /// Maximum number of historical (non-traffic-receiving) Stacks retained.
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_scaledown_ttl_seconds() -> i64 {
    300
}

fn default_limit() -> u32 {
    10
}

impl Default for StackLifecycle {
    fn default() -> Self {
        Self {
            scaledown_ttl_seconds: default_scaledown_ttl_seconds(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackSetStatus {
    #[serde(default)]
    pub observed_stack_version: String,
    #[serde(default)]
    pub stacks: Vec<StackSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    pub name: String,
    pub actual_traffic_weight: f64,
    pub desired_traffic_weight: f64,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
}
