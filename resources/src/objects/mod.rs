use std::{collections::HashMap, fmt};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod hpa;
pub mod object_reference;
pub mod stack;
pub mod stackset;

pub use object_reference::ObjectReference;

/// Common surface every resource kind the controller reads or writes exposes.
///
/// `kind`/`kind_plural` drive the REST path the client builds; `name` and `uri`
/// let generic reconcile code address an object without matching on its variant.
pub trait Object {
    fn kind(&self) -> &'static str;

    fn kind_plural(&self) -> String {
        format!("{}s", self.kind().to_lowercase())
    }

    fn name(&self) -> &String;

    fn namespace(&self) -> &String;

    fn uri(&self) -> String {
        format!(
            "/apis/zalando.org/v1/namespaces/{}/{}/{}",
            self.namespace(),
            self.kind_plural(),
            self.name()
        )
    }
}

/// Label set attached to an object, also used as a selector.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Labels(pub HashMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn matches(&self, selector: &Labels) -> bool {
        selector
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).map(|existing| existing == v).unwrap_or(false))
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        write!(f, "{}", pairs.join(","))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: Option<Uuid>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub owner_references: Vec<ObjectReference>,
    #[serde(default)]
    pub creation_timestamp: Option<NaiveDateTime>,
    /// Set by the cluster API server once a delete request has been
    /// accepted; the object lingers until its finalizers (if any) clear.
    #[serde(default)]
    pub deletion_timestamp: Option<NaiveDateTime>,
}

impl Metadata {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: None,
            labels: Labels::new(),
            annotations: HashMap::new(),
            owner_references: Vec::new(),
            creation_timestamp: None,
            deletion_timestamp: None,
        }
    }
}

/// A condition on a resource's status subresource, following the well-known
/// Kubernetes `{type, status, reason, message, lastTransitionTime}` shape.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub last_transition_time: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
