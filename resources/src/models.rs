use serde::{Deserialize, Serialize};

/// Envelope the cluster API server wraps every response in, mirrored from
/// the host project's own client models.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response<T> {
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn new(msg: Option<String>, data: Option<T>) -> Self {
        Self { msg, data }
    }
}

/// A single notification delivered over the watch WebSocket.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum WatchEvent {
    Put(PutEvent),
    Delete(DeleteEvent),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PutEvent {
    pub key: String,
    pub object: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeleteEvent {
    pub key: String,
}
