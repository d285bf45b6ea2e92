use serde::{Deserialize, Serialize};

// Control messages posted from a page to its controlling worker
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "deregister")]
    Deregister,
}
