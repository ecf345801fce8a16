//! JSON payload shapes carried by the Unity bridge's inbound/outbound
//! topics (§4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueSequencePayload {
    pub cue_sequence: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneNamePayload {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TreadmillDataPayload {
    pub movement: f64,
}
