//! Error taxonomy for the Unity bridge and cue/trial decomposition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnityError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("failed to (de)serialize Unity payload on {topic}: {source}")]
    Payload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type UnityResult<T> = Result<T, UnityError>;

/// Cue→Trial decomposition failure (§4.7): "returns an error only if
/// Unity and the experiment configuration disagree."
#[derive(Debug, Error, Clone, PartialEq)]
#[error("no trial motif matches cue sequence at position {position}; next bytes: {next_bytes:?}")]
pub struct DecomposeError {
    pub position: usize,
    pub next_bytes: Vec<u8>,
}
