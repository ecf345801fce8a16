//! Unity Bridge (§4.5): an MQTT client over a fixed topic table. The
//! engine drains at most one message per runtime cycle via
//! `has_data()`/`get_data()` (§4.8).

use crate::error::{UnityError, UnityResult};
use crate::payloads::{CueSequencePayload, SceneNamePayload, TreadmillDataPayload};
use crate::topics;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct UnityBridge {
    client: Client,
    inbox: crossbeam_channel::Receiver<(String, Vec<u8>)>,
    running: Arc<AtomicBool>,
    poller: Option<std::thread::JoinHandle<()>>,
}

impl UnityBridge {
    /// Connects to the broker and subscribes to every inbound topic in
    /// the fixed table before returning.
    pub fn connect(broker: &str, port: u16, client_id: &str) -> UnityResult<Self> {
        let mut options = MqttOptions::new(client_id, broker, port);
        options.set_keep_alive(Duration::from_secs(5));
        let (client, mut connection) = Client::new(options, 64);

        for topic in topics::INBOUND_TOPICS {
            client.subscribe(topic, QoS::AtMostOnce)?;
        }

        let (sender, receiver) = crossbeam_channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let poll_running = Arc::clone(&running);

        let poller = std::thread::Builder::new()
            .name("mesoscope-unity-bridge".to_string())
            .spawn(move || {
                for notification in connection.iter() {
                    if !poll_running.load(Ordering::Acquire) {
                        break;
                    }
                    match notification {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if sender.send((publish.topic, publish.payload.to_vec())).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(error = %err, "Unity bridge connection error");
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn Unity bridge poller thread");

        Ok(Self { client, inbox: receiver, running, poller: Some(poller) })
    }

    /// `send(topic, payload?)` (§4.5).
    pub fn send(&self, topic: &str, payload: Option<&[u8]>) -> UnityResult<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.unwrap_or(&[]))
            .map_err(UnityError::from)
    }

    /// `has_data()` (§4.5).
    pub fn has_data(&self) -> bool {
        !self.inbox.is_empty()
    }

    /// `get_data()` (§4.5): drains at most one queued message.
    pub fn get_data(&self) -> Option<(String, Vec<u8>)> {
        self.inbox.try_recv().ok()
    }

    pub fn request_cue_sequence(&self) -> UnityResult<()> {
        self.send(topics::CUE_SEQUENCE_TRIGGER, None)
    }

    pub fn request_scene_name(&self) -> UnityResult<()> {
        self.send(topics::SCENE_NAME_TRIGGER, None)
    }

    pub fn set_must_lick(&self, enabled: bool) -> UnityResult<()> {
        let topic = if enabled { topics::MUST_LICK_TRUE } else { topics::MUST_LICK_FALSE };
        self.send(topic, None)
    }

    pub fn set_visible_marker(&self, visible: bool) -> UnityResult<()> {
        let topic = if visible { topics::VISIBLE_MARKER_TRUE } else { topics::VISIBLE_MARKER_FALSE };
        self.send(topic, None)
    }

    /// Encoder-sourced treadmill movement (§4.5: "encoder emits directly").
    pub fn publish_treadmill_data(&self, movement: f64) -> UnityResult<()> {
        let payload = serde_json::to_vec(&TreadmillDataPayload { movement }).map_err(|source| {
            UnityError::Payload { topic: topics::LINEAR_TREADMILL_DATA.to_string(), source }
        })?;
        self.send(topics::LINEAR_TREADMILL_DATA, Some(&payload))
    }

    pub fn publish_lick_event(&self) -> UnityResult<()> {
        self.send(topics::LICK_PORT, None)
    }

    pub fn parse_cue_sequence(payload: &[u8]) -> UnityResult<Vec<u8>> {
        serde_json::from_slice::<CueSequencePayload>(payload)
            .map(|p| p.cue_sequence)
            .map_err(|source| UnityError::Payload { topic: topics::CUE_SEQUENCE.to_string(), source })
    }

    pub fn parse_scene_name(payload: &[u8]) -> UnityResult<String> {
        serde_json::from_slice::<SceneNamePayload>(payload)
            .map(|p| p.name)
            .map_err(|source| UnityError::Payload { topic: topics::SCENE_NAME.to_string(), source })
    }

    pub fn disconnect(mut self) {
        self.running.store(false, Ordering::Release);
        let _ = self.client.disconnect();
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cue_sequence_json() {
        let payload = br#"{"cue_sequence":[1,2,3,255]}"#;
        assert_eq!(UnityBridge::parse_cue_sequence(payload).unwrap(), vec![1, 2, 3, 255]);
    }

    #[test]
    fn parses_scene_name_json() {
        let payload = br#"{"name":"LinearTrack_01"}"#;
        assert_eq!(UnityBridge::parse_scene_name(payload).unwrap(), "LinearTrack_01");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(UnityBridge::parse_cue_sequence(b"not json").is_err());
    }
}
