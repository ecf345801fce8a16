//! Microcontroller Channels (§4.3): three parallel bidirectional frame
//! transports (Actor, Sensor, Encoder), each owning a subset of module
//! interfaces and forwarding inbound frames to the log bus.

use crate::error::{HalError, HalResult};
use crate::frame::{OutboundFrame, Transport};
use crate::module_interface::{Command, ModuleInterface};
use mesoscope_shm::LogBusHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Channel kind (§2 dependency order item 3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Actor,
    Sensor,
    Encoder,
}

impl ChannelKind {
    fn name(self) -> &'static str {
        match self {
            ChannelKind::Actor => "actor",
            ChannelKind::Sensor => "sensor",
            ChannelKind::Encoder => "encoder",
        }
    }
}

const CMD_SET_PARAMETERS: u8 = 0;
const CMD_RESET_QUEUE: u8 = 255;

fn command_to_outbound(module_type: u8, module_id: u8, command: &Command) -> OutboundFrame {
    match command {
        Command::SetParameters(payload) => OutboundFrame {
            module_type,
            module_id,
            command_code: CMD_SET_PARAMETERS,
            payload: payload.clone(),
        },
        Command::OneOff { code, payload, noblock } => {
            let mut bytes = vec![*noblock as u8];
            bytes.extend_from_slice(payload);
            OutboundFrame { module_type, module_id, command_code: *code, payload: bytes }
        }
        Command::Repeated { code, payload, noblock, cycle_us } => {
            let mut bytes = vec![*noblock as u8];
            bytes.extend_from_slice(&cycle_us.to_le_bytes());
            bytes.extend_from_slice(payload);
            OutboundFrame { module_type, module_id, command_code: *code, payload: bytes }
        }
        Command::ResetQueue => OutboundFrame {
            module_type,
            module_id,
            command_code: CMD_RESET_QUEUE,
            payload: Vec::new(),
        },
    }
}

/// Live handle to a spawned channel thread. Dropping it without calling
/// `stop()` leaks the thread; callers should always stop explicitly as
/// part of the engine shutdown sequence (§3 "Ownership & lifecycle").
pub struct ChannelHandle {
    kind: ChannelKind,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    commands: mpsc::Sender<OutboundFrame>,
}

impl ChannelHandle {
    /// Channel stop (§4.3): send monitoring-off to every owned
    /// interface → drain → close port. The actual monitoring-off sends
    /// and port close happen inside the channel thread once it observes
    /// `running` cleared.
    pub fn stop(mut self) -> HalResult<()> {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        Ok(())
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Enqueues a runtime command for `(module_type, module_id)`, sent
    /// on the channel's transport by its worker thread. Used for every
    /// outbound command issued after startup: valve/brake/screen/TTL
    /// one-offs, and explicit monitoring toggles driven by system-state
    /// transitions (§4.8.f).
    pub fn send(&self, module_type: u8, module_id: u8, command: &Command) -> HalResult<()> {
        let frame = command_to_outbound(module_type, module_id, command);
        self.commands
            .send(frame)
            .map_err(|_| HalError::ChannelClosed { channel: self.kind.name().to_string() })
    }
}

/// Spawns one channel on its own OS thread (§4.3: "Channels reserve one
/// CPU each").
pub fn spawn_channel(
    kind: ChannelKind,
    mut transport: Box<dyn Transport>,
    interfaces: Vec<Arc<dyn ModuleInterface>>,
    log_bus: LogBusHandle,
) -> HalResult<ChannelHandle> {
    transport.open()?;
    transport.send_reset()?;
    for interface in &interfaces {
        let frame = command_to_outbound(
            interface.module_type(),
            interface.module_id(),
            &interface.initial_parameters(),
        );
        transport.send(&frame)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let thread_running = Arc::clone(&running);
    let thread_name = format!("mesoscope-{}-channel", kind.name());
    let (command_tx, command_rx) = mpsc::channel::<OutboundFrame>();

    let thread = std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            while thread_running.load(Ordering::Acquire) {
                while let Ok(frame) = command_rx.try_recv() {
                    if let Err(err) = transport.send(&frame) {
                        tracing::warn!(channel = kind.name(), error = %err, "channel degraded");
                    }
                }
                match transport.try_recv() {
                    Ok(Some(frame)) => {
                        for interface in &interfaces {
                            if interface.module_type() == frame.module_type
                                && interface.module_id() == frame.module_id
                                && interface.expected_events().contains(&frame.event_code)
                            {
                                interface.handle_event(frame.event_code, &frame.payload, frame.t_us);
                            }
                        }
                        let mut bytes = Vec::with_capacity(frame.payload.len() + 2);
                        bytes.push(frame.module_id);
                        bytes.push(frame.event_code);
                        bytes.extend_from_slice(&frame.payload);
                        log_bus.put(frame.module_type, frame.t_us, &bytes);
                    }
                    Ok(None) => std::thread::sleep(Duration::from_micros(200)),
                    Err(err) => {
                        tracing::warn!(channel = kind.name(), error = %err, "channel degraded");
                        std::thread::sleep(Duration::from_millis(50));
                    }
                }
            }

            for interface in &interfaces {
                for command in interface.disable_monitoring() {
                    let frame = command_to_outbound(
                        interface.module_type(),
                        interface.module_id(),
                        &command,
                    );
                    if let Err(err) = transport.send(&frame) {
                        tracing::warn!(channel = kind.name(), error = %err, "failed to disable monitoring on stop");
                    }
                }
            }
            if let Err(err) = transport.close() {
                tracing::warn!(channel = kind.name(), error = %err, "failed to close channel transport");
            }
        })
        .expect("failed to spawn microcontroller channel thread");

    Ok(ChannelHandle { kind, running, thread: Some(thread), commands: command_tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::InboundFrame;
    use mesoscope_common::consts::{event, module_type};
    use mesoscope_shm::LogBus;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeTransport {
        inbound: Arc<Mutex<Vec<InboundFrame>>>,
        sent: Arc<Mutex<Vec<OutboundFrame>>>,
    }

    impl Transport for FakeTransport {
        fn open(&mut self) -> HalResult<()> {
            Ok(())
        }
        fn send_reset(&mut self) -> HalResult<()> {
            Ok(())
        }
        fn send(&mut self, frame: &OutboundFrame) -> HalResult<()> {
            self.sent.lock().unwrap().push(frame.clone());
            Ok(())
        }
        fn try_recv(&mut self) -> HalResult<Option<InboundFrame>> {
            Ok(self.inbound.lock().unwrap().pop())
        }
        fn close(&mut self) -> HalResult<()> {
            Ok(())
        }
    }

    #[test]
    fn routes_frame_to_matching_interface_and_forwards_to_log_bus() {
        use crate::interfaces::LickInterface;

        let tmp = TempDir::new().unwrap();
        let bus = LogBus::start(tmp.path()).unwrap();

        let lick = Arc::new(LickInterface::new(3, 1800, 1000));
        let inbound = Arc::new(Mutex::new(vec![InboundFrame {
            module_type: module_type::LICK,
            module_id: 3,
            event_code: event::LICK_ADC_READING,
            payload: 0u16.to_le_bytes().to_vec(),
            t_us: 42,
        }]));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Box::new(FakeTransport { inbound: Arc::clone(&inbound), sent });

        let handle = spawn_channel(
            ChannelKind::Sensor,
            transport,
            vec![lick.clone() as Arc<dyn ModuleInterface>],
            bus.handle(),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        handle.stop().unwrap();
        bus.stop().unwrap();

        // A zero reading re-arms but does not increment; this only
        // confirms the frame was routed without panicking.
        assert_eq!(lick.tracker().load(), 0);
    }
}
