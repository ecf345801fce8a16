//! Common module interface contract (§4.2).
//!
//! Every interface exposes typed commands and consumes inbound event
//! frames from its owning channel, mutating its tracker (if any) per
//! interface-specific rules. Commands are fire-and-forget and
//! deduplicated by the channel's queue; transport failures are logged
//! as "channel degraded" and never propagated to the engine as fatal.

/// A command accepted by every module interface (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetParameters(Vec<u8>),
    OneOff { code: u8, payload: Vec<u8>, noblock: bool },
    Repeated { code: u8, payload: Vec<u8>, noblock: bool, cycle_us: u64 },
    ResetQueue,
}

/// Common contract every module interface implements (§4.2).
pub trait ModuleInterface: Send + Sync {
    fn module_type(&self) -> u8;
    fn module_id(&self) -> u8;

    /// Inbound event codes this interface expects from its channel.
    fn expected_events(&self) -> &'static [u8];

    /// MQTT topic this interface is bound to, if any (most are not;
    /// Unity-facing publication is the Unity Bridge's job, §4.5).
    fn mqtt_topic(&self) -> Option<&str> {
        None
    }

    /// The initial `set_parameters` command pushed by the channel on
    /// connect, before entering steady state (§4.3).
    fn initial_parameters(&self) -> Command;

    /// Mutates tracker/local state in response to one inbound event.
    /// The raw frame has already been forwarded to the log bus by the
    /// owning channel; this call only updates interface-local state.
    fn handle_event(&self, event_code: u8, payload: &[u8], t_us: u64);

    /// Commands to send in order to begin monitoring (e.g. a repeated
    /// `check_state` at the interface's configured polling delay).
    /// Default: no monitoring loop.
    fn enable_monitoring(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Commands to send to stop monitoring. Default clears the queue,
    /// matching the channel-stop sequence in §4.3.
    fn disable_monitoring(&self) -> Vec<Command> {
        vec![Command::ResetQueue]
    }
}
