//! In-process protocol stack stand-in.
//!
//! `SimulatedStack` implements [`ProtocolStack`] without any network or CIP
//! machinery: it records every lifecycle call, supports per-step failure
//! injection, and drives the application hooks once per tick the way the
//! real stack does (inbound data on the consuming assembly, then the
//! before-send hook on the producing assembly). Used by the test suite and
//! for host bring-up without hardware.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::error::{BridgeError, Result};
use crate::core::identity::DeviceIdentity;
use crate::core::stack::{
    ApplicationHooks, ConnectionPointKind, InstanceId, IoConnectionEvent, MacAddress, ProtocolStack,
};

#[derive(Debug, Default)]
struct SimState {
    identity: DeviceIdentity,
    interfaces: Vec<String>,
    registered: HashMap<InstanceId, usize>,
    unregistered: HashMap<InstanceId, u32>,
    connection_points: Vec<(ConnectionPointKind, InstanceId, InstanceId, InstanceId)>,
    correlation_id: Option<u16>,
    events: Vec<String>,
    ticks: u64,
    handler_ready: bool,

    fail_stack_init: bool,
    fail_network_bringup: bool,
    fail_handler_init: bool,
    fail_nv_load: bool,
    fail_tick_after: Option<u64>,
}

/// Read-only view into a [`SimulatedStack`]'s recorded state. Stays valid
/// after the stack has been boxed and moved into a controller.
#[derive(Clone)]
pub struct SimProbe {
    shared: Arc<Mutex<SimState>>,
}

impl SimProbe {
    pub fn ticks(&self) -> u64 {
        self.shared.lock().ticks
    }

    pub fn is_registered(&self, instance: InstanceId) -> bool {
        self.shared.lock().registered.contains_key(&instance)
    }

    pub fn registered_count(&self) -> usize {
        self.shared.lock().registered.len()
    }

    pub fn registered_size(&self, instance: InstanceId) -> Option<usize> {
        self.shared.lock().registered.get(&instance).copied()
    }

    pub fn unregister_count(&self, instance: InstanceId) -> u32 {
        self.shared
            .lock()
            .unregistered
            .get(&instance)
            .copied()
            .unwrap_or(0)
    }

    pub fn connection_point_count(&self) -> usize {
        self.shared.lock().connection_points.len()
    }

    pub fn correlation_id(&self) -> Option<u16> {
        self.shared.lock().correlation_id
    }

    /// Lifecycle call log, in invocation order.
    pub fn events(&self) -> Vec<String> {
        self.shared.lock().events.clone()
    }

    pub fn event_count(&self, event: &str) -> usize {
        self.shared
            .lock()
            .events
            .iter()
            .filter(|e| e.as_str() == event)
            .count()
    }
}

pub struct SimulatedStack {
    shared: Arc<Mutex<SimState>>,
}

impl Default for SimulatedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStack {
    pub fn new() -> Self {
        let state = SimState {
            interfaces: vec!["eth0".to_string(), "lo".to_string()],
            ..SimState::default()
        };
        Self {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_identity(self, identity: DeviceIdentity) -> Self {
        self.shared.lock().identity = identity;
        self
    }

    /// Restrict which interface names resolve to a hardware address.
    pub fn with_interfaces<I: IntoIterator<Item = String>>(self, interfaces: I) -> Self {
        self.shared.lock().interfaces = interfaces.into_iter().collect();
        self
    }

    pub fn fail_stack_init(self) -> Self {
        self.shared.lock().fail_stack_init = true;
        self
    }

    pub fn fail_network_bringup(self) -> Self {
        self.shared.lock().fail_network_bringup = true;
        self
    }

    pub fn fail_handler_init(self) -> Self {
        self.shared.lock().fail_handler_init = true;
        self
    }

    pub fn fail_nv_load(self) -> Self {
        self.shared.lock().fail_nv_load = true;
        self
    }

    /// Make `process_cyclic` fail once `ticks` successful ticks have run.
    pub fn fail_tick_after(self, ticks: u64) -> Self {
        self.shared.lock().fail_tick_after = Some(ticks);
        self
    }

    /// Handle for observing recorded state after the stack is handed off.
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ProtocolStack for SimulatedStack {
    fn init_connection_registry(&mut self) {
        self.shared.lock().events.push("init_registry".to_string());
    }

    fn resolve_interface_mac(&mut self, interface: &str) -> Result<MacAddress> {
        let mut state = self.shared.lock();
        state.events.push(format!("resolve_mac {interface}"));
        if !state.interfaces.iter().any(|i| i == interface) {
            return Err(BridgeError::InterfaceNotFound {
                interface: interface.to_string(),
            });
        }
        // Deterministic locally-administered address derived from the name.
        let mut mac = [0x02, 0x00, 0x5e, 0x00, 0x00, 0x00];
        for (i, b) in interface.bytes().enumerate() {
            mac[2 + (i % 4)] ^= b;
        }
        Ok(MacAddress(mac))
    }

    fn set_serial_number(&mut self, serial_number: u32) {
        let mut state = self.shared.lock();
        state.identity.serial_number = serial_number;
        state.events.push(format!("set_serial {serial_number}"));
    }

    fn init_stack(&mut self, correlation_id: u16) -> Result<()> {
        let mut state = self.shared.lock();
        state.events.push("init_stack".to_string());
        if state.fail_stack_init {
            return Err(BridgeError::StackInitFailed {
                reason: "injected failure".to_string(),
            });
        }
        state.correlation_id = Some(correlation_id);
        Ok(())
    }

    fn bind_link_mac(&mut self, mac: MacAddress) {
        self.shared.lock().events.push(format!("bind_mac {mac}"));
    }

    fn load_nv_data(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.events.push("nv_load".to_string());
        if state.fail_nv_load {
            return Err(BridgeError::ConfigLoadFailed {
                reason: "no persisted configuration found".to_string(),
            });
        }
        Ok(())
    }

    fn bring_up_network(&mut self, interface: &str) -> Result<()> {
        let mut state = self.shared.lock();
        state.events.push(format!("bring_up {interface}"));
        if state.fail_network_bringup {
            return Err(BridgeError::NetworkBringupFailed {
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn init_cyclic_handler(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.events.push("init_handler".to_string());
        if state.fail_handler_init {
            return Err(BridgeError::HandlerInitFailed {
                reason: "injected failure".to_string(),
            });
        }
        state.handler_ready = true;
        Ok(())
    }

    fn process_cyclic(&mut self, hooks: &mut dyn ApplicationHooks) -> Result<()> {
        let (tick, exclusive_owner) = {
            let mut state = self.shared.lock();
            if !state.handler_ready {
                return Err(BridgeError::CyclicTick {
                    reason: "cyclic handler not initialized".to_string(),
                });
            }
            if let Some(limit) = state.fail_tick_after {
                if state.ticks >= limit {
                    return Err(BridgeError::CyclicTick {
                        reason: "injected tick failure".to_string(),
                    });
                }
            }
            state.ticks += 1;
            let cp = state
                .connection_points
                .iter()
                .find(|cp| cp.0 == ConnectionPointKind::ExclusiveOwner)
                .copied();
            (state.ticks, cp)
        };

        // Hook order per tick: application hook, inbound data on the
        // consuming assembly, then the before-send hook on the producer.
        hooks.handle_application();
        if let Some((_, output, input, _)) = exclusive_owner {
            if tick == 1 {
                hooks.check_io_connection_event(output, input, IoConnectionEvent::Opened);
            }
            hooks.after_assembly_data_received(output)?;
            hooks.before_assembly_data_send(input);
        }
        Ok(())
    }

    fn finish_cyclic_handler(&mut self) {
        let mut state = self.shared.lock();
        state.handler_ready = false;
        state.events.push("finish_handler".to_string());
    }

    fn shutdown_stack(&mut self) {
        let mut state = self.shared.lock();
        // Stack teardown destroys every remaining assembly object,
        // including the payload-less heartbeat assemblies nothing
        // unregisters individually.
        state.registered.clear();
        state.events.push("shutdown_stack".to_string());
    }

    fn shutdown_network(&mut self, interface: &str) {
        self.shared
            .lock()
            .events
            .push(format!("shutdown_network {interface}"));
    }

    fn register_assembly(&mut self, instance: InstanceId, size_bytes: usize) -> Result<()> {
        let mut state = self.shared.lock();
        if state.registered.contains_key(&instance) {
            return Err(BridgeError::RegistrationFailed { instance });
        }
        state.registered.insert(instance, size_bytes);
        state.events.push(format!("register {instance}"));
        Ok(())
    }

    fn unregister_assembly(&mut self, instance: InstanceId) {
        let mut state = self.shared.lock();
        state.registered.remove(&instance);
        *state.unregistered.entry(instance).or_insert(0) += 1;
        state.events.push(format!("unregister {instance}"));
    }

    fn configure_connection_point(
        &mut self,
        kind: ConnectionPointKind,
        output: InstanceId,
        input: InstanceId,
        config: InstanceId,
    ) -> Result<()> {
        let mut state = self.shared.lock();
        state.connection_points.push((kind, output, input, config));
        state
            .events
            .push(format!("connection_point {kind:?} {output} {input} {config}"));
        Ok(())
    }

    fn identity(&self) -> DeviceIdentity {
        self.shared.lock().identity.clone()
    }
}
