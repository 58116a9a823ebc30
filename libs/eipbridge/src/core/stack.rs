//! Collaborator seam for the external protocol layer.
//!
//! The CIP stack proper lives behind [`ProtocolStack`]: the controller only
//! drives its lifecycle and feeds it an [`ApplicationHooks`] implementation
//! once per cyclic tick. Nothing in this crate opens sockets or parses
//! messages.

use std::fmt;

use crate::core::error::Result;
use crate::core::identity::DeviceIdentity;

/// Protocol-layer assembly instance number.
pub type InstanceId = u32;

/// Link-layer hardware address of the bound network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// How an assembly pair is exposed over a cyclic I/O connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPointKind {
    ExclusiveOwner,
    InputOnly,
    ListenOnly,
}

/// I/O connection state change reported by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoConnectionEvent {
    Opened,
    TimedOut,
    Closed,
}

/// Application callbacks invoked from inside a cyclic tick.
///
/// All calls arrive on the worker thread, strictly sequentially.
pub trait ApplicationHooks: Send {
    /// Inbound data landed on a registered assembly instance.
    fn after_assembly_data_received(&mut self, instance: InstanceId) -> Result<()>;

    /// Called once per cycle before outbound transmission of `instance`.
    /// Returns whether the buffer holds fresh data.
    fn before_assembly_data_send(&mut self, instance: InstanceId) -> bool;

    /// Periodic application hook; no required behavior.
    fn handle_application(&mut self) {}

    /// Connection state change notification; no required behavior.
    fn check_io_connection_event(
        &mut self,
        _output: InstanceId,
        _input: InstanceId,
        _event: IoConnectionEvent,
    ) {
    }
}

/// The external cyclic protocol stack, as consumed by the controller.
///
/// Method granularity mirrors the startup/teardown sequence the controller
/// drives; implementations are free to make individual steps no-ops.
pub trait ProtocolStack: Send {
    /// Initialize the connection registry used by the protocol layer.
    fn init_connection_registry(&mut self);

    /// Resolve the named network interface's hardware address.
    fn resolve_interface_mac(&mut self, interface: &str) -> Result<MacAddress>;

    /// Assign the configured device serial number.
    fn set_serial_number(&mut self, serial_number: u32);

    /// Initialize the protocol stack core with a locally-unique correlation
    /// id (non-cryptographic; collisions are tolerable).
    fn init_stack(&mut self, correlation_id: u16) -> Result<()>;

    /// Bind the resolved hardware address to the link-layer object.
    fn bind_link_mac(&mut self, mac: MacAddress);

    /// Load persisted configuration. Failure is non-fatal to startup.
    fn load_nv_data(&mut self) -> Result<()>;

    /// Bring up the network interface.
    fn bring_up_network(&mut self, interface: &str) -> Result<()>;

    /// Initialize the cyclic processing handler.
    fn init_cyclic_handler(&mut self) -> Result<()>;

    /// Perform one cyclic processing tick, invoking the application hooks
    /// for any inbound/outbound assembly data.
    fn process_cyclic(&mut self, hooks: &mut dyn ApplicationHooks) -> Result<()>;

    /// Tear down the cyclic processing handler.
    fn finish_cyclic_handler(&mut self);

    /// Shut down the protocol stack core.
    fn shutdown_stack(&mut self);

    /// Shut down the network interface.
    fn shutdown_network(&mut self, interface: &str);

    /// Register an assembly instance of the given payload size.
    fn register_assembly(&mut self, instance: InstanceId, size_bytes: usize) -> Result<()>;

    /// Deregister a previously registered assembly instance.
    fn unregister_assembly(&mut self, instance: InstanceId);

    /// Register connection-point configuration for an assembly triple.
    fn configure_connection_point(
        &mut self,
        kind: ConnectionPointKind,
        output: InstanceId,
        input: InstanceId,
        config: InstanceId,
    ) -> Result<()>;

    /// Current device identity state.
    fn identity(&self) -> DeviceIdentity;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_address_display() {
        let mac = MacAddress([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
    }
}
