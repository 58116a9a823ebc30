//! eipbridge — lifecycle, buffer-ownership and data-bridging layer for a
//! cyclic EtherNet/IP (CIP) protocol stack.
//!
//! The protocol stack itself (connection establishment, CIP object model,
//! socket I/O, message parsing) is an external collaborator consumed through
//! the [`ProtocolStack`] trait and the per-cycle [`ApplicationHooks`]
//! callbacks. This crate owns everything around it:
//!
//! - [`StackController`] drives the startup sequence, spawns the background
//!   cyclic worker and owns the run/stop signal,
//! - [`AssemblyArena`] owns the dynamically allocated assembly data buffers
//!   and guarantees each one is released exactly once,
//! - [`DataBridge`] relays one outbound buffer payload per cycle to a
//!   host-side [`DataSink`],
//! - [`IdentitySnapshot`] exposes a bounded, read-only view of the device
//!   identity for host queries.

pub mod core;

pub use crate::core::{
    ApplicationHooks, AssemblyArena, AssemblyBuffer, AssemblyPlan, AssemblySlot, BridgeError,
    ConnectionPointKind, DataBridge, DataSink, DeviceIdentity, IdentitySnapshot, InstanceId,
    IoConnectionEvent, MacAddress, ProtocolStack, Result, RunState, SimulatedStack, StackConfig,
    StackController, StartFailure, StartReport,
};

/// Human-readable library version string, in the spirit of the classic
/// "library ready" banner exposed to hosts.
pub fn library_version() -> String {
    format!("eipbridge v{} - stack bridge ready", env!("CARGO_PKG_VERSION"))
}
