pub mod application;
pub mod assembly;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod sim;
pub mod stack;

pub use application::IoApplication;
pub use assembly::{AssemblyArena, AssemblyBuffer};
pub use bridge::{DataBridge, DataSink};
pub use config::{AssemblyPlan, AssemblySlot, StackConfig};
pub use controller::{RunState, StackController, StartFailure, StartReport};
pub use error::{BridgeError, Result};
pub use identity::{DeviceIdentity, IdentitySnapshot, MAX_PRODUCT_NAME_BYTES};
pub use sim::{SimProbe, SimulatedStack};
pub use stack::{
    ApplicationHooks, ConnectionPointKind, InstanceId, IoConnectionEvent, MacAddress, ProtocolStack,
};
