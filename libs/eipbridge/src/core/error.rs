use thiserror::Error;

use crate::core::controller::RunState;
use crate::core::stack::InstanceId;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("network interface {interface} not found")]
    InterfaceNotFound { interface: String },

    #[error("protocol stack core initialization failed: {reason}")]
    StackInitFailed { reason: String },

    #[error("network bring-up failed: {reason}")]
    NetworkBringupFailed { reason: String },

    #[error("cyclic handler initialization failed: {reason}")]
    HandlerInitFailed { reason: String },

    #[error("non-volatile data load failed: {reason}")]
    ConfigLoadFailed { reason: String },

    #[error("host sink could not be resolved")]
    SinkUnresolved,

    #[error("assembly {instance}: allocation of {size_bytes} bytes failed")]
    AllocationFailed {
        instance: InstanceId,
        size_bytes: usize,
    },

    #[error("assembly {instance}: registration rejected by the protocol layer")]
    RegistrationFailed { instance: InstanceId },

    #[error("assembly tracking table full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },

    #[error("assembly {instance}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        instance: InstanceId,
        expected: usize,
        actual: usize,
    },

    #[error("assembly {instance}: index {index} outside [0, {size})")]
    IndexOutOfRange {
        instance: InstanceId,
        index: usize,
        size: usize,
    },

    #[error("assembly {instance} is not tracked")]
    UnknownInstance { instance: InstanceId },

    #[error("{operation} not valid in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: RunState,
    },

    #[error("cyclic tick failed: {reason}")]
    CyclicTick { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
