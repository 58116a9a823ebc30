//! Stack and assembly configuration.
//!
//! Assembly instance ids and sizes are externally injected configuration,
//! not hidden constants; the defaults mirror a typical adapter layout
//! (exclusive-owner input/output pair, zero-size config assembly, heartbeat
//! assemblies for input-only/listen-only connections, and a small assembly
//! for explicit messaging).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::stack::InstanceId;

/// One tracked assembly: its protocol instance id and payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblySlot {
    pub instance: InstanceId,
    pub size_bytes: usize,
}

impl AssemblySlot {
    pub fn new(instance: InstanceId, size_bytes: usize) -> Self {
        Self {
            instance,
            size_bytes,
        }
    }
}

/// The set of assemblies created during application initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyPlan {
    /// Producing assembly (device → network). Also the target of the
    /// host-facing `set_input_*` operations.
    pub input: AssemblySlot,
    /// Consuming assembly (network → device).
    pub output: AssemblySlot,
    /// Configuration assembly; zero-size is valid.
    pub config: AssemblySlot,
    /// Assembly reserved for explicit messaging.
    pub explicit: AssemblySlot,
    /// Heartbeat assembly for input-only connections (no payload).
    pub heartbeat_input_only: InstanceId,
    /// Heartbeat assembly for listen-only connections (no payload).
    pub heartbeat_listen_only: InstanceId,
}

impl Default for AssemblyPlan {
    fn default() -> Self {
        Self {
            input: AssemblySlot::new(102, 32),
            output: AssemblySlot::new(101, 132),
            config: AssemblySlot::new(103, 0),
            explicit: AssemblySlot::new(154, 32),
            heartbeat_input_only: 152,
            heartbeat_listen_only: 153,
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Fixed device serial number assigned during startup.
    pub serial_number: u32,
    /// Pause between cyclic ticks. Not a hard real-time guarantee.
    pub cycle_interval: Duration,
    /// Maximum number of tracked dynamic assemblies. Exceeding it fails
    /// buffer creation with an explicit capacity error.
    pub arena_capacity: usize,
    /// Assemblies created during application initialization.
    pub assemblies: AssemblyPlan,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            serial_number: 123_456_789,
            cycle_interval: Duration::from_millis(1),
            arena_capacity: 16,
            assemblies: AssemblyPlan::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_is_consistent() {
        let plan = AssemblyPlan::default();
        let ids = [
            plan.input.instance,
            plan.output.instance,
            plan.config.instance,
            plan.explicit.instance,
            plan.heartbeat_input_only,
            plan.heartbeat_listen_only,
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                assert_ne!(a, b, "assembly ids must be unique");
            }
        }
    }

    #[test]
    fn test_default_config_values() {
        let config = StackConfig::default();
        assert_eq!(config.serial_number, 123_456_789);
        assert_eq!(config.cycle_interval, Duration::from_millis(1));
        assert!(config.arena_capacity >= 4);
    }
}
