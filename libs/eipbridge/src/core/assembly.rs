//! Ownership of the dynamically allocated assembly data buffers.
//!
//! The arena is the single owner of every dynamic assembly payload. Buffers
//! are registered with the protocol layer only after they are allocated and
//! zero-initialized, and released exactly once, after deregistration.

use std::collections::HashMap;

use crate::core::error::{BridgeError, Result};
use crate::core::stack::{InstanceId, ProtocolStack};

/// One contiguous, fixed-size assembly payload buffer.
#[derive(Debug)]
pub struct AssemblyBuffer {
    instance: InstanceId,
    data: Vec<u8>,
}

impl AssemblyBuffer {
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Capacity-checked table of owned assembly buffers, keyed by protocol
/// instance id.
#[derive(Debug)]
pub struct AssemblyArena {
    buffers: HashMap<InstanceId, AssemblyBuffer>,
    capacity: usize,
}

impl AssemblyArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            capacity,
        }
    }

    /// Allocate a zero-filled buffer of `size_bytes` and register it with
    /// the protocol layer under `instance`.
    pub fn create_dynamic(
        &mut self,
        stack: &mut dyn ProtocolStack,
        instance: InstanceId,
        size_bytes: usize,
    ) -> Result<()> {
        if self.buffers.len() >= self.capacity {
            return Err(BridgeError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if self.buffers.contains_key(&instance) {
            return Err(BridgeError::RegistrationFailed { instance });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size_bytes)
            .map_err(|_| BridgeError::AllocationFailed {
                instance,
                size_bytes,
            })?;
        data.resize(size_bytes, 0);

        // Registration only happens once the memory exists and is zeroed.
        stack.register_assembly(instance, size_bytes)?;
        self.buffers.insert(instance, AssemblyBuffer { instance, data });
        tracing::debug!("[arena] created dynamic assembly {instance} ({size_bytes} bytes)");
        Ok(())
    }

    /// Deregister and release every tracked buffer exactly once.
    ///
    /// Idempotent; a second call is a no-op. Must only be invoked after the
    /// cyclic worker has stopped and before the protocol layer is torn down
    /// (the controller enforces that ordering).
    pub fn free_all(&mut self, stack: &mut dyn ProtocolStack) {
        if self.buffers.is_empty() {
            return;
        }
        let count = self.buffers.len();
        for (instance, buffer) in self.buffers.drain() {
            stack.unregister_assembly(instance);
            drop(buffer);
        }
        tracing::debug!("[arena] released {count} assembly buffers");
    }

    /// Overwrite a tracked buffer's full content. The buffer is left
    /// unchanged on any error.
    pub fn set_bytes(&mut self, instance: InstanceId, data: &[u8]) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(&instance)
            .ok_or(BridgeError::UnknownInstance { instance })?;
        if data.len() != buffer.data.len() {
            return Err(BridgeError::LengthMismatch {
                instance,
                expected: buffer.data.len(),
                actual: data.len(),
            });
        }
        buffer.data.copy_from_slice(data);
        Ok(())
    }

    /// Overwrite a single byte of a tracked buffer.
    pub fn set_byte(&mut self, instance: InstanceId, index: usize, value: u8) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(&instance)
            .ok_or(BridgeError::UnknownInstance { instance })?;
        let size = buffer.data.len();
        if index >= size {
            return Err(BridgeError::IndexOutOfRange {
                instance,
                index,
                size,
            });
        }
        buffer.data[index] = value;
        Ok(())
    }

    /// Current content of a tracked buffer, if any.
    pub fn bytes(&self, instance: InstanceId) -> Option<&[u8]> {
        self.buffers.get(&instance).map(|b| b.as_bytes())
    }

    /// Number of tracked buffers.
    pub fn tracked(&self) -> usize {
        self.buffers.len()
    }
}
