//! The core's application-hook implementation.
//!
//! `IoApplication` is what the cyclic worker hands to the protocol layer on
//! every tick: it dispatches inbound-data notifications per assembly
//! instance and relays outbound payloads through the data bridge.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::assembly::AssemblyArena;
use crate::core::bridge::DataBridge;
use crate::core::config::AssemblyPlan;
use crate::core::error::Result;
use crate::core::stack::{
    ApplicationHooks, ConnectionPointKind, InstanceId, IoConnectionEvent, ProtocolStack,
};

pub struct IoApplication {
    plan: AssemblyPlan,
    arena: Arc<Mutex<AssemblyArena>>,
    bridge: Arc<DataBridge>,
}

impl IoApplication {
    pub fn new(
        plan: AssemblyPlan,
        arena: Arc<Mutex<AssemblyArena>>,
        bridge: Arc<DataBridge>,
    ) -> Self {
        Self {
            plan,
            arena,
            bridge,
        }
    }

    /// Application initialization: create the configured assembly instances
    /// and register their connection points with the protocol layer.
    ///
    /// Called once during startup, after the stack core is initialized.
    pub fn initialize(&mut self, stack: &mut dyn ProtocolStack) -> Result<()> {
        let plan = &self.plan;
        {
            let mut arena = self.arena.lock();
            arena.create_dynamic(stack, plan.input.instance, plan.input.size_bytes)?;
            arena.create_dynamic(stack, plan.output.instance, plan.output.size_bytes)?;
            arena.create_dynamic(stack, plan.config.instance, plan.config.size_bytes)?;
            arena.create_dynamic(stack, plan.explicit.instance, plan.explicit.size_bytes)?;
        }

        // Heartbeat assemblies carry no payload; they are registered with
        // the stack but never tracked by the arena.
        stack.register_assembly(plan.heartbeat_input_only, 0)?;
        stack.register_assembly(plan.heartbeat_listen_only, 0)?;

        stack.configure_connection_point(
            ConnectionPointKind::ExclusiveOwner,
            plan.output.instance,
            plan.input.instance,
            plan.config.instance,
        )?;
        stack.configure_connection_point(
            ConnectionPointKind::InputOnly,
            plan.heartbeat_input_only,
            plan.input.instance,
            plan.config.instance,
        )?;
        stack.configure_connection_point(
            ConnectionPointKind::ListenOnly,
            plan.heartbeat_listen_only,
            plan.input.instance,
            plan.config.instance,
        )?;

        tracing::debug!(
            "[app] assemblies created (input {}, output {}, config {}, explicit {})",
            plan.input.instance,
            plan.output.instance,
            plan.config.instance,
            plan.explicit.instance
        );
        Ok(())
    }
}

impl ApplicationHooks for IoApplication {
    fn after_assembly_data_received(&mut self, instance: InstanceId) -> Result<()> {
        if instance == self.plan.output.instance {
            // Fresh output data from the network; nothing to mirror here.
            Ok(())
        } else if instance == self.plan.config.instance {
            // Accept any configuration data.
            Ok(())
        } else if instance == self.plan.explicit.instance {
            // Data from an explicit set-data-attribute message.
            Ok(())
        } else {
            tracing::debug!("[app] data received for untracked assembly {instance}");
            Ok(())
        }
    }

    fn before_assembly_data_send(&mut self, instance: InstanceId) -> bool {
        let arena = self.arena.lock();
        if let Some(bytes) = arena.bytes(instance) {
            self.bridge.publish(bytes);
        }
        true
    }

    fn check_io_connection_event(
        &mut self,
        output: InstanceId,
        input: InstanceId,
        event: IoConnectionEvent,
    ) {
        tracing::debug!("[app] io connection event {event:?} (output {output}, input {input})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sim::SimulatedStack;

    fn new_app() -> (IoApplication, SimulatedStack) {
        let plan = AssemblyPlan::default();
        let arena = Arc::new(Mutex::new(AssemblyArena::with_capacity(16)));
        let bridge = Arc::new(DataBridge::new());
        (IoApplication::new(plan, arena, bridge), SimulatedStack::new())
    }

    #[test]
    fn test_initialize_registers_all_assemblies_and_connection_points() {
        let (mut app, mut stack) = new_app();
        app.initialize(&mut stack).unwrap();

        let probe = stack.probe();
        for instance in [101, 102, 103, 152, 153, 154] {
            assert!(probe.is_registered(instance), "assembly {instance}");
        }
        assert_eq!(probe.connection_point_count(), 3);
        assert_eq!(app.arena.lock().tracked(), 4);
    }

    #[test]
    fn test_received_dispatch_accepts_known_and_unknown_instances() {
        let (mut app, mut stack) = new_app();
        app.initialize(&mut stack).unwrap();
        app.after_assembly_data_received(101).unwrap();
        app.after_assembly_data_received(103).unwrap();
        app.after_assembly_data_received(999).unwrap();
    }
}
