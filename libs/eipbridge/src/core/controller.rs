//! Stack lifecycle: startup sequence, the background cyclic worker, and the
//! run/stop signal.
//!
//! Exactly two logical threads of control touch this module: the host
//! thread (start/stop/identity/input setters) and one worker spawned per
//! successful start. The worker observes the cancellation flag between
//! iterations only — never mid-tick — and runs the whole teardown in its
//! own context before acknowledging completion.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::core::application::IoApplication;
use crate::core::assembly::AssemblyArena;
use crate::core::bridge::{DataBridge, DataSink};
use crate::core::config::StackConfig;
use crate::core::error::{BridgeError, Result};
use crate::core::identity::IdentitySnapshot;
use crate::core::stack::ProtocolStack;

/// Lifecycle state as maintained by the controller and the worker.
///
/// The host thread only ever requests `StopRequested`; the worker owns the
/// transitions into `Running` and `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    StopRequested = 3,
}

#[derive(Debug)]
struct RunStateCell(AtomicU8);

impl RunStateCell {
    fn new(state: RunState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> RunState {
        match self.0.load(Ordering::SeqCst) {
            0 => RunState::Stopped,
            1 => RunState::Starting,
            2 => RunState::Running,
            _ => RunState::StopRequested,
        }
    }

    fn set(&self, state: RunState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Successful start: the accumulated human-readable startup transcript.
#[derive(Debug)]
pub struct StartReport {
    pub transcript: Vec<String>,
}

impl StartReport {
    pub fn text(&self) -> String {
        self.transcript.join("\n")
    }
}

/// Failed start: the structured error plus the transcript accumulated up to
/// the failing step.
#[derive(Debug)]
pub struct StartFailure {
    pub error: BridgeError,
    pub transcript: Vec<String>,
}

impl StartFailure {
    fn new(error: BridgeError, transcript: Vec<String>) -> Self {
        Self { error, transcript }
    }

    pub fn text(&self) -> String {
        self.transcript.join("\n")
    }
}

impl fmt::Display for StartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack startup failed: {}", self.error)
    }
}

impl std::error::Error for StartFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Drives the startup sequence, owns the cyclic worker, and bridges the
/// host-facing operations onto the arena/bridge/stack.
pub struct StackController {
    config: StackConfig,
    stack: Arc<Mutex<Box<dyn ProtocolStack>>>,
    arena: Arc<Mutex<AssemblyArena>>,
    bridge: Arc<DataBridge>,
    state: Arc<RunStateCell>,
    cancel: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    done_rx: Option<crossbeam_channel::Receiver<()>>,
}

struct WorkerContext {
    stack: Arc<Mutex<Box<dyn ProtocolStack>>>,
    arena: Arc<Mutex<AssemblyArena>>,
    state: Arc<RunStateCell>,
    cancel: Arc<AtomicBool>,
    cycle_interval: Duration,
}

impl StackController {
    pub fn new(config: StackConfig, stack: Box<dyn ProtocolStack>) -> Self {
        let arena = AssemblyArena::with_capacity(config.arena_capacity);
        Self {
            config,
            stack: Arc::new(Mutex::new(stack)),
            arena: Arc::new(Mutex::new(arena)),
            bridge: Arc::new(DataBridge::new()),
            state: Arc::new(RunStateCell::new(RunState::Stopped)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            done_rx: None,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Run the startup sequence and spawn the cyclic worker.
    ///
    /// Valid only from `Stopped`, and only once the previous worker (if
    /// any) has finished its teardown. Each step's failure aborts the
    /// sequence, releases any buffers created so far, and returns the
    /// structured error together with the transcript accumulated up to that
    /// point; the worker is never spawned on failure.
    pub fn start(&mut self, interface: &str) -> std::result::Result<StartReport, StartFailure> {
        if let Some(handle) = self.worker.take() {
            if self.state.get() == RunState::Stopped {
                // Previous worker finished; reap it.
                let _ = handle.join();
                self.done_rx = None;
            } else {
                self.worker = Some(handle);
                return Err(StartFailure::new(
                    BridgeError::InvalidState {
                        operation: "start",
                        state: self.state.get(),
                    },
                    Vec::new(),
                ));
            }
        }
        if self.state.get() != RunState::Stopped {
            return Err(StartFailure::new(
                BridgeError::InvalidState {
                    operation: "start",
                    state: self.state.get(),
                },
                Vec::new(),
            ));
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.state.set(RunState::Starting);

        let mut transcript = Vec::new();
        let app = match self.run_startup(interface, &mut transcript) {
            Ok(app) => app,
            Err(error) => {
                self.abort_startup(interface);
                return Err(StartFailure::new(error, transcript));
            }
        };

        if let Err(error) = self.spawn_worker(interface.to_string(), app) {
            log_line(
                &mut transcript,
                "error: failed to spawn background cyclic task".to_string(),
            );
            self.abort_startup(interface);
            return Err(StartFailure::new(error, transcript));
        }

        log_line(
            &mut transcript,
            "info: background cyclic task started".to_string(),
        );
        Ok(StartReport { transcript })
    }

    fn run_startup(
        &mut self,
        interface: &str,
        transcript: &mut Vec<String>,
    ) -> Result<IoApplication> {
        let mut guard = self.stack.lock();
        let stack = &mut **guard;

        log_line(
            transcript,
            "info: starting protocol stack initialization".to_string(),
        );

        // Step 1: connection registry.
        stack.init_connection_registry();

        // Step 2: hardware address of the named interface.
        let mac = match stack.resolve_interface_mac(interface) {
            Ok(mac) => mac,
            Err(_) => {
                log_line(
                    transcript,
                    format!("error: network interface {interface} not found!"),
                );
                return Err(BridgeError::InterfaceNotFound {
                    interface: interface.to_string(),
                });
            }
        };
        log_line(transcript, format!("info: resolved {interface} to {mac}"));

        // Step 3: fixed device serial number.
        stack.set_serial_number(self.config.serial_number);

        // Step 4: locally-unique correlation id; collisions are tolerable.
        let correlation_id = correlation_id();

        // Step 5: stack core, then application initialization (the stack
        // calls back into the application at this point in the original
        // ordering).
        if let Err(e) = stack.init_stack(correlation_id) {
            log_line(
                transcript,
                "error: protocol stack core initialization failed!".to_string(),
            );
            return Err(BridgeError::StackInitFailed {
                reason: e.to_string(),
            });
        }
        log_line(
            transcript,
            format!("info: stack core initialized (correlation id {correlation_id})"),
        );

        let mut app = IoApplication::new(
            self.config.assemblies.clone(),
            Arc::clone(&self.arena),
            Arc::clone(&self.bridge),
        );
        if let Err(e) = app.initialize(stack) {
            log_line(
                transcript,
                format!("error: application initialization failed: {e}"),
            );
            return Err(e);
        }
        log_line(
            transcript,
            "info: assembly buffers created and connection points configured".to_string(),
        );

        // Step 6: bind the hardware address to the link-layer object.
        stack.bind_link_mac(mac);

        // Step 7: persisted configuration; failure is the first-run case.
        if let Err(e) = stack.load_nv_data() {
            tracing::warn!("non-volatile data load failed: {e}");
            transcript.push(
                "warning: loading of some non-volatile data failed; maybe the first start?"
                    .to_string(),
            );
        }

        // Step 8: bring up the network interface.
        if let Err(e) = stack.bring_up_network(interface) {
            log_line(transcript, "error: network bring-up failed".to_string());
            return Err(BridgeError::NetworkBringupFailed {
                reason: e.to_string(),
            });
        }

        // Step 9: cyclic processing handler.
        if let Err(e) = stack.init_cyclic_handler() {
            log_line(
                transcript,
                "error: cyclic handler initialization failed".to_string(),
            );
            return Err(BridgeError::HandlerInitFailed {
                reason: e.to_string(),
            });
        }
        log_line(transcript, "info: cyclic handler initialized".to_string());

        Ok(app)
    }

    /// Undo a failed startup: release any buffers created so far and tear
    /// the stack core back down so a later `start` begins from a clean
    /// slate, then return to `Stopped`.
    fn abort_startup(&self, interface: &str) {
        let mut stack = self.stack.lock();
        self.arena.lock().free_all(&mut **stack);
        stack.shutdown_stack();
        stack.shutdown_network(interface);
        self.state.set(RunState::Stopped);
    }

    fn spawn_worker(&mut self, interface: String, app: IoApplication) -> Result<()> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let ctx = WorkerContext {
            stack: Arc::clone(&self.stack),
            arena: Arc::clone(&self.arena),
            state: Arc::clone(&self.state),
            cancel: Arc::clone(&self.cancel),
            cycle_interval: self.config.cycle_interval,
        };
        let handle = thread::Builder::new()
            .name("eip-cyclic".to_string())
            .spawn(move || run_cyclic_loop(ctx, interface, app, done_tx))?;
        self.worker = Some(handle);
        self.done_rx = Some(done_rx);
        Ok(())
    }

    /// Request shutdown. Asynchronous: sets the cancellation signal and
    /// returns immediately; the worker observes it between iterations and
    /// runs teardown in its own context.
    pub fn stop(&self) {
        match self.state.get() {
            RunState::Running | RunState::Starting => {
                self.state.set(RunState::StopRequested);
                self.cancel.store(true, Ordering::SeqCst);
                tracing::info!("stop requested; cancellation signal set");
            }
            RunState::StopRequested => {}
            RunState::Stopped => {
                tracing::debug!("stop ignored; already stopped");
            }
        }
    }

    /// Request shutdown and wait up to `timeout` for the worker to
    /// acknowledge teardown. Returns whether the stack reached `Stopped`.
    pub fn stop_wait(&mut self, timeout: Duration) -> bool {
        self.stop();
        let Some(done_rx) = self.done_rx.take() else {
            return self.state.get() == RunState::Stopped;
        };
        match done_rx.recv_timeout(timeout) {
            Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.worker.take() {
                    let _ = handle.join();
                }
                self.state.get() == RunState::Stopped
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                self.done_rx = Some(done_rx);
                false
            }
        }
    }

    /// Whether the worker is actually processing (tri-state indicator
    /// maintained by the worker, not inferred from the cancellation flag).
    pub fn is_running(&self) -> bool {
        self.state.get() == RunState::Running
    }

    pub fn run_state(&self) -> RunState {
        self.state.get()
    }

    /// Bounded, point-in-time copy of the device identity.
    pub fn get_identity(&self) -> IdentitySnapshot {
        IdentitySnapshot::from_identity(&self.stack.lock().identity())
    }

    /// Overwrite the producing assembly's full content. The payload length
    /// must match the configured assembly size exactly.
    pub fn set_input_values(&self, values: &[u8]) -> Result<()> {
        self.arena
            .lock()
            .set_bytes(self.config.assemblies.input.instance, values)
    }

    /// Overwrite a single byte of the producing assembly.
    pub fn set_input_value(&self, index: usize, value: u8) -> Result<()> {
        self.arena
            .lock()
            .set_byte(self.config.assemblies.input.instance, index, value)
    }

    /// Inject the host sink the bridge publishes to each cycle.
    pub fn attach_sink(&self, sink: Weak<dyn DataSink>) -> Result<()> {
        self.bridge.attach(sink)
    }

    pub fn detach_sink(&self) {
        self.bridge.detach();
    }
}

impl Drop for StackController {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_wait(Duration::from_secs(1));
        }
    }
}

fn log_line(transcript: &mut Vec<String>, line: String) {
    tracing::info!("{line}");
    transcript.push(line);
}

/// Time-seeded, non-cryptographic correlation id. Collision risk is
/// acceptable; this is not security-sensitive.
fn correlation_id() -> u16 {
    use rand::{Rng, SeedableRng};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    rand::rngs::StdRng::seed_from_u64(seed).gen_range(0..=u16::MAX)
}

/// Worker body: cooperative polling loop plus teardown.
///
/// Cancellation is observed only between iterations; an in-flight tick is
/// never pre-empted. Teardown ordering: cyclic handler first, buffers once
/// the loop has stopped, then the stack core and the network interface.
fn run_cyclic_loop(
    ctx: WorkerContext,
    interface: String,
    mut app: IoApplication,
    done_tx: crossbeam_channel::Sender<()>,
) {
    ctx.state.set(RunState::Running);
    tracing::info!(
        "[cyclic] worker running (interval {:?})",
        ctx.cycle_interval
    );

    loop {
        if ctx.cancel.load(Ordering::SeqCst) {
            break;
        }
        {
            let mut stack = ctx.stack.lock();
            if let Err(e) = stack.process_cyclic(&mut app) {
                tracing::error!("[cyclic] tick failed: {e}; leaving loop");
                ctx.state.set(RunState::StopRequested);
                break;
            }
        }
        thread::sleep(ctx.cycle_interval);
    }

    if ctx.state.get() != RunState::StopRequested {
        ctx.state.set(RunState::StopRequested);
    }

    {
        let mut stack = ctx.stack.lock();
        stack.finish_cyclic_handler();
        ctx.arena.lock().free_all(&mut **stack);
        stack.shutdown_stack();
        stack.shutdown_network(&interface);
    }

    ctx.state.set(RunState::Stopped);
    let _ = done_tx.send(());
    tracing::info!("[cyclic] worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sim::SimulatedStack;

    fn controller_with(sim: SimulatedStack) -> (StackController, crate::core::sim::SimProbe) {
        let probe = sim.probe();
        (
            StackController::new(StackConfig::default(), Box::new(sim)),
            probe,
        )
    }

    #[test]
    fn test_run_state_cell_round_trip() {
        let cell = RunStateCell::new(RunState::Stopped);
        for state in [
            RunState::Stopped,
            RunState::Starting,
            RunState::Running,
            RunState::StopRequested,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn test_start_with_unknown_interface_allocates_nothing() {
        let (mut controller, probe) = controller_with(SimulatedStack::new());
        let failure = controller.start("missing0").unwrap_err();

        assert!(matches!(
            failure.error,
            BridgeError::InterfaceNotFound { .. }
        ));
        assert!(failure.text().contains("missing0"));
        assert_eq!(probe.registered_count(), 0);
        assert_eq!(controller.run_state(), RunState::Stopped);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stack_init_failure_aborts_before_network() {
        let (mut controller, probe) = controller_with(SimulatedStack::new().fail_stack_init());
        let failure = controller.start("eth0").unwrap_err();

        assert!(matches!(failure.error, BridgeError::StackInitFailed { .. }));
        assert_eq!(controller.run_state(), RunState::Stopped);
        // Later steps never ran.
        let events = probe.events();
        assert!(events.iter().any(|e| e == "init_stack"));
        assert!(!events.iter().any(|e| e.starts_with("bring_up")));
    }

    #[test]
    fn test_handler_init_failure_releases_buffers() {
        let (mut controller, probe) = controller_with(SimulatedStack::new().fail_handler_init());
        let failure = controller.start("eth0").unwrap_err();

        assert!(matches!(
            failure.error,
            BridgeError::HandlerInitFailed { .. }
        ));
        // Buffers created by the earlier steps were released again, exactly
        // once each.
        assert_eq!(probe.registered_count(), 0);
        assert_eq!(probe.unregister_count(102), 1);
        assert_eq!(controller.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_nv_load_failure_is_nonfatal() {
        let (mut controller, _probe) = controller_with(SimulatedStack::new().fail_nv_load());
        let report = controller.start("eth0").unwrap();
        assert!(report.text().contains("non-volatile"));

        assert!(controller.stop_wait(Duration::from_secs(2)));
    }

    #[test]
    fn test_start_rejected_while_active() {
        let (mut controller, _probe) = controller_with(SimulatedStack::new());
        controller.start("eth0").unwrap();

        let failure = controller.start("eth0").unwrap_err();
        assert!(matches!(failure.error, BridgeError::InvalidState { .. }));

        assert!(controller.stop_wait(Duration::from_secs(2)));
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let (controller, _probe) = controller_with(SimulatedStack::new());
        controller.stop();
        assert_eq!(controller.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_serial_number_assigned_during_startup() {
        let (mut controller, _probe) = controller_with(SimulatedStack::new());
        assert_eq!(controller.get_identity().serial_number, 0);

        controller.start("eth0").unwrap();
        assert_eq!(controller.get_identity().serial_number, 123_456_789);

        assert!(controller.stop_wait(Duration::from_secs(2)));
    }

    #[test]
    fn test_set_input_values_requires_exact_length() {
        let (mut controller, _probe) = controller_with(SimulatedStack::new());
        controller.start("eth0").unwrap();

        // Default input assembly is 32 bytes.
        assert!(matches!(
            controller.set_input_values(&[0u8; 31]).unwrap_err(),
            BridgeError::LengthMismatch { .. }
        ));
        controller.set_input_values(&[0x11; 32]).unwrap();
        controller.set_input_value(0, 0x22).unwrap();
        assert!(matches!(
            controller.set_input_value(32, 0x22).unwrap_err(),
            BridgeError::IndexOutOfRange { .. }
        ));

        assert!(controller.stop_wait(Duration::from_secs(2)));
    }

    #[test]
    fn test_correlation_id_recorded_by_stack() {
        let (mut controller, probe) = controller_with(SimulatedStack::new());
        controller.start("eth0").unwrap();
        assert!(probe.correlation_id().is_some());
        assert!(controller.stop_wait(Duration::from_secs(2)));
    }
}
