//! Relay of outbound assembly payloads to a host-side sink.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::error::{BridgeError, Result};

/// Host-side consumer of outbound cycle payloads.
///
/// Invoked synchronously from the worker thread, strictly sequentially; one
/// call per completed cyclic tick.
pub trait DataSink: Send + Sync {
    fn on_assembly_data(&self, payload: &[u8]) -> Result<()>;
}

/// Holds a non-owned reference to the host sink and relays one buffer
/// payload per invocation.
///
/// The sink's lifetime is managed by the host: the bridge keeps only a
/// [`Weak`] reference and tolerates the target being unset or already
/// dropped.
#[derive(Default)]
pub struct DataBridge {
    sink: Mutex<Option<Weak<dyn DataSink>>>,
}

impl DataBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the host sink reference. Fails with `SinkUnresolved` if the
    /// target is already gone; the previous sink (if any) is kept in that
    /// case.
    pub fn attach(&self, sink: Weak<dyn DataSink>) -> Result<()> {
        if sink.upgrade().is_none() {
            return Err(BridgeError::SinkUnresolved);
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    /// Clear the sink reference; subsequent publishes become no-ops.
    pub fn detach(&self) {
        *self.sink.lock() = None;
    }

    /// Relay `payload` to the attached sink.
    ///
    /// Called once per cycle from the worker thread. The payload is copied
    /// into a transient, call-scoped buffer that is released on every exit
    /// path; sink-side failures are logged and never propagate into the
    /// cyclic loop.
    pub fn publish(&self, payload: &[u8]) {
        let target = self.sink.lock().clone();
        let Some(weak) = target else {
            tracing::trace!("[bridge] no sink attached, dropping cycle payload");
            return;
        };
        let Some(sink) = weak.upgrade() else {
            tracing::warn!("[bridge] sink target is gone, dropping cycle payload");
            return;
        };

        let frame = payload.to_vec();
        if let Err(e) = sink.on_assembly_data(&frame) {
            tracing::warn!("[bridge] sink rejected {} byte payload: {e}", frame.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct RecordingSink {
        calls: AtomicU64,
        last: Mutex<Vec<u8>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicU64::new(0),
                last: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl DataSink for RecordingSink {
        fn on_assembly_data(&self, payload: &[u8]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = payload.to_vec();
            if self.fail {
                return Err(BridgeError::SinkUnresolved);
            }
            Ok(())
        }
    }

    #[test]
    fn test_publish_without_sink_is_noop() {
        let bridge = DataBridge::new();
        bridge.publish(&[1, 2, 3]);
    }

    #[test]
    fn test_attach_dead_sink_fails() {
        let bridge = DataBridge::new();
        let weak = {
            let sink: Arc<dyn DataSink> = Arc::new(RecordingSink::new(false));
            Arc::downgrade(&sink)
        };
        assert!(matches!(
            bridge.attach(weak).unwrap_err(),
            BridgeError::SinkUnresolved
        ));
    }

    #[test]
    fn test_publish_delivers_payload_copy() {
        let bridge = DataBridge::new();
        let sink = Arc::new(RecordingSink::new(false));
        let dyn_sink: Arc<dyn DataSink> = sink.clone();
        bridge.attach(Arc::downgrade(&dyn_sink)).unwrap();

        bridge.publish(&[0xAA; 128]);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.last.lock().as_slice(), &[0xAA; 128][..]);
    }

    #[test]
    fn test_publish_survives_sink_failure() {
        let bridge = DataBridge::new();
        let sink = Arc::new(RecordingSink::new(true));
        let dyn_sink: Arc<dyn DataSink> = sink.clone();
        bridge.attach(Arc::downgrade(&dyn_sink)).unwrap();

        bridge.publish(&[1]);
        bridge.publish(&[2]);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_publish_after_sink_dropped_is_noop() {
        let bridge = DataBridge::new();
        let sink = Arc::new(RecordingSink::new(false));
        let dyn_sink: Arc<dyn DataSink> = sink.clone();
        bridge.attach(Arc::downgrade(&dyn_sink)).unwrap();
        drop(dyn_sink);
        drop(sink);

        bridge.publish(&[9, 9, 9]);
    }

    #[test]
    fn test_detach_clears_sink() {
        let bridge = DataBridge::new();
        let sink = Arc::new(RecordingSink::new(false));
        let dyn_sink: Arc<dyn DataSink> = sink.clone();
        bridge.attach(Arc::downgrade(&dyn_sink)).unwrap();
        bridge.detach();

        bridge.publish(&[5]);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }
}
