//! Session supervision: reconnect policy and geometry forwarding.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::console::geometry::DisplayGeometry;
use crate::console::{ConnectParams, DisplayTransport, TransportEvent};
use crate::errors::VmboxResult;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Link state of the console session.
///
/// Transitions are driven by transport events (`Connecting` to `Connected`,
/// anything to `Disconnected`) and by the supervisor issuing a connect
/// (`Disconnected` to `Connecting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Shared {
    transport: Arc<dyn DisplayTransport>,
    params: ConnectParams,
    state_tx: watch::Sender<SessionState>,
    /// Last geometry seen from the window layer, held back until the
    /// session is connected.
    pending_geometry: Mutex<Option<DisplayGeometry>>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Re-issue the connect with unchanged parameters until the transport
    /// accepts the attempt. The console service lives on the same host, so
    /// there is no backoff: a refused attempt is retried immediately.
    async fn reconnect(&self) {
        self.set_state(SessionState::Connecting);
        loop {
            match self.transport.connect(&self.params).await {
                Ok(()) => return,
                Err(error) => {
                    debug!(%error, "console reconnect attempt refused, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

/// Owns one console session: its parameters, its state, and the policy that
/// keeps it alive.
///
/// The supervisor never surfaces individual disconnects to the caller;
/// reconnection is automatic and expected for a locally hosted console.
/// Geometry updates from the window layer are forwarded only while the
/// session is `Connected`; otherwise the latest geometry is cached and
/// flushed on the next `Connected` event.
pub struct ConsoleSupervisor {
    shared: Arc<Shared>,
    events_tx: mpsc::Sender<TransportEvent>,
    pump: JoinHandle<()>,
}

// Supervisors are shared with the window layer across tasks.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<ConsoleSupervisor>;
};

impl ConsoleSupervisor {
    /// Build a supervisor over a transport. Spawns the event pump on the
    /// current runtime; the session starts `Disconnected` until
    /// [`connect`](Self::connect) is called.
    pub fn new(transport: Arc<dyn DisplayTransport>, params: ConnectParams) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let shared = Arc::new(Shared {
            transport,
            params,
            state_tx,
            pending_geometry: Mutex::new(None),
        });
        let pump = tokio::spawn(pump_events(Arc::clone(&shared), events_rx));
        Self {
            shared,
            events_tx,
            pump,
        }
    }

    /// Sender half of the event channel, for the transport integration to
    /// report link changes on.
    pub fn events(&self) -> mpsc::Sender<TransportEvent> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn params(&self) -> &ConnectParams {
        &self.shared.params
    }

    /// Initiate the session. `Ok` means the transport accepted the attempt;
    /// the session is `Connecting` until the transport reports
    /// [`TransportEvent::Connected`]. Unlike the automatic reconnect path,
    /// a refusal here is surfaced to the caller.
    pub async fn connect(&self) -> VmboxResult<()> {
        self.shared.set_state(SessionState::Connecting);
        match self.shared.transport.connect(&self.shared.params).await {
            Ok(()) => {
                info!(target = %self.shared.params.target_id, "console session initiated");
                Ok(())
            }
            Err(error) => {
                self.shared.set_state(SessionState::Disconnected);
                Err(error)
            }
        }
    }

    /// Window size or DPI changed.
    ///
    /// The converted geometry is always retained; it is sent to the
    /// transport only when the session is currently `Connected`. Calls in
    /// any other state succeed without touching the transport.
    pub async fn on_size_changed(
        &self,
        width_px: u32,
        height_px: u32,
        dpi_percent: u32,
    ) -> VmboxResult<()> {
        let geometry = DisplayGeometry::from_window(width_px, height_px, dpi_percent);
        *self.shared.pending_geometry.lock() = Some(geometry);
        if self.state() != SessionState::Connected {
            debug!(
                width_px,
                height_px, dpi_percent, "geometry retained until console connects"
            );
            return Ok(());
        }
        self.shared.transport.update_geometry(&geometry).await
    }

    /// Tear the session down. Stops reconnecting first, then disconnects
    /// the transport; a transport refusal here is logged and swallowed.
    pub async fn shutdown(self) {
        self.pump.abort();
        if let Err(error) = self.shared.transport.disconnect().await {
            warn!(%error, "console disconnect failed during shutdown");
        }
        self.shared.set_state(SessionState::Disconnected);
    }
}

impl Drop for ConsoleSupervisor {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl fmt::Debug for ConsoleSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSupervisor")
            .field("target", &self.shared.params.target_id)
            .field("state", &self.state())
            .finish()
    }
}

async fn pump_events(shared: Arc<Shared>, mut events: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected => {
                shared.set_state(SessionState::Connected);
                debug!("console transport connected");
                let pending = *shared.pending_geometry.lock();
                if let Some(geometry) = pending {
                    if let Err(error) = shared.transport.update_geometry(&geometry).await {
                        warn!(%error, "deferred geometry update failed");
                    }
                }
            }
            TransportEvent::Disconnected { status } => {
                shared.set_state(SessionState::Disconnected);
                warn!(
                    status = format_args!("{status:#010x}"),
                    "console transport dropped, reconnecting"
                );
                shared.reconnect().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::errors::VmboxError;

    #[derive(Debug, Clone, PartialEq)]
    enum TransportCall {
        Connect(ConnectParams),
        Disconnect,
        UpdateGeometry(DisplayGeometry),
    }

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<TransportCall>>,
        connect_refusals: AtomicUsize,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn refuse_next_connects(&self, count: usize) {
            self.connect_refusals.store(count, Ordering::SeqCst);
        }

        fn calls(&self) -> Vec<TransportCall> {
            self.calls.lock().clone()
        }

        fn connect_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, TransportCall::Connect(_)))
                .count()
        }

        fn update_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, TransportCall::UpdateGeometry(_)))
                .count()
        }
    }

    #[async_trait::async_trait]
    impl DisplayTransport for RecordingTransport {
        async fn connect(&self, params: &ConnectParams) -> VmboxResult<()> {
            self.calls.lock().push(TransportCall::Connect(params.clone()));
            if self.connect_refusals.load(Ordering::SeqCst) > 0 {
                self.connect_refusals.fetch_sub(1, Ordering::SeqCst);
                return Err(VmboxError::Transport("console refused the attempt".into()));
            }
            Ok(())
        }

        async fn disconnect(&self) -> VmboxResult<()> {
            self.calls.lock().push(TransportCall::Disconnect);
            Ok(())
        }

        async fn update_geometry(&self, geometry: &DisplayGeometry) -> VmboxResult<()> {
            self.calls.lock().push(TransportCall::UpdateGeometry(*geometry));
            Ok(())
        }
    }

    fn test_supervisor(transport: &Arc<RecordingTransport>) -> ConsoleSupervisor {
        let params = ConnectParams::for_runtime_id(Uuid::new_v4(), true);
        ConsoleSupervisor::new(transport.clone(), params)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn disconnect_triggers_reconnect_with_unchanged_parameters() {
        let transport = RecordingTransport::new();
        let supervisor = test_supervisor(&transport);
        let events = supervisor.events();

        supervisor.connect().await.unwrap();
        events.send(TransportEvent::Connected).await.unwrap();
        let mut states = supervisor.subscribe();
        states
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();

        events
            .send(TransportEvent::Disconnected { status: 0x0000_0B08 })
            .await
            .unwrap();
        wait_until(|| transport.connect_count() == 2).await;

        let calls = transport.calls();
        let connects: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Connect(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(connects.len(), 2);
        assert_eq!(connects[0], connects[1]);
        assert_eq!(supervisor.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn geometry_is_held_back_until_connected_is_observed_again() {
        let transport = RecordingTransport::new();
        let supervisor = test_supervisor(&transport);
        let events = supervisor.events();

        supervisor.connect().await.unwrap();
        events.send(TransportEvent::Connected).await.unwrap();
        let mut states = supervisor.subscribe();
        states
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();

        supervisor.on_size_changed(1920, 1080, 100).await.unwrap();
        assert_eq!(transport.update_count(), 1);

        events
            .send(TransportEvent::Disconnected { status: 0x0000_0003 })
            .await
            .unwrap();
        wait_until(|| transport.connect_count() == 2).await;

        // Resize mid-reconnect: retained, nothing sent.
        supervisor.on_size_changed(2560, 1440, 150).await.unwrap();
        assert_eq!(transport.update_count(), 1);

        events.send(TransportEvent::Connected).await.unwrap();
        wait_until(|| transport.update_count() == 2).await;

        let calls = transport.calls();
        let Some(TransportCall::UpdateGeometry(flushed)) = calls.last() else {
            panic!("expected a geometry update, got {calls:?}");
        };
        assert_eq!(*flushed, DisplayGeometry::from_window(2560, 1440, 150));
    }

    #[tokio::test]
    async fn resize_while_disconnected_is_retained_without_error() {
        let transport = RecordingTransport::new();
        let supervisor = test_supervisor(&transport);

        supervisor.on_size_changed(1024, 768, 100).await.unwrap();

        assert_eq!(supervisor.state(), SessionState::Disconnected);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn reconnect_retries_until_the_transport_accepts() {
        let transport = RecordingTransport::new();
        let supervisor = test_supervisor(&transport);
        let events = supervisor.events();

        supervisor.connect().await.unwrap();
        events.send(TransportEvent::Connected).await.unwrap();

        transport.refuse_next_connects(2);
        events
            .send(TransportEvent::Disconnected { status: 0x0000_0001 })
            .await
            .unwrap();

        // Initial connect plus two refused attempts plus the accepted one.
        wait_until(|| transport.connect_count() == 4).await;
        assert_eq!(supervisor.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn initial_connect_refusal_surfaces_to_the_caller() {
        let transport = RecordingTransport::new();
        transport.refuse_next_connects(1);
        let supervisor = test_supervisor(&transport);

        let err = supervisor.connect().await.unwrap_err();

        assert!(matches!(err, VmboxError::Transport(_)));
        assert_eq!(supervisor.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_disconnects_and_stops_reconnecting() {
        let transport = RecordingTransport::new();
        let supervisor = test_supervisor(&transport);
        let events = supervisor.events();

        supervisor.connect().await.unwrap();
        events.send(TransportEvent::Connected).await.unwrap();
        let mut states = supervisor.subscribe();
        states
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();

        supervisor.shutdown().await;

        assert_eq!(transport.calls().last(), Some(&TransportCall::Disconnect));
        assert_eq!(transport.connect_count(), 1);
    }
}
