// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The `Plc` instance: the mutex-guarded per-gateway state that the
//! registry interns and the state machine drives.
//!
//! A cyclic layer→PLC back-reference, the kind a callback-based design would
//! need so a layer's socket/timer callback could re-enter the core, has no
//! counterpart here: the runner in [`crate::state_machine`] owns the socket
//! and drives every layer call itself, awaiting each I/O operation in place
//! under the PLC's own `tokio::sync::Mutex` rather than registering a
//! callback and returning. Holding the lock across an await still never
//! blocks a thread — the task yields to the executor on every `.await` — it
//! just doesn't let a second caller's frame interleave with this one, which
//! is exactly the half-duplex, one-frame-in-flight invariant this connection
//! model needs.

use std::{
    any::Any,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Mutex, task::JoinHandle};
use tracing::warn;

use crate::{
    clock::Clock,
    error::{PlcError, PlcResult},
    layer::stack::LayerStack,
    request::{Request, RequestHandle, RequestQueue},
    socket::{BoxFuture, PlcSocket},
};

/// The states and tracks of the dispatcher, one variant per named state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlcState {
    DispatchRequests,
    ReserveSpaceForRequest,
    BuildRequest,
    RequestSent,
    ResponseReady,
    StartConnect,
    BuildConnectRequest,
    ConnectRequestSent,
    ConnectResponseReady,
    StartDisconnect,
    BuildDisconnectRequest,
    DisconnectRequestSent,
    DisconnectResponseReady,
    Terminate,
}

impl PlcState {
    pub fn name(self) -> &'static str {
        match self {
            PlcState::DispatchRequests => "dispatch_requests",
            PlcState::ReserveSpaceForRequest => "reserve_space_for_request",
            PlcState::BuildRequest => "build_request",
            PlcState::RequestSent => "request_sent",
            PlcState::ResponseReady => "response_ready",
            PlcState::StartConnect => "start_connect",
            PlcState::BuildConnectRequest => "build_connect_request",
            PlcState::ConnectRequestSent => "connect_request_sent",
            PlcState::ConnectResponseReady => "connect_response_ready",
            PlcState::StartDisconnect => "start_disconnect",
            PlcState::BuildDisconnectRequest => "build_disconnect_request",
            PlcState::DisconnectRequestSent => "disconnect_request_sent",
            PlcState::DisconnectResponseReady => "disconnect_response_ready",
            PlcState::Terminate => "terminate",
        }
    }
}

/// Opens a fresh transport to a gateway. The one production implementation
/// ([`TcpConnector`]) dials out over TCP; tests substitute a connector that
/// hands back a pre-wired [`crate::socket::testing::FakeSocket`].
pub trait Connector: Send + Sync + std::fmt::Debug {
    fn connect<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<Arc<dyn PlcSocket>>>;
}

#[derive(Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<Arc<dyn PlcSocket>>> {
        Box::pin(async move {
            let sock = crate::socket::TcpPlcSocket::connect((host, port), timeout).await?;
            Ok(Arc::new(sock) as Arc<dyn PlcSocket>)
        })
    }
}

/// Opaque per-family context a layer stack's builder may have stashed on the
/// PLC. `Drop` on the boxed value is Rust's destructor; no separate
/// callback is needed.
pub type PlcContext = Box<dyn Any + Send>;

/// The mutable, mutex-guarded state of one PLC connection.
#[derive(Debug)]
pub struct PlcInner {
    pub(crate) socket: Option<Arc<dyn PlcSocket>>,
    pub(crate) buffer: Vec<u8>,
    pub(crate) data_capacity: usize,
    pub(crate) payload_start: usize,
    pub(crate) payload_end: usize,
    pub(crate) top_layer: LayerStack,
    pub(crate) queue: RequestQueue,
    pub(crate) current_request_id: crate::layer::RequestId,
    pub(crate) current_state: PlcState,
    pub(crate) retry_interval_ms: u64,
    pub(crate) retry_ceiling_ms: u64,
    pub(crate) retry_floor_ms: u64,
    pub(crate) next_retry_time_ms: u64,
    pub(crate) idle_timeout_ms: u64,
    pub(crate) next_idle_timeout_ms: u64,
    pub(crate) is_connected: bool,
    pub(crate) is_terminating: bool,
    pub(crate) context: Option<PlcContext>,
}

/// One interned PLC connection.
pub struct Plc {
    pub key: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) connect_timeout: Duration,
    pub(crate) destroy_grace: Duration,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) inner: Mutex<PlcInner>,
    heartbeat_started: AtomicBool,
    heartbeat_cancel: tokio_util::sync::CancellationToken,
    heartbeat_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Plc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plc")
            .field("key", &self.key)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Plc {
    /// Builds a fresh, not-yet-connected PLC, as `get_or_create`'s
    /// "construct a new instance" branch does. `top_layer` is the chain the
    /// family-specific constructor built; `idle_timeout_ms` is validated by
    /// the caller (client API) against the `0..=5000` legal range.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: String,
        host: String,
        port: u16,
        top_layer: LayerStack,
        initial_capacity: usize,
        idle_timeout_ms: u64,
        retry_interval_ms: u64,
        retry_ceiling_ms: u64,
        clock: Arc<dyn Clock>,
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        destroy_grace: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            key,
            host,
            port,
            clock,
            connector,
            connect_timeout,
            destroy_grace,
            heartbeat_interval,
            inner: Mutex::new(PlcInner {
                socket: None,
                buffer: vec![0u8; initial_capacity],
                data_capacity: initial_capacity,
                payload_start: 0,
                payload_end: 0,
                top_layer,
                queue: RequestQueue::new(),
                current_request_id: crate::layer::INVALID_REQUEST_ID,
                current_state: PlcState::DispatchRequests,
                retry_interval_ms,
                retry_ceiling_ms,
                retry_floor_ms: retry_interval_ms,
                next_retry_time_ms: now,
                idle_timeout_ms,
                next_idle_timeout_ms: now + idle_timeout_ms,
                is_connected: false,
                is_terminating: false,
                context: None,
            }),
            heartbeat_started: AtomicBool::new(false),
            heartbeat_cancel: tokio_util::sync::CancellationToken::new(),
            heartbeat_handle: StdMutex::new(None),
        }
    }

    /// A minimal PLC for unit tests that never actually connects: a demo
    /// family stack, a fake connector, and a short heartbeat so tests
    /// advancing a [`crate::clock::FakeClock`] don't wait out real time.
    #[cfg(any(test, feature = "testing"))]
    pub fn new_for_test(host: String, port: u16) -> Self {
        use crate::{clock::SystemClock, layer::families::demo::demo_family};

        Self::new(
            format!("test/{host}/{port}"),
            host,
            port,
            demo_family(),
            256,
            5000,
            1000,
            16000,
            Arc::new(SystemClock),
            Arc::new(testing::FakeConnector::new()),
            Duration::from_millis(500),
            Duration::from_millis(500),
            Duration::from_millis(200),
        )
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Runs the dispatcher to its next suspension point. Safe to call from
    /// `start_request`, a heartbeat tick, or concurrently from another task
    /// — the PLC mutex linearizes all callers.
    pub async fn run(&self) -> PlcResult<()> {
        let mut st = self.inner.lock().await;
        crate::state_machine::run_locked(self, &mut st).await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.is_connected
    }

    pub async fn current_state_name(&self) -> &'static str {
        self.inner.lock().await.current_state.name()
    }

    pub async fn retry_interval_ms(&self) -> u64 {
        self.inner.lock().await.retry_interval_ms
    }

    pub async fn get_idle_timeout_ms(&self) -> u64 {
        self.inner.lock().await.idle_timeout_ms
    }

    /// Sets the idle timeout, legal range `0..=5000`. Rejected synchronously
    /// with no state change on an out-of-range value.
    pub async fn set_idle_timeout_ms(&self, ms: u64) -> PlcResult<()> {
        if ms > 5000 {
            return Err(PlcError::OutOfBounds);
        }
        let mut st = self.inner.lock().await;
        st.idle_timeout_ms = ms;
        Ok(())
    }

    pub async fn get_buffer_size(&self) -> usize {
        self.inner.lock().await.data_capacity
    }

    /// Grows the buffer to at least `size` bytes. Buffers only grow, never
    /// shrink.
    pub async fn set_buffer_size(&self, size: usize) -> PlcResult<()> {
        let mut st = self.inner.lock().await;
        if size > st.data_capacity {
            st.buffer.resize(size, 0);
            st.data_capacity = size;
        }
        Ok(())
    }

    pub async fn set_context(&self, context: PlcContext) {
        self.inner.lock().await.context = Some(context);
    }

    pub async fn with_context<R>(&self, f: impl FnOnce(Option<&PlcContext>) -> R) -> R {
        let st = self.inner.lock().await;
        f(st.context.as_ref())
    }

    /// Enqueues `request` and, if the machine is idle, runs the dispatcher
    /// synchronously. Returns `Busy` if a request with the same client
    /// identity is already queued or in flight.
    pub async fn start_request(&self, request: Request) -> PlcResult<RequestHandle> {
        let handle = request.handle();
        {
            let mut st = self.inner.lock().await;
            if st.queue.contains_client(handle) {
                return Err(PlcError::Busy);
            }
            st.queue.push(request);
        }
        self.run().await?;
        Ok(handle)
    }

    /// Pushes `request` onto the pending FIFO without running the
    /// dispatcher. Production callers always go through `start_request`,
    /// which runs the machine immediately after queuing; this exists so
    /// tests can line up several requests ahead of a single `run()` call and
    /// observe batching deterministically, the way several client threads
    /// racing ahead of a slow runner would in practice.
    #[cfg(any(test, feature = "testing"))]
    pub async fn test_enqueue(&self, request: Request) {
        self.inner.lock().await.queue.push(request);
    }

    /// Dequeues a request by its client handle. `NotFound` if it is neither
    /// pending nor in flight.
    pub async fn stop_request(&self, handle: RequestHandle) -> PlcResult<()> {
        let mut st = self.inner.lock().await;
        if st.queue.abort_client(handle) {
            st.top_layer.abort_request(crate::layer::INVALID_REQUEST_ID);
            Ok(())
        } else {
            Err(PlcError::NotFound)
        }
    }

    /// Hard reset: closes the socket, re-initializes every layer, clears
    /// `is_connected`.
    pub async fn reset(&self) -> PlcResult<()> {
        let mut st = self.inner.lock().await;
        if let Some(sock) = st.socket.take() {
            sock.kill_now();
        }
        st.top_layer.initialize_all()?;
        st.is_connected = false;
        st.current_state = PlcState::DispatchRequests;
        Ok(())
    }

    /// Forces the socket closed immediately without waiting out any grace
    /// deadline (spec §C, supplemented `kill_now` convenience).
    pub async fn kill_now(&self) {
        let mut st = self.inner.lock().await;
        if let Some(sock) = st.socket.take() {
            sock.kill_now();
        }
        st.is_connected = false;
    }

    pub(crate) fn ensure_heartbeat_started(self: &Arc<Self>) {
        if self.heartbeat_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let plc = Arc::clone(self);
        let cancel = self.heartbeat_cancel.clone();
        let interval = self.heartbeat_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = plc.run().await {
                            warn!(key = %plc.key, error = %e, "heartbeat run failed");
                        }
                    }
                }
            }
        });
        *self.heartbeat_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Full teardown (spec §4.1, `destroy`): stop the heartbeat, mark
    /// terminating, run the machine to completion or a grace deadline,
    /// then release the socket and abandon anything still queued.
    pub async fn teardown(&self) -> PlcResult<()> {
        self.heartbeat_cancel.cancel();
        if let Some(handle) = self.heartbeat_handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }

        {
            let mut st = self.inner.lock().await;
            st.is_terminating = true;
        }

        let deadline = self.now() + self.destroy_grace.as_millis() as u64;
        loop {
            if let Err(e) = self.run().await {
                warn!(key = %self.key, error = %e, "teardown run failed");
            }
            let connected = self.inner.lock().await.is_connected;
            if !connected || self.now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut st = self.inner.lock().await;
        let abandoned = st.queue.drain_all();
        if !abandoned.is_empty() {
            warn!(key = %self.key, count = abandoned.len(), "abandoning queued requests at teardown");
        }
        if let Some(sock) = st.socket.take() {
            sock.kill_now();
        }
        st.top_layer.destroy_all();
        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! A [`Connector`] double that hands back a shared
    //! [`crate::socket::testing::FakeSocket`] instead of dialing TCP, so
    //! tests can drive the whole connect/send/receive track without a real
    //! gateway on the network.

    use super::*;
    use crate::socket::testing::FakeSocket;

    #[derive(Debug)]
    pub struct FakeConnector {
        socket: Arc<FakeSocket>,
        pub fail_next_connects: std::sync::atomic::AtomicUsize,
    }

    impl FakeConnector {
        pub fn new() -> Self {
            Self {
                socket: Arc::new(FakeSocket::new()),
                fail_next_connects: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        pub fn socket(&self) -> Arc<FakeSocket> {
            Arc::clone(&self.socket)
        }

        /// Makes the next `n` `connect()` calls fail, to exercise the
        /// retry/backoff track (spec §8 scenario 4).
        pub fn fail_next(&self, n: usize) {
            self.fail_next_connects.store(n, Ordering::Relaxed);
        }
    }

    impl Default for FakeConnector {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Connector for FakeConnector {
        fn connect<'a>(
            &'a self,
            _host: &'a str,
            _port: u16,
            _timeout: Duration,
        ) -> BoxFuture<'a, anyhow::Result<Arc<dyn PlcSocket>>> {
            Box::pin(async move {
                let remaining = self.fail_next_connects.load(Ordering::Relaxed);
                if remaining > 0 {
                    self.fail_next_connects.fetch_sub(1, Ordering::Relaxed);
                    anyhow::bail!("simulated connect failure");
                }
                Ok(Arc::clone(&self.socket) as Arc<dyn PlcSocket>)
            })
        }
    }
}
