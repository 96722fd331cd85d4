// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The public surface most callers actually want: get-or-create a PLC by
//! key, submit and cancel requests, read and tune per-PLC settings.
//! Everything here is a thin wrapper over [`crate::registry::Registry`] and
//! [`crate::plc::Plc`] — the interesting behavior lives in those modules and
//! in `state_machine`.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    cfg::config::Config,
    clock::{Clock, SystemClock},
    error::{PlcError, PlcResult},
    gateway::{make_key, parse_gateway},
    layer::stack::LayerStack,
    plc::{Connector, Plc, TcpConnector},
    registry::{PlcHandle, Registry},
    request::{Request, RequestHandle},
};

/// Process-wide entry point. Construct one and hand it to callers;
/// `get_or_create` does the interning.
#[derive(Debug, Clone)]
pub struct Client {
    registry: Registry,
    clock: Arc<dyn Clock>,
    connector: Arc<dyn Connector>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            clock: Arc::new(SystemClock),
            connector: Arc::new(TcpConnector),
        }
    }

    /// Substitutes the clock and connector collaborators — used by tests
    /// that need a [`crate::clock::FakeClock`] or a fake transport instead
    /// of real TCP and wall-clock time.
    pub fn with_collaborators(clock: Arc<dyn Clock>, connector: Arc<dyn Connector>) -> Self {
        Self {
            registry: Registry::new(),
            clock,
            connector,
        }
    }

    /// Looks up `key`, or builds a fresh PLC with `build_layers` and the
    /// timing/buffer settings from `config`. Starts the PLC's heartbeat the
    /// first time it's created.
    pub fn get_or_create(
        &self,
        key: &str,
        host: String,
        port: u16,
        config: &Config,
        build_layers: impl FnOnce() -> LayerStack,
    ) -> PlcResult<PlcHandle> {
        if config.timing.idle_timeout_ms > 5000 {
            return Err(PlcError::OutOfBounds);
        }

        let clock = Arc::clone(&self.clock);
        let connector = Arc::clone(&self.connector);
        let key_owned = key.to_string();
        let host_clone = host.clone();
        let cfg = config.clone();

        let mut created = false;
        let handle = self.registry.get_or_create(key, || {
            created = true;
            Plc::new(
                key_owned,
                host_clone,
                port,
                build_layers(),
                cfg.buffer.initial_capacity,
                cfg.timing.idle_timeout_ms as u64,
                cfg.timing.retry_interval_ms as u64,
                cfg.timing.retry_ceiling_ms as u64,
                clock,
                connector,
                cfg.transport.timeout_connection,
                Duration::from_millis(cfg.timing.destroy_grace_ms as u64),
                Duration::from_millis(cfg.timing.heartbeat_interval_ms as u64),
            )
        });

        if created {
            handle.as_arc().ensure_heartbeat_started();
        }
        Ok(handle)
    }

    /// Looks up or builds a PLC keyed by `family/gateway/path` (spec §3),
    /// parsing `gateway` as `host[:port]` with `default_port` filling in a
    /// bare host (spec §4.1). `path` is the family-specific routing suffix
    /// (e.g. a CIP connection path) — opaque to the core, folded into the
    /// key purely so two different paths through the same gateway intern
    /// distinct PLCs.
    ///
    /// The key is built from the *normalized* `host:port`, not the raw
    /// `gateway` string, so a bare host that resolves to `default_port`
    /// collapses onto the same key as that host given explicitly with its
    /// port.
    pub fn get_or_create_plc(
        &self,
        family: &str,
        gateway: &str,
        path: &str,
        default_port: u16,
        config: &Config,
        build_layers: impl FnOnce() -> LayerStack,
    ) -> PlcResult<PlcHandle> {
        let (host, port) = parse_gateway(gateway, default_port)?;
        let key = make_key(family, &format!("{host}:{port}"), path);
        self.get_or_create(&key, host, port, config, build_layers)
    }

    /// Submits a request against an already-resolved PLC handle.
    pub async fn start_request(&self, plc: &PlcHandle, request: Request) -> PlcResult<RequestHandle> {
        plc.start_request(request).await
    }

    /// Cancels a request by the handle returned from `start_request`.
    pub async fn stop_request(&self, plc: &PlcHandle, handle: RequestHandle) -> PlcResult<()> {
        plc.stop_request(handle).await
    }

    pub fn registry_len(&self) -> usize {
        self.registry.len()
    }

    /// The underlying registry, for callers that need to enumerate or
    /// inspect interned PLCs directly rather than through a `PlcHandle`.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
