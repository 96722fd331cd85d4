// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The layer capability contract (spec §4.3) and the ordered stack that
//! chains layers together for one PLC family.
//!
//! The C heritage of this design is a context pointer plus a vtable per
//! layer, with a cyclic layer→PLC back-reference so a layer's timer/socket
//! callback could re-enter the core. In this rewrite the runner (not any
//! layer) owns the socket and the timer, so no layer ever needs to call back
//! into the PLC — layers only transform the shared byte window they are
//! handed. That removes the cyclic-reference problem the design notes flag
//! in §9 without needing arena-style indexing: there is simply nothing for a
//! layer to hold a handle to.
//!
//! `Layer` is an object-safe trait (a "sum type over known layer variants"
//! per §9 would also satisfy the contract; this crate uses the trait-object
//! form so a family builder can mix layer implementations from different
//! modules without a shared enum).

pub mod families;
pub mod stack;

use std::fmt::Debug;

use crate::error::{LayerSignal, PlcResult};

/// Core-internal monotonic token minted by the innermost layer during
/// `reserve_space`. `INVALID` is never a real id.
pub type RequestId = i64;

/// Sentinel for "no request id assigned yet".
pub const INVALID_REQUEST_ID: RequestId = -1;

/// The buffer window layers build into and parse out of (spec §3, "Buffer
/// window"). `start`/`end` delimit the live window within `bytes`;
/// `capacity` is the hard ceiling `end` may never cross.
///
/// Layers narrow `start`/`end` inward when stripping/reserving their own
/// framing and hand the narrowed window to the next layer in the chain.
///
/// `end` has two lives in one field: before content exists it's the
/// capacity-probe ceiling (`Window::new` sets it from `capacity`); once a
/// request has written its payload, `end` shrinks to `start + bytes_written`
/// so `build_layer` can recover an exact length by subtracting `start` from
/// `end`, the same way `process_response` recovers it from a length prefix
/// on the way in.
#[derive(Debug)]
pub struct Window<'a> {
    bytes: &'a mut [u8],
    pub start: usize,
    pub end: usize,
    pub capacity: usize,
}

impl<'a> Window<'a> {
    pub fn new(bytes: &'a mut [u8], capacity: usize) -> Self {
        let end = bytes.len().min(capacity);
        Self {
            bytes,
            start: 0,
            end,
            capacity,
        }
    }

    /// The live slice between `start` and `end`.
    pub fn live(&self) -> &[u8] {
        &self.bytes[self.start..self.end]
    }

    /// The live slice between `start` and `end`, mutable.
    pub fn live_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.start..self.end]
    }

    /// The full backing buffer, for layers that need to write ahead of
    /// `start` (a header) or past `end` (a trailer) before narrowing the
    /// window onto their own framing.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    pub fn is_sane(&self) -> bool {
        self.start <= self.end && self.end <= self.capacity && self.end <= self.bytes.len()
    }
}

/// The eleven-operation capability contract every layer implements (spec
/// §4.3). Each operation recursively delegates to the next layer after
/// doing its own work; the topmost layer's `build_layer`/`process_response`
/// drives the whole stack, which is why [`stack::LayerStack`] only calls the
/// first element directly and lets each layer call `next` itself via the
/// stack's `call_*` helpers.
pub trait Layer: Debug + Send {
    /// Reset all per-connection state (called recursively by `Plc::reset`).
    fn initialize(&mut self) -> PlcResult<()>;

    /// Emit the next connect-handshake frame into `window`.
    fn connect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal>;

    /// Symmetric to `connect`.
    fn disconnect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal>;

    /// Shrink `window` past this layer's header/trailer and, at the
    /// innermost layer, mint a fresh request id into `req_id`.
    fn reserve_space(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<()>;

    /// Optional batching hook: claim requests from the FIFO ahead of
    /// `build_request`. Most layers are transparent to batching and accept
    /// the default no-op.
    fn accept_requests(&mut self, _requests: &mut crate::request::RequestQueue) -> PlcResult<()> {
        Ok(())
    }

    /// Forget a request this layer may have staged internally. Infallible by
    /// contract — a layer that never staged anything just does nothing.
    fn abort_request(&mut self, _req_id: RequestId) {}

    /// Fill in this layer's headers/trailers once inner content is known.
    /// `Ok(LayerSignal::Ok)` declares the frame complete (send now);
    /// `Ok(LayerSignal::Pending)` permits more batching.
    fn build_layer(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal>;

    /// Strip this layer's framing from received bytes.
    fn process_response(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal>;

    /// Release any layer-owned resources ahead of the layer being dropped.
    fn destroy_layer(&mut self) {}
}
