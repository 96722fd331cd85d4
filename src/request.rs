// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client-visible request objects and the FIFO queue the dispatcher and
//! layers draw from.
//!
//! A request carries an opaque client context plus two callbacks,
//! `build_request`/`process_response`, expressed here as plain closures —
//! a `Box<dyn FnMut>` per callback rather than a context pointer and a bare
//! function pointer travelling together.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    error::{LayerSignal, PlcResult},
    layer::{RequestId, Window},
};

/// Mints the client-facing identity a caller uses to name a request in
/// `stop_request`, independent of the protocol [`RequestId`] minted later by
/// the innermost layer. The two must stay separate: a request sitting in the
/// pending queue has no protocol id yet, but a caller may already want to
/// cancel it.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// The caller's handle on a submitted [`Request`], returned by
/// `Plc::start_request` and accepted by `Plc::stop_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

/// One in-flight (or queued) unit of work against a PLC.
///
/// `req_id` starts at [`crate::layer::INVALID_REQUEST_ID`] and is filled in
/// by the innermost layer's `reserve_space` once the request is accepted
/// into a frame.
pub struct Request {
    client_id: u64,
    pub req_id: RequestId,
    build_request: Box<dyn FnMut(&mut Window<'_>) -> PlcResult<LayerSignal> + Send>,
    process_response: Box<dyn FnMut(&mut Window<'_>) -> PlcResult<()> + Send>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("client_id", &self.client_id)
            .field("req_id", &self.req_id)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn new(
        build_request: impl FnMut(&mut Window<'_>) -> PlcResult<LayerSignal> + Send + 'static,
        process_response: impl FnMut(&mut Window<'_>) -> PlcResult<()> + Send + 'static,
    ) -> Self {
        Self {
            client_id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            req_id: crate::layer::INVALID_REQUEST_ID,
            build_request: Box::new(build_request),
            process_response: Box::new(process_response),
        }
    }

    pub fn handle(&self) -> RequestHandle {
        RequestHandle(self.client_id)
    }

    pub fn build(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal> {
        (self.build_request)(window)
    }

    pub fn on_response(&mut self, window: &mut Window<'_>) -> PlcResult<()> {
        (self.process_response)(window)
    }
}

/// The FIFO of requests waiting to be folded into a frame, plus the set
/// already in flight awaiting a response. Requests move
/// `pending -> in_flight` when a layer's `accept_requests`/`build_layer`
/// claims them, and are removed from `in_flight` once their response is
/// processed or the request is aborted.
///
/// `in_flight` is itself a FIFO, not an id-keyed map: demuxing compares an
/// incoming `req_id` against the *head* of the in-flight list, not against
/// every outstanding request. A mismatch means
/// the response belongs to something already abandoned — it is dropped, and
/// the head stays put, still waiting for its own response.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<Request>,
    in_flight: VecDeque<Request>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: Request) {
        self.pending.push_back(request);
    }

    /// Reinserts a request at the front of the pending queue — used when a
    /// batch-in-progress discovers a request doesn't fit the current frame
    /// and must be retried next cycle instead of dropped.
    pub fn push_front(&mut self, request: Request) {
        self.pending.push_front(request);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_outstanding(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// True if `handle` names a request still pending or in flight, i.e.
    /// `start_request` would be resubmitting something already queued.
    pub fn contains_client(&self, handle: RequestHandle) -> bool {
        self.pending.iter().any(|r| r.client_id == handle.0)
            || self.in_flight.iter().any(|r| r.client_id == handle.0)
    }

    /// Claims the next queued request for batching into the current frame.
    pub fn claim_next(&mut self) -> Option<Request> {
        self.pending.pop_front()
    }

    /// Parks a claimed request as in-flight once its frame has been sent.
    pub fn mark_in_flight(&mut self, request: Request) {
        self.in_flight.push_back(request);
    }

    /// The `req_id` the head of the in-flight FIFO expects its response to
    /// carry, if anything is in flight.
    pub fn peek_front_in_flight_req_id(&self) -> Option<RequestId> {
        self.in_flight.front().map(|r| r.req_id)
    }

    /// Removes and returns the in-flight head. Callers are expected to have
    /// checked [`Self::peek_front_in_flight_req_id`] first.
    pub fn pop_front_in_flight(&mut self) -> Option<Request> {
        self.in_flight.pop_front()
    }

    /// Drops a request (pending or in flight) matching `req_id`, used
    /// internally during teardown. Returns whether anything was removed.
    pub fn abort(&mut self, req_id: RequestId) -> bool {
        if let Some(idx) = self.pending.iter().position(|r| r.req_id == req_id) {
            self.pending.remove(idx);
            return true;
        }
        if let Some(idx) = self.in_flight.iter().position(|r| r.req_id == req_id) {
            self.in_flight.remove(idx);
            return true;
        }
        false
    }

    /// Drops a request (pending or in flight) matching the caller's
    /// [`RequestHandle`], used by `Plc::stop_request`. Returns whether
    /// anything was removed.
    pub fn abort_client(&mut self, handle: RequestHandle) -> bool {
        if let Some(idx) = self.pending.iter().position(|r| r.client_id == handle.0) {
            self.pending.remove(idx);
            return true;
        }
        if let Some(idx) = self.in_flight.iter().position(|r| r.client_id == handle.0) {
            self.in_flight.remove(idx);
            return true;
        }
        false
    }

    /// Drains everything, pending and in-flight alike — used during the
    /// terminating track.
    pub fn drain_all(&mut self) -> Vec<Request> {
        let mut out: Vec<Request> = self.pending.drain(..).collect();
        out.extend(self.in_flight.drain(..));
        out
    }
}
