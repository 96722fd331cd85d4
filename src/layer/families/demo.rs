// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A minimal two-layer family used for the CLI demo binary and the
//! integration tests: a length-prefix framing layer over a request-id
//! tagging layer. It speaks no real industrial protocol — it exists to
//! exercise the runner, the codec helpers, and the batching contract the
//! way a real family (EtherNet/IP, Modbus TCP, …) would, without pulling in
//! a protocol this crate doesn't implement.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::{
    codec::{get_u32_le, set_u32_le},
    error::{LayerSignal, PlcError, PlcResult},
    layer::{Layer, RequestId, Window, stack::LayerStack},
};

/// Builds the demo family's layer stack, outermost first: framing wraps
/// tagging.
pub fn demo_family() -> LayerStack {
    LayerStack::new(vec![
        Box::new(FramingLayer::default()),
        Box::new(TaggingLayer::default()),
    ])
}

/// Outermost layer: a 4-byte little-endian length prefix around whatever
/// the inner layers produced. `len` counts only the bytes after the
/// prefix itself.
#[derive(Debug, Default)]
struct FramingLayer {
    header_reserved: usize,
}

impl Layer for FramingLayer {
    fn initialize(&mut self) -> PlcResult<()> {
        self.header_reserved = 0;
        Ok(())
    }

    fn connect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal> {
        // The demo family has no real handshake: collapse the window to
        // empty so the runner reads "nothing to send" rather than framing
        // whatever garbage happened to be sitting in the probe-sized buffer.
        window.end = window.start;
        Ok(LayerSignal::Ok)
    }

    fn disconnect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal> {
        window.end = window.start;
        Ok(LayerSignal::Ok)
    }

    fn reserve_space(
        &mut self,
        window: &mut Window<'_>,
        _req_id: &mut RequestId,
    ) -> PlcResult<()> {
        const HEADER_LEN: usize = 4;
        if window.start + HEADER_LEN > window.end {
            return Err(PlcError::TooSmall);
        }
        window.start += HEADER_LEN;
        self.header_reserved = HEADER_LEN;
        Ok(())
    }

    fn build_layer(
        &mut self,
        window: &mut Window<'_>,
        _req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let header_at = window.start - self.header_reserved;
        let body_len = (window.end - window.start) as u32;
        set_u32_le(Some(window.raw_mut()), header_at, window.capacity, body_len)?;
        window.start = header_at;
        Ok(LayerSignal::Ok)
    }

    fn process_response(
        &mut self,
        window: &mut Window<'_>,
        _req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let body_len = get_u32_le(window.live(), 0, window.capacity)? as usize;
        let available = window.end - window.start - 4;
        if available < body_len {
            return Ok(LayerSignal::Partial);
        }
        window.start += 4;
        window.end = window.start + body_len;
        Ok(LayerSignal::Ok)
    }
}

/// Innermost layer: mints the request id during `reserve_space` and carries
/// it as a 4-byte field ahead of the request payload.
#[derive(Debug, Default)]
struct TaggingLayer {
    next_id: AtomicI64,
    header_reserved: usize,
    pending_id: RequestId,
}

impl Layer for TaggingLayer {
    fn initialize(&mut self) -> PlcResult<()> {
        self.next_id.store(1, Ordering::Relaxed);
        self.header_reserved = 0;
        self.pending_id = crate::layer::INVALID_REQUEST_ID;
        Ok(())
    }

    fn connect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal> {
        window.end = window.start;
        Ok(LayerSignal::Ok)
    }

    fn disconnect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal> {
        window.end = window.start;
        Ok(LayerSignal::Ok)
    }

    fn reserve_space(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<()> {
        const TAG_LEN: usize = 4;
        if window.start + TAG_LEN > window.end {
            return Err(PlcError::TooSmall);
        }
        window.start += TAG_LEN;
        self.header_reserved = TAG_LEN;
        let minted = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending_id = minted;
        *req_id = minted;
        Ok(())
    }

    fn build_layer(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let header_at = window.start - self.header_reserved;
        let id = if *req_id == crate::layer::INVALID_REQUEST_ID {
            self.pending_id
        } else {
            *req_id
        };
        set_u32_le(Some(window.raw_mut()), header_at, window.capacity, id as u32)?;
        window.start = header_at;
        Ok(LayerSignal::Ok)
    }

    fn process_response(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let id = get_u32_le(window.live(), 0, window.capacity)?;
        *req_id = id as RequestId;
        window.start += 4;
        Ok(LayerSignal::Ok)
    }

    fn abort_request(&mut self, req_id: RequestId) {
        if self.pending_id == req_id {
            self.pending_id = crate::layer::INVALID_REQUEST_ID;
        }
    }
}
