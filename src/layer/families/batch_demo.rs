// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A batching variant of [`super::demo`]: the same length-prefix-over-id
//! shape, except the outer layer folds up to [`BatchFramingLayer::MAX_BATCH`]
//! requests into one frame before sending, and the inner layer tags each
//! request individually so several responses packed into one read can be
//! demuxed back out in order (spec §8 scenario 2).
//!
//! Wire shape per frame: `[u32 total_len][ (sub-response)* ]`, where each
//! sub-response is `[u32 req_id][u32 sub_len][sub_len bytes payload]`. The
//! shared `req_id` a frame's requests carry comes from one mint at
//! `reserve_space` — demuxing relies on in-flight FIFO order (see
//! `crate::request::RequestQueue`), not on the id being unique per request,
//! matching how the dispatcher only ever compares against the head of the
//! in-flight list.
//!
//! Unlike `demo`'s tagging layer, which reserves its header up front during
//! `reserve_space`, this family's request-building closures are expected to
//! leave 8 bytes of room before their own payload (for the id + sub-length)
//! — `BatchTaggingLayer::HEADER_LEN` documents the convention a caller must
//! follow.

use crate::{
    codec::{get_u32_le, set_u32_le},
    error::{LayerSignal, PlcError, PlcResult},
    layer::{Layer, RequestId, Window, stack::LayerStack},
};

pub fn batch_demo_family() -> LayerStack {
    LayerStack::new(vec![
        Box::new(BatchFramingLayer::default()),
        Box::new(BatchTaggingLayer::default()),
    ])
}

/// Outermost layer: one 4-byte length prefix around however many requests
/// got folded in, plus the batching decision itself.
#[derive(Debug)]
struct BatchFramingLayer {
    header_at: usize,
    header_reserved: usize,
    count: usize,
    body_end: usize,
    header_consumed: bool,
}

impl BatchFramingLayer {
    const MAX_BATCH: usize = 3;
}

impl Default for BatchFramingLayer {
    fn default() -> Self {
        Self {
            header_at: 0,
            header_reserved: 0,
            count: 0,
            body_end: 0,
            header_consumed: false,
        }
    }
}

impl Layer for BatchFramingLayer {
    fn initialize(&mut self) -> PlcResult<()> {
        *self = Self::default();
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
        _req_id: &mut RequestId,
    ) -> PlcResult<()> {
        const HEADER_LEN: usize = 4;
        if window.start + HEADER_LEN > window.end {
            return Err(PlcError::TooSmall);
        }
        self.header_at = window.start;
        self.header_reserved = HEADER_LEN;
        self.count = 0;
        window.start += HEADER_LEN;
        Ok(())
    }

    fn build_layer(
        &mut self,
        window: &mut Window<'_>,
        _req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        self.count += 1;
        let body_len = (window.end - (self.header_at + self.header_reserved)) as u32;
        set_u32_le(Some(window.raw_mut()), self.header_at, window.capacity, body_len)?;

        if self.count >= Self::MAX_BATCH {
            window.start = self.header_at;
            self.count = 0;
            Ok(LayerSignal::Ok)
        } else {
            Ok(LayerSignal::Pending)
        }
    }

    fn process_response(
        &mut self,
        window: &mut Window<'_>,
        _req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        // A fresh socket read always starts a frame's body at offset 0
        // (`response_ready` resets the cursor there); anything else is a
        // continuation mid-batch, in which case the header was already
        // consumed and only needs to be re-applied as the ceiling.
        if window.start == 0 {
            self.header_consumed = false;
        }

        if !self.header_consumed {
            if window.end - window.start < 4 {
                return Ok(LayerSignal::Partial);
            }
            let total_len = get_u32_le(window.live(), 0, window.capacity)? as usize;
            let available = window.end - window.start - 4;
            if available < total_len {
                return Ok(LayerSignal::Partial);
            }
            window.start += 4;
            self.body_end = window.start + total_len;
            self.header_consumed = true;
        }

        window.end = self.body_end;
        Ok(LayerSignal::Ok)
    }
}

/// Innermost layer: mints the frame's shared id at `reserve_space`, tags
/// each request with `[id][sub_len]` ahead of its payload at `build_layer`,
/// and demuxes the matching `[id][sub_len]` prefix off each sub-response at
/// `process_response`.
#[derive(Debug, Default)]
struct BatchTaggingLayer {
    next_id: i64,
}

impl BatchTaggingLayer {
    /// Bytes a request-building closure must reserve ahead of its own
    /// payload: 4 for the shared id, 4 for this sub-response's length.
    pub const HEADER_LEN: usize = 8;
}

impl Layer for BatchTaggingLayer {
    fn initialize(&mut self) -> PlcResult<()> {
        self.next_id = 1;
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
        _window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<()> {
        let minted = self.next_id;
        self.next_id += 1;
        *req_id = minted;
        Ok(())
    }

    fn build_layer(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let header_at = window
            .start
            .checked_sub(Self::HEADER_LEN)
            .ok_or(PlcError::OutOfBounds)?;
        let sub_len = (window.end - window.start) as u32;
        set_u32_le(Some(window.raw_mut()), header_at, window.capacity, *req_id as u32)?;
        set_u32_le(Some(window.raw_mut()), header_at + 4, window.capacity, sub_len)?;
        window.start = header_at;
        Ok(LayerSignal::Ok)
    }

    fn process_response(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let start = window.start;
        let body_end = window.end;
        if body_end < start + Self::HEADER_LEN {
            return Ok(LayerSignal::Partial);
        }

        let id = get_u32_le(window.raw_mut(), start, window.capacity)?;
        let sub_len = get_u32_le(window.raw_mut(), start + 4, window.capacity)? as usize;
        *req_id = id as RequestId;

        let payload_start = start + Self::HEADER_LEN;
        let payload_end = payload_start + sub_len;
        if payload_end > body_end {
            return Err(PlcError::OutOfBounds);
        }

        window.start = payload_start;
        window.end = payload_end;

        if payload_end < body_end {
            Ok(LayerSignal::Pending)
        } else {
            Ok(LayerSignal::Ok)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sub_response(buf: &mut [u8], offset: usize, id: u32, payload: &[u8]) -> usize {
        set_u32_le(Some(buf), offset, buf.len(), id).unwrap();
        set_u32_le(Some(buf), offset + 4, buf.len(), payload.len() as u32).unwrap();
        let payload_at = offset + 8;
        buf[payload_at..payload_at + payload.len()].copy_from_slice(payload);
        payload_at + payload.len()
    }

    #[test]
    fn reserve_space_mints_a_shared_frame_id() {
        let mut stack = batch_demo_family();
        stack.initialize_all().unwrap();
        let mut buf = [0u8; 128];
        let mut window = Window::new(&mut buf, 128);
        let mut req_id = crate::layer::INVALID_REQUEST_ID;
        stack.reserve_space(&mut window, &mut req_id).unwrap();
        assert_ne!(req_id, crate::layer::INVALID_REQUEST_ID);
    }

    #[test]
    fn three_requests_batch_into_one_frame_then_signal_ok() {
        let mut stack = batch_demo_family();
        stack.initialize_all().unwrap();
        let mut buf = [0u8; 128];
        let mut window = Window::new(&mut buf, 128);
        let mut req_id = crate::layer::INVALID_REQUEST_ID;
        stack.reserve_space(&mut window, &mut req_id).unwrap();

        let mut cursor = window.start;
        let ceiling = window.end;
        let mut last_signal = LayerSignal::Pending;
        for i in 0..3u8 {
            let mut w = Window::new(&mut buf, 128);
            w.start = cursor + BatchTaggingLayer::HEADER_LEN;
            w.end = ceiling;
            w.live_mut()[..1].copy_from_slice(&[i]);
            w.end = w.start + 1;
            last_signal = stack.build_layer(&mut w, &mut req_id).unwrap();
            cursor = w.end;
        }
        assert_eq!(last_signal, LayerSignal::Ok);
    }

    #[test]
    fn process_response_demuxes_three_sub_responses_in_order() {
        let mut stack = batch_demo_family();
        stack.initialize_all().unwrap();
        let mut buf = [0u8; 128];

        let mut offset = 4; // leave room for the outer length prefix
        offset = write_sub_response(&mut buf, offset, 1, &[10]);
        offset = write_sub_response(&mut buf, offset, 2, &[20, 21]);
        let body_end = write_sub_response(&mut buf, offset, 3, &[30, 31, 32]);
        let total_len = (body_end - 4) as u32;
        set_u32_le(Some(&mut buf), 0, 128, total_len).unwrap();

        let mut window = Window::new(&mut buf, 128);
        window.start = 0;
        window.end = body_end;

        let mut seen = Vec::new();
        loop {
            let mut req_id = crate::layer::INVALID_REQUEST_ID;
            let signal = stack.process_response(&mut window, &mut req_id).unwrap();
            seen.push((req_id, window.live().to_vec()));
            if signal == LayerSignal::Ok {
                break;
            }
            window.start = window.end;
            window.end = body_end;
        }

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[0].1, vec![10]);
        assert_eq!(seen[1].0, 2);
        assert_eq!(seen[1].1, vec![20, 21]);
        assert_eq!(seen[2].0, 3);
        assert_eq!(seen[2].1, vec![30, 31, 32]);
    }
}
