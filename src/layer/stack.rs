// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! An ordered chain of [`Layer`]s, outermost first (spec §3: "stack of
//! layers", §4.3 recursive delegation).
//!
//! The original C design lets a family register any number of layers at
//! init time (`set_number_of_layers`/`set_layer`). Here a family builder
//! returns a `Vec<Box<dyn Layer>>` and `LayerStack` owns the iteration
//! order; nothing below this module needs to know how many layers a family
//! has.

use crate::{
    error::{LayerSignal, PlcResult},
    layer::{Layer, RequestId, Window},
    request::RequestQueue,
};

#[derive(Debug)]
pub struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
}

impl LayerStack {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        Self { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn initialize_all(&mut self) -> PlcResult<()> {
        for layer in &mut self.layers {
            layer.initialize()?;
        }
        Ok(())
    }

    /// Drives `connect` outermost-first; the first layer not reporting
    /// `Ok` stops the sweep (its handshake step isn't finished yet).
    pub fn connect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal> {
        for layer in &mut self.layers {
            let signal = layer.connect(window)?;
            if signal != LayerSignal::Ok {
                return Ok(signal);
            }
        }
        Ok(LayerSignal::Ok)
    }

    pub fn disconnect(&mut self, window: &mut Window<'_>) -> PlcResult<LayerSignal> {
        for layer in &mut self.layers {
            let signal = layer.disconnect(window)?;
            if signal != LayerSignal::Ok {
                return Ok(signal);
            }
        }
        Ok(LayerSignal::Ok)
    }

    /// Narrows `window` through every layer and mints a request id from the
    /// innermost one.
    pub fn reserve_space(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<()> {
        for layer in &mut self.layers {
            layer.reserve_space(window, req_id)?;
        }
        Ok(())
    }

    pub fn accept_requests(&mut self, requests: &mut RequestQueue) -> PlcResult<()> {
        for layer in &mut self.layers {
            layer.accept_requests(requests)?;
        }
        Ok(())
    }

    pub fn abort_request(&mut self, req_id: RequestId) {
        for layer in &mut self.layers {
            layer.abort_request(req_id);
        }
    }

    /// Builds innermost-first (reverse of `connect`/`process_response`) so
    /// outer layers finalize their framing last, once the content they're
    /// wrapping is already final.
    pub fn build_layer(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let mut last = LayerSignal::Ok;
        for layer in self.layers.iter_mut().rev() {
            last = layer.build_layer(window, req_id)?;
        }
        Ok(last)
    }

    /// Strips framing innermost-first (wire order), then lets outer layers
    /// see the progressively unwrapped window.
    pub fn process_response(
        &mut self,
        window: &mut Window<'_>,
        req_id: &mut RequestId,
    ) -> PlcResult<LayerSignal> {
        let mut last = LayerSignal::Ok;
        for layer in &mut self.layers {
            last = layer.process_response(window, req_id)?;
            if last != LayerSignal::Ok {
                return Ok(last);
            }
        }
        Ok(last)
    }

    pub fn destroy_all(&mut self) {
        for layer in &mut self.layers {
            layer.destroy_layer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::families::demo::demo_family;

    #[test]
    fn empty_stack_signals_ok_everywhere() {
        let mut stack = LayerStack::new(Vec::new());
        let mut buf = [0u8; 16];
        let mut window = Window::new(&mut buf, 16);
        assert_eq!(stack.connect(&mut window).unwrap(), LayerSignal::Ok);
    }

    #[test]
    fn demo_family_stack_round_trips_a_frame() {
        let mut stack = demo_family();
        stack.initialize_all().unwrap();
        let mut buf = [0u8; 64];
        let mut window = Window::new(&mut buf, 64);
        let mut req_id = crate::layer::INVALID_REQUEST_ID;
        stack.reserve_space(&mut window, &mut req_id).unwrap();
        assert_ne!(req_id, crate::layer::INVALID_REQUEST_ID);
    }
}
