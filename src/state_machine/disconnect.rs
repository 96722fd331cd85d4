// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The disconnect track (spec §4.2): symmetric to `connect`, but always ends
//! with the socket closed and `is_connected` cleared, whatever the layers
//! reported — a PLC that failed to negotiate a clean goodbye still counts
//! as disconnected.

use super::common::handle_transient_error;
use crate::{
    error::{LayerSignal, PlcResult, RunnerOutcome},
    layer::Window,
    plc::{Plc, PlcInner, PlcState},
};

pub(super) async fn step(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    match st.current_state {
        PlcState::StartDisconnect => start_disconnect(plc, st),
        PlcState::BuildDisconnectRequest => build_disconnect_request(plc, st),
        PlcState::DisconnectRequestSent => disconnect_request_sent(plc, st).await,
        PlcState::DisconnectResponseReady => disconnect_response_ready(plc, st).await,
        _ => unreachable!("disconnect::step only handles disconnect-track states"),
    }
}

fn start_disconnect(_plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    if st.socket.is_none() {
        finish(st);
        return Ok(RunnerOutcome::Continue);
    }
    st.payload_start = 0;
    st.payload_end = st.data_capacity;
    st.current_state = PlcState::BuildDisconnectRequest;
    Ok(RunnerOutcome::Continue)
}

fn build_disconnect_request(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let cap = st.data_capacity;
    let (start, end) = (st.payload_start, st.payload_end);
    let mut window = Window::new(&mut st.buffer, cap);
    window.start = start;
    window.end = end;

    let signal = match st.top_layer.disconnect(&mut window) {
        Ok(s) => s,
        Err(e) => {
            handle_transient_error(plc, st, &e);
            finish(st);
            return Ok(RunnerOutcome::Continue);
        }
    };

    if signal == LayerSignal::Ok && window.start == window.end {
        finish(st);
        return Ok(RunnerOutcome::Continue);
    }

    let mut req_id = crate::layer::INVALID_REQUEST_ID;
    if let Err(e) = st.top_layer.build_layer(&mut window, &mut req_id) {
        handle_transient_error(plc, st, &e);
        finish(st);
        return Ok(RunnerOutcome::Continue);
    }
    st.payload_start = window.start;
    st.payload_end = window.end;
    st.current_state = PlcState::DisconnectRequestSent;
    Ok(RunnerOutcome::Continue)
}

async fn disconnect_request_sent(_plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let Some(sock) = st.socket.clone() else {
        finish(st);
        return Ok(RunnerOutcome::Continue);
    };

    let frame = st.buffer[st.payload_start..st.payload_end].to_vec();
    if sock.write_all(&frame).await.is_err() {
        finish(st);
        return Ok(RunnerOutcome::Continue);
    }

    let cap = st.data_capacity;
    let n = match sock.read(&mut st.buffer[..cap]).await {
        Ok(n) => n,
        Err(_) => {
            finish(st);
            return Ok(RunnerOutcome::Continue);
        }
    };
    if n == 0 {
        finish(st);
        return Ok(RunnerOutcome::Continue);
    }

    st.payload_start = 0;
    st.payload_end = n;
    st.current_state = PlcState::DisconnectResponseReady;
    Ok(RunnerOutcome::Continue)
}

async fn disconnect_response_ready(_plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let cap = st.data_capacity;
    let (start, end) = (st.payload_start, st.payload_end);
    let mut window = Window::new(&mut st.buffer, cap);
    window.start = start;
    window.end = end;
    let mut req_id = crate::layer::INVALID_REQUEST_ID;

    // Whatever the layers report — Ok, Pending, or an error swallowed below —
    // a disconnect handshake only ever gets one round trip here. The goal is
    // to release the socket, not to negotiate; an uncooperative peer doesn't
    // get to keep the connection machine stuck.
    let _ = st.top_layer.process_response(&mut window, &mut req_id);
    finish(st);
    Ok(RunnerOutcome::Continue)
}

fn finish(st: &mut PlcInner) {
    if let Some(sock) = st.socket.take() {
        sock.kill_now();
    }
    st.is_connected = false;
    st.current_state = PlcState::DispatchRequests;
}
