// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The connect track (spec §4.2): `start_connect` → `build_connect_request`
//! → `connect_request_sent` → `connect_response_ready`.
//!
//! The original design registers a socket-connect callback and a
//! write-complete callback and returns between each; here the mutex is held
//! across the `.await` instead (see `plc.rs`'s module doc comment), so the
//! four states below run as a straight line of direct awaits rather than a
//! chain of re-entries driven by an external callback.

use super::common::{handle_transient_error, refresh_idle_timeout, reset_retry_backoff};
use crate::{
    error::{LayerSignal, PlcError, PlcResult, RunnerOutcome},
    layer::Window,
    plc::{Plc, PlcInner, PlcState},
};

pub(super) async fn step(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    match st.current_state {
        PlcState::StartConnect => start_connect(plc, st).await,
        PlcState::BuildConnectRequest => build_connect_request(plc, st),
        PlcState::ConnectRequestSent => connect_request_sent(plc, st).await,
        PlcState::ConnectResponseReady => connect_response_ready(plc, st).await,
        _ => unreachable!("connect::step only handles connect-track states"),
    }
}

async fn start_connect(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    if st.socket.is_none() {
        match plc.connector.connect(&plc.host, plc.port, plc.connect_timeout).await {
            Ok(sock) => st.socket = Some(sock),
            Err(e) => {
                handle_transient_error(plc, st, &PlcError::BadGateway(e.to_string()));
                return Ok(RunnerOutcome::Continue);
            }
        }
    }

    if let Err(e) = st.top_layer.initialize_all() {
        handle_transient_error(plc, st, &e);
        return Ok(RunnerOutcome::Continue);
    }

    st.payload_start = 0;
    st.payload_end = st.data_capacity;
    st.current_state = PlcState::BuildConnectRequest;
    Ok(RunnerOutcome::Continue)
}

fn build_connect_request(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let cap = st.data_capacity;
    let (start, end) = (st.payload_start, st.payload_end);
    let mut window = Window::new(&mut st.buffer, cap);
    window.start = start;
    window.end = end;

    let signal = match st.top_layer.connect(&mut window) {
        Ok(s) => s,
        Err(e) => {
            handle_transient_error(plc, st, &e);
            return Ok(RunnerOutcome::Continue);
        }
    };

    match signal {
        LayerSignal::Ok if window.start == window.end => {
            // Nothing to send — a family with no real handshake (e.g. the
            // demo family). Skip straight to connected.
            st.is_connected = true;
            reset_retry_backoff(st);
            refresh_idle_timeout(plc, st);
            st.current_state = PlcState::DispatchRequests;
            Ok(RunnerOutcome::Continue)
        }
        LayerSignal::Ok | LayerSignal::Pending => {
            let mut req_id = crate::layer::INVALID_REQUEST_ID;
            if let Err(e) = st.top_layer.build_layer(&mut window, &mut req_id) {
                handle_transient_error(plc, st, &e);
                return Ok(RunnerOutcome::Continue);
            }
            st.payload_start = window.start;
            st.payload_end = window.end;
            st.current_state = PlcState::ConnectRequestSent;
            Ok(RunnerOutcome::Continue)
        }
        _ => {
            handle_transient_error(plc, st, &PlcError::Layer("unexpected connect signal".into()));
            Ok(RunnerOutcome::Continue)
        }
    }
}

async fn connect_request_sent(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let Some(sock) = st.socket.clone() else {
        handle_transient_error(plc, st, &PlcError::NullPtr);
        return Ok(RunnerOutcome::Continue);
    };

    let frame = st.buffer[st.payload_start..st.payload_end].to_vec();
    if let Err(e) = sock.write_all(&frame).await {
        handle_transient_error(plc, st, &PlcError::BadGateway(e.to_string()));
        return Ok(RunnerOutcome::Continue);
    }

    let cap = st.data_capacity;
    let n = match sock.read(&mut st.buffer[..cap]).await {
        Ok(n) => n,
        Err(e) => {
            handle_transient_error(plc, st, &PlcError::BadGateway(e.to_string()));
            return Ok(RunnerOutcome::Continue);
        }
    };
    if n == 0 {
        handle_transient_error(plc, st, &PlcError::BadGateway("connection closed by peer".into()));
        return Ok(RunnerOutcome::Continue);
    }

    st.payload_start = 0;
    st.payload_end = n;
    st.current_state = PlcState::ConnectResponseReady;
    Ok(RunnerOutcome::Continue)
}

async fn connect_response_ready(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let Some(sock) = st.socket.clone() else {
        handle_transient_error(plc, st, &PlcError::NullPtr);
        return Ok(RunnerOutcome::Continue);
    };

    let cap = st.data_capacity;
    let (start, end) = (st.payload_start, st.payload_end);
    let mut window = Window::new(&mut st.buffer, cap);
    window.start = start;
    window.end = end;
    let mut req_id = crate::layer::INVALID_REQUEST_ID;

    let signal = match st.top_layer.process_response(&mut window, &mut req_id) {
        Ok(s) => s,
        Err(e) => {
            handle_transient_error(plc, st, &e);
            return Ok(RunnerOutcome::Continue);
        }
    };

    match signal {
        LayerSignal::Partial => {
            st.payload_start = window.start;
            st.payload_end = window.end;
            let read_start = st.payload_end;
            if read_start >= cap {
                handle_transient_error(plc, st, &PlcError::TooSmall);
                return Ok(RunnerOutcome::Continue);
            }
            let n = match sock.read(&mut st.buffer[read_start..cap]).await {
                Ok(n) => n,
                Err(e) => {
                    handle_transient_error(plc, st, &PlcError::BadGateway(e.to_string()));
                    return Ok(RunnerOutcome::Continue);
                }
            };
            if n == 0 {
                handle_transient_error(plc, st, &PlcError::BadGateway("connection closed by peer".into()));
                return Ok(RunnerOutcome::Continue);
            }
            st.payload_end = read_start + n;
            Ok(RunnerOutcome::Continue)
        }
        LayerSignal::Retry => {
            st.current_state = PlcState::BuildConnectRequest;
            Ok(RunnerOutcome::Continue)
        }
        LayerSignal::Ok | LayerSignal::Pending => {
            st.is_connected = true;
            reset_retry_backoff(st);
            refresh_idle_timeout(plc, st);
            st.current_state = PlcState::DispatchRequests;
            Ok(RunnerOutcome::Continue)
        }
    }
}
