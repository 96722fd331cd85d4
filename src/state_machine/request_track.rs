// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The request track (spec §4.2, §8 scenario 2): `reserve_space_for_request`
//! → `build_request` → `request_sent` → `response_ready`.
//!
//! `build_request` is where batching lives. The loop claims requests off the
//! pending FIFO one at a time, lets each write its own payload and lets the
//! stack's `build_layer` fold it into the frame; `build_layer` returning
//! `Pending` means the stack still has room and another request should be
//! folded in, `Ok` means the frame is complete and ready to send. A request
//! that doesn't fit is pushed back to the front of the queue for the next
//! cycle rather than dropped.
//!
//! `response_ready` is the mirror image: one socket read can carry several
//! sub-responses back to back, and `process_response` returning `Pending`
//! means "demux this one, then parse the next sub-response already sitting
//! in the buffer" rather than "go read more bytes" — that distinction is
//! `Partial`'s job.

use super::common::{handle_transient_error, refresh_idle_timeout};
use crate::{
    error::{LayerSignal, PlcError, PlcResult, RunnerOutcome},
    layer::Window,
    plc::{Plc, PlcInner, PlcState},
};

pub(super) async fn step(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    match st.current_state {
        PlcState::ReserveSpaceForRequest => reserve_space_for_request(plc, st),
        PlcState::BuildRequest => build_request(plc, st),
        PlcState::RequestSent => request_sent(plc, st).await,
        PlcState::ResponseReady => response_ready(plc, st).await,
        _ => unreachable!("request_track::step only handles request-track states"),
    }
}

fn reserve_space_for_request(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let cap = st.data_capacity;
    let mut window = Window::new(&mut st.buffer, cap);
    let mut req_id = crate::layer::INVALID_REQUEST_ID;

    if let Err(e) = st.top_layer.reserve_space(&mut window, &mut req_id) {
        handle_transient_error(plc, st, &e);
        return Ok(RunnerOutcome::Continue);
    }

    st.payload_start = window.start;
    st.payload_end = window.end;
    st.current_request_id = req_id;
    st.current_state = PlcState::BuildRequest;
    Ok(RunnerOutcome::Continue)
}

/// Folds as many pending requests as the stack allows into one frame.
fn build_request(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let cap = st.data_capacity;
    let ceiling = st.payload_end;
    let mut cursor = st.payload_start;
    let mut req_id = st.current_request_id;

    let mut committed_start = st.payload_start;
    let mut committed_end = st.payload_start;
    let mut built_any = false;

    loop {
        let Some(mut request) = st.queue.claim_next() else {
            if !built_any {
                // Raced with `stop_request` between reserve and build: go
                // back to dispatch without sending anything (spec §4.2,
                // tie-breaks).
                st.current_state = PlcState::DispatchRequests;
                return Ok(RunnerOutcome::Continue);
            }
            break;
        };

        let mut window = Window::new(&mut st.buffer, cap);
        window.start = cursor;
        window.end = ceiling;

        match request.build(&mut window) {
            Err(PlcError::TooSmall) if !built_any => {
                st.queue.push_front(request);
                handle_transient_error(plc, st, &PlcError::TooSmall);
                return Ok(RunnerOutcome::Continue);
            }
            Err(PlcError::TooSmall) => {
                // Doesn't fit in what's left of this frame: keep it for the
                // next cycle and send what's already been built.
                st.queue.push_front(request);
                break;
            }
            Err(e) => {
                st.queue.push_front(request);
                handle_transient_error(plc, st, &e);
                return Ok(RunnerOutcome::Continue);
            }
            Ok(_) => {
                request.req_id = req_id;
                let signal = match st.top_layer.build_layer(&mut window, &mut req_id) {
                    Ok(s) => s,
                    Err(e) => {
                        st.queue.push_front(request);
                        handle_transient_error(plc, st, &e);
                        return Ok(RunnerOutcome::Continue);
                    }
                };

                committed_start = window.start;
                committed_end = window.end;
                cursor = window.end;
                built_any = true;
                st.queue.mark_in_flight(request);

                match signal {
                    LayerSignal::Ok => break,
                    LayerSignal::Pending => continue,
                    _ => {
                        handle_transient_error(
                            plc,
                            st,
                            &PlcError::Layer("unexpected build_layer signal".into()),
                        );
                        return Ok(RunnerOutcome::Continue);
                    }
                }
            }
        }
    }

    st.payload_start = committed_start;
    st.payload_end = committed_end;
    st.current_request_id = req_id;
    st.current_state = PlcState::RequestSent;
    Ok(RunnerOutcome::Continue)
}

async fn request_sent(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
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
    st.current_state = PlcState::ResponseReady;
    Ok(RunnerOutcome::Continue)
}

async fn response_ready(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let Some(sock) = st.socket.clone() else {
        handle_transient_error(plc, st, &PlcError::NullPtr);
        return Ok(RunnerOutcome::Continue);
    };

    let cap = st.data_capacity;
    let mut consumed = st.payload_start;
    let mut filled = st.payload_end;

    loop {
        let mut window = Window::new(&mut st.buffer, cap);
        window.start = consumed;
        window.end = filled;
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
                if filled >= cap {
                    handle_transient_error(plc, st, &PlcError::TooSmall);
                    return Ok(RunnerOutcome::Continue);
                }
                let n = match sock.read(&mut st.buffer[filled..cap]).await {
                    Ok(n) => n,
                    Err(e) => {
                        handle_transient_error(plc, st, &PlcError::BadGateway(e.to_string()));
                        return Ok(RunnerOutcome::Continue);
                    }
                };
                if n == 0 {
                    handle_transient_error(
                        plc,
                        st,
                        &PlcError::BadGateway("connection closed by peer".into()),
                    );
                    return Ok(RunnerOutcome::Continue);
                }
                filled += n;
                continue;
            }
            LayerSignal::Retry => {
                handle_transient_error(
                    plc,
                    st,
                    &PlcError::Layer("unexpected retry signal mid-response".into()),
                );
                return Ok(RunnerOutcome::Continue);
            }
            LayerSignal::Ok | LayerSignal::Pending => {
                match st.queue.peek_front_in_flight_req_id() {
                    Some(head_id) if head_id == req_id => {
                        let mut matched = st.queue.pop_front_in_flight().expect("peeked above");
                        if let Err(e) = matched.on_response(&mut window) {
                            handle_transient_error(plc, st, &e);
                            return Ok(RunnerOutcome::Continue);
                        }
                    }
                    // A mismatch means this response belongs to a request
                    // that's already been aborted — drop it silently and
                    // leave the real head waiting for its own response.
                    _ => {}
                }

                consumed = window.end;

                if signal == LayerSignal::Pending {
                    continue;
                }

                refresh_idle_timeout(plc, st);
                st.payload_start = 0;
                st.payload_end = 0;
                st.current_state = PlcState::DispatchRequests;
                return Ok(RunnerOutcome::Continue);
            }
        }
    }
}
