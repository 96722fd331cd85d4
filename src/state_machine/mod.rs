// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The dispatcher (spec §2, §4.2): the 14-state runner that drives one PLC
//! from idle through connect, request, and disconnect tracks.
//!
//! The original design is a table of states, each registering exactly one
//! callback (socket connect, timer fire, write complete, read complete) and
//! returning `SUSPEND`; the callback re-enters the table at the next state
//! when it fires. This rewrite collapses "register a callback and return"
//! into "await the operation in place" (see `plc.rs`'s module doc comment
//! for why that's sound under the PLC's own mutex), so `RunnerOutcome`
//! degenerates to two cases: `Continue` (fall straight into the next state,
//! the way the original falls through a table row with no real I/O) and
//! `Suspend` (nothing left to do until the next heartbeat tick or
//! `start_request` call).
//!
//! Each track lives in its own module so the states that belong together
//! read together: [`dispatch`] is the hub every track returns to,
//! [`connect`] and [`disconnect`] are mirror images of each other, and
//! [`request_track`] carries the one track with real batching logic.

mod common;
mod connect;
mod disconnect;
mod dispatch;
mod request_track;

use crate::{
    error::{PlcResult, RunnerOutcome},
    plc::{Plc, PlcInner, PlcState},
};

/// Runs the dispatcher to its next suspension point. Any error that escapes
/// a track handler (none should, by contract — every track converts its own
/// failures into a backoff transition) is treated the same way: logged,
/// backed off, and swallowed, so a bug in one track can never propagate out
/// of `Plc::run` and poison the caller (spec §7: the runner itself never
/// crashes a PLC out from under its caller).
pub(crate) async fn run_locked(plc: &Plc, st: &mut PlcInner) -> PlcResult<()> {
    loop {
        match step(plc, st).await {
            Ok(RunnerOutcome::Continue) => continue,
            Ok(RunnerOutcome::Suspend) => return Ok(()),
            Err(e) => {
                common::handle_transient_error(plc, st, &e);
                return Ok(());
            }
        }
    }
}

async fn step(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    match st.current_state {
        PlcState::DispatchRequests => dispatch::step(plc, st),
        PlcState::Terminate => Ok(RunnerOutcome::Suspend),
        PlcState::StartConnect
        | PlcState::BuildConnectRequest
        | PlcState::ConnectRequestSent
        | PlcState::ConnectResponseReady => connect::step(plc, st).await,
        PlcState::ReserveSpaceForRequest
        | PlcState::BuildRequest
        | PlcState::RequestSent
        | PlcState::ResponseReady => request_track::step(plc, st).await,
        PlcState::StartDisconnect
        | PlcState::BuildDisconnectRequest
        | PlcState::DisconnectRequestSent
        | PlcState::DisconnectResponseReady => disconnect::step(plc, st).await,
    }
}
