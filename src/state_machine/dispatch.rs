// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `dispatch_requests` (spec §4.2): the hub every other state returns to.
//! Priority order matters — termination outranks idle-disconnect, which
//! outranks backoff, which outranks picking up new work.

use crate::{
    error::{PlcResult, RunnerOutcome},
    plc::{Plc, PlcInner, PlcState},
};

pub(super) fn step(plc: &Plc, st: &mut PlcInner) -> PlcResult<RunnerOutcome> {
    let now = plc.clock.now_ms();

    if st.is_terminating {
        st.current_state = if st.is_connected {
            PlcState::StartDisconnect
        } else {
            PlcState::Terminate
        };
        return Ok(RunnerOutcome::Continue);
    }

    if st.is_connected && st.next_idle_timeout_ms <= now {
        st.current_state = PlcState::StartDisconnect;
        return Ok(RunnerOutcome::Continue);
    }

    if st.next_retry_time_ms > now {
        return Ok(RunnerOutcome::Suspend);
    }

    if st.queue.has_pending() {
        st.current_state = if st.is_connected {
            PlcState::ReserveSpaceForRequest
        } else {
            PlcState::StartConnect
        };
        return Ok(RunnerOutcome::Continue);
    }

    Ok(RunnerOutcome::Suspend)
}
