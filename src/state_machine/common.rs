// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Helpers shared by every track: the backoff policy and idle-timeout
//! bookkeeping applied the same way regardless of which track hit trouble
//! (spec §4.2 "Tie-breaks", §7 bucket 2).

use tracing::warn;

use crate::{
    error::PlcError,
    plc::{Plc, PlcInner, PlcState},
};

/// Doubles the retry backoff, capped at the ceiling, and schedules the next
/// retry attempt from now (spec §4.2, "Connect or send errors").
pub(super) fn bump_retry_backoff(plc: &Plc, st: &mut PlcInner) {
    st.retry_interval_ms = (st.retry_interval_ms.saturating_mul(2)).min(st.retry_ceiling_ms);
    st.next_retry_time_ms = plc.clock.now_ms() + st.retry_interval_ms;
}

/// Resets backoff to its floor after a connect/request/disconnect cycle
/// completes cleanly.
pub(super) fn reset_retry_backoff(st: &mut PlcInner) {
    st.retry_interval_ms = st.retry_floor_ms;
}

/// Pushes the idle-disconnect deadline out from now (spec §4.2,
/// `dispatch_requests`: "connected and idle timer expired").
pub(super) fn refresh_idle_timeout(plc: &Plc, st: &mut PlcInner) {
    st.next_idle_timeout_ms = plc.clock.now_ms() + st.idle_timeout_ms;
}

/// Applies a transient protocol/transport error (spec §7 bucket 2): log it,
/// back off, and route to `start_disconnect` if a connection is up or
/// straight back to `dispatch_requests` otherwise. The same rule handles a
/// fatal error surfacing *during* a reset — it still only backs off, it
/// never propagates out of the runner.
pub(super) fn handle_transient_error(plc: &Plc, st: &mut PlcInner, err: &PlcError) {
    warn!(
        key = %plc.key,
        state = st.current_state.name(),
        error = %err,
        "transient error, backing off"
    );
    bump_retry_backoff(plc, st);
    st.current_state = if st.is_connected {
        PlcState::StartDisconnect
    } else {
        PlcState::DispatchRequests
    };
}
