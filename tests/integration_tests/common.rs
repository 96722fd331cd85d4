// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use plctag_core::{
    cfg::config::Config,
    client::Client,
    clock::{Clock, FakeClock},
    plc::{Connector, testing::FakeConnector},
};

/// A config with a heartbeat interval pushed far out into real wall-clock
/// time. The heartbeat loop ticks on the real `tokio::time::interval`, not on
/// the [`FakeClock`] these tests drive by hand, so it must never fire mid-test
/// regardless of how far the fake clock itself is advanced.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.timing.heartbeat_interval_ms = 3_600_000;
    cfg
}

pub struct Harness {
    pub client: Client,
    pub clock: FakeClock,
    pub connector: Arc<FakeConnector>,
}

pub fn new_harness(start_ms: u64) -> Harness {
    let clock = FakeClock::new(start_ms);
    let connector = Arc::new(FakeConnector::new());
    let client = Client::with_collaborators(
        Arc::new(clock.clone()) as Arc<dyn Clock>,
        Arc::clone(&connector) as Arc<dyn Connector>,
    );
    Harness { client, clock, connector }
}

/// Encodes one demo-family response frame: `[u32 total_len][u32 req_id][payload]`.
pub fn encode_demo_response(req_id: u32, payload: &[u8]) -> Vec<u8> {
    let total_len = 4 + payload.len() as u32;
    let mut out = Vec::with_capacity(4 + total_len as usize);
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(&req_id.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Encodes one batch_demo-family response frame carrying several
/// sub-responses that all share `frame_id`, the way one mint at
/// `reserve_space` tags an entire batch:
/// `[u32 total_len]([u32 id][u32 sub_len][payload])*`.
pub fn encode_batch_response(frame_id: u32, subs: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    for payload in subs {
        body.extend_from_slice(&frame_id.to_le_bytes());
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);
    }
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}
