// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use plctag_core::{error::LayerSignal, layer::{Window, families::demo::demo_family}, request::Request};

use crate::integration_tests::common::{encode_demo_response, new_harness, test_config};

fn ping_request() -> Request {
    Request::new(
        |window: &mut Window<'_>| {
            window.live_mut()[..4].copy_from_slice(b"ping");
            window.end = window.start + 4;
            Ok(LayerSignal::Ok)
        },
        |_window: &mut Window<'_>| Ok(()),
    )
}

#[tokio::test]
async fn connection_idles_out_once_the_timeout_elapses_with_no_new_work() {
    let harness = new_harness(1_000);
    let mut cfg = test_config();
    cfg.timing.idle_timeout_ms = 2000;
    let plc = harness
        .client
        .get_or_create("gw-idle", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    harness.connector.socket().queue_inbound(encode_demo_response(1, b"ok"));
    harness.client.start_request(&plc, ping_request()).await.unwrap();
    assert!(plc.is_connected().await);

    // Nothing else happens on the wire for the rest of this test: the
    // disconnect track for the demo family never touches the socket (its
    // `disconnect()` collapses the handshake window to empty), so a second
    // queued inbound frame would just be evidence of a bug, not something
    // this test needs to supply.
    harness.clock.advance(2001);
    plc.run().await.unwrap();

    assert!(!plc.is_connected().await);
    assert_eq!(plc.current_state_name().await, "dispatch_requests");
}

#[tokio::test]
async fn activity_before_the_deadline_keeps_the_connection_up() {
    let harness = new_harness(1_000);
    let mut cfg = test_config();
    cfg.timing.idle_timeout_ms = 2000;
    let plc = harness
        .client
        .get_or_create("gw-idle-2", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    harness.connector.socket().queue_inbound(encode_demo_response(1, b"ok"));
    harness.client.start_request(&plc, ping_request()).await.unwrap();

    harness.clock.advance(1500);
    // Still inside the idle window: a heartbeat tick here must not tear the
    // connection down.
    plc.run().await.unwrap();
    assert!(plc.is_connected().await);

    harness.connector.socket().queue_inbound(encode_demo_response(2, b"ok"));
    harness.client.start_request(&plc, ping_request()).await.unwrap();

    // The second request pushed the deadline out again; 1500ms further on
    // (3000ms after the first request, only 1500ms after the second) the
    // connection must still be up.
    harness.clock.advance(1500);
    plc.run().await.unwrap();
    assert!(plc.is_connected().await);
}
