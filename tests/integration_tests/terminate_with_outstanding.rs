// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use plctag_core::{
    error::LayerSignal,
    layer::{Window, families::demo::demo_family},
    request::Request,
};

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
async fn teardown_drops_the_connection_and_abandons_anything_still_queued() {
    let harness = new_harness(1_000);
    let cfg = test_config();
    let plc = harness
        .client
        .get_or_create("gw-teardown", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    harness.connector.socket().queue_inbound(encode_demo_response(1, b"ok"));
    harness.client.start_request(&plc, ping_request()).await.unwrap();
    assert!(plc.is_connected().await);

    // Left behind without ever being claimed into a frame; teardown must
    // abandon it rather than try to flush it onto the wire.
    let abandoned_called = Arc::new(AtomicBool::new(false));
    let abandoned_called_for_response = Arc::clone(&abandoned_called);
    let abandoned = Request::new(
        |window: &mut Window<'_>| {
            window.live_mut()[..4].copy_from_slice(b"ping");
            window.end = window.start + 4;
            Ok(LayerSignal::Ok)
        },
        move |_window: &mut Window<'_>| {
            abandoned_called_for_response.store(true, Ordering::Relaxed);
            Ok(())
        },
    );
    plc.test_enqueue(abandoned).await;

    plc.teardown().await.unwrap();

    assert!(!plc.is_connected().await);
    // teardown runs dispatch -> start_disconnect -> (disconnect completes,
    // is_connected clears, back to dispatch) -> dispatch sees
    // is_terminating && !is_connected -> terminate, the terminal sink state
    // (spec §4.2); nothing ever drives it back to dispatch_requests.
    assert_eq!(plc.current_state_name().await, "terminate");
    assert!(
        !abandoned_called.load(Ordering::Relaxed),
        "a request still pending at teardown must never be processed"
    );
}
