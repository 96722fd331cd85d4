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
async fn repeated_connect_failures_double_the_backoff_up_to_the_ceiling() {
    let harness = new_harness(1_000);
    let cfg = test_config();
    let plc = harness
        .client
        .get_or_create("gw-backoff", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    harness.connector.fail_next(3);
    harness.client.start_request(&plc, ping_request()).await.unwrap();
    assert!(!plc.is_connected().await);
    assert_eq!(plc.retry_interval_ms().await, 2000);

    harness.clock.advance(2000);
    plc.run().await.unwrap();
    assert!(!plc.is_connected().await);
    assert_eq!(plc.retry_interval_ms().await, 4000);

    harness.clock.advance(4000);
    plc.run().await.unwrap();
    assert!(!plc.is_connected().await);
    assert_eq!(plc.retry_interval_ms().await, 8000);

    // The fourth attempt is the one `fail_next(3)` lets through.
    harness.connector.socket().queue_inbound(encode_demo_response(1, b"ok"));
    harness.clock.advance(8000);
    plc.run().await.unwrap();

    assert!(plc.is_connected().await);
    assert_eq!(
        plc.retry_interval_ms().await,
        1000,
        "a clean connect resets backoff to the configured floor"
    );
}

#[tokio::test]
async fn backoff_never_exceeds_the_configured_ceiling() {
    let harness = new_harness(1_000);
    let mut cfg = test_config();
    cfg.timing.retry_ceiling_ms = 3000;
    let plc = harness
        .client
        .get_or_create("gw-backoff-ceiling", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    harness.connector.fail_next(10);
    harness.client.start_request(&plc, ping_request()).await.unwrap();
    assert_eq!(plc.retry_interval_ms().await, 2000);

    harness.clock.advance(2000);
    plc.run().await.unwrap();
    assert_eq!(plc.retry_interval_ms().await, 3000, "doubling 2000 would overshoot the 3000 ceiling");

    harness.clock.advance(3000);
    plc.run().await.unwrap();
    assert_eq!(plc.retry_interval_ms().await, 3000);
}
