// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Mutex};

use plctag_core::{error::LayerSignal, layer::{Window, families::demo::demo_family}, request::Request};

use crate::integration_tests::common::{encode_demo_response, new_harness, test_config};

#[tokio::test]
async fn single_request_connects_sends_and_demuxes_its_response() {
    let harness = new_harness(1_000);
    let cfg = test_config();
    let plc = harness
        .client
        .get_or_create("gw1", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    // The demo family's connect handshake never touches the wire, so the
    // first thing this PLC ever sends is the request frame itself, tagged
    // with id 1 (the first id the family's tagging layer mints).
    harness.connector.socket().queue_inbound(encode_demo_response(1, b"pong"));

    let received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let received_for_response = Arc::clone(&received);
    let request = Request::new(
        move |window: &mut Window<'_>| {
            window.live_mut()[..4].copy_from_slice(b"ping");
            window.end = window.start + 4;
            Ok(LayerSignal::Ok)
        },
        move |window: &mut Window<'_>| {
            received_for_response.lock().unwrap().extend_from_slice(window.live());
            Ok(())
        },
    );

    harness.client.start_request(&plc, request).await.unwrap();

    assert!(plc.is_connected().await);
    assert_eq!(&*received.lock().unwrap(), b"pong");
    assert_eq!(plc.current_state_name().await, "dispatch_requests");

    let outbound = harness.connector.socket().outbound.lock().unwrap();
    assert_eq!(outbound.len(), 1);
    // 4-byte length prefix + 4-byte id + 4-byte payload.
    assert_eq!(outbound[0].len(), 12);
}
