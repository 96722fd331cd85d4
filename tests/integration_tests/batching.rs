// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Mutex};

use plctag_core::{
    error::LayerSignal,
    layer::{Window, families::batch_demo::batch_demo_family},
    request::Request,
};

use crate::integration_tests::common::{encode_batch_response, new_harness, test_config};

fn make_request(byte: u8, responses: Arc<Mutex<Vec<Vec<u8>>>>) -> Request {
    Request::new(
        move |window: &mut Window<'_>| {
            // batch_demo's tagging layer expects 8 bytes of room ahead of the
            // payload for its own `[id][sub_len]` header.
            window.start += 8;
            window.live_mut()[..1].copy_from_slice(&[byte]);
            window.end = window.start + 1;
            Ok(LayerSignal::Ok)
        },
        move |window: &mut Window<'_>| {
            responses.lock().unwrap().push(window.live().to_vec());
            Ok(())
        },
    )
}

#[tokio::test]
async fn three_requests_queued_ahead_of_the_runner_fold_into_one_frame() {
    let harness = new_harness(1_000);
    let cfg = test_config();
    let plc = harness
        .client
        .get_or_create("gw-batch", "127.0.0.1".into(), 9999, &cfg, batch_demo_family)
        .unwrap();

    harness
        .connector
        .socket()
        .queue_inbound(encode_batch_response(1, &[&[10], &[20, 21], &[30, 31, 32]]));

    let responses: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

    // Three client threads racing ahead of a slow runner would all land in
    // the pending FIFO before the runner next looks at it. `test_enqueue`
    // reproduces that ordering deterministically instead of hoping three
    // concurrent `start_request` calls happen to interleave.
    plc.test_enqueue(make_request(10, Arc::clone(&responses))).await;
    plc.test_enqueue(make_request(20, Arc::clone(&responses))).await;
    plc.test_enqueue(make_request(30, Arc::clone(&responses))).await;

    plc.run().await.unwrap();

    let outbound = harness.connector.socket().outbound.lock().unwrap();
    assert_eq!(outbound.len(), 1, "all three requests must share one wire frame");

    let seen = responses.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], vec![10]);
    assert_eq!(seen[1], vec![20, 21]);
    assert_eq!(seen[2], vec![30, 31, 32]);
}

#[tokio::test]
async fn a_fourth_request_queued_later_waits_for_the_next_frame() {
    let harness = new_harness(1_000);
    let cfg = test_config();
    let plc = harness
        .client
        .get_or_create("gw-batch-overflow", "127.0.0.1".into(), 9999, &cfg, batch_demo_family)
        .unwrap();

    harness
        .connector
        .socket()
        .queue_inbound(encode_batch_response(1, &[&[1], &[2], &[3]]));
    harness
        .connector
        .socket()
        .queue_inbound(encode_batch_response(2, &[&[4]]));

    let responses: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    for byte in [1u8, 2, 3, 4] {
        plc.test_enqueue(make_request(byte, Arc::clone(&responses))).await;
    }

    // A single `run()` drains the dispatcher to its next suspension point,
    // which isn't reached until the pending FIFO is empty: the fourth
    // request doesn't fit the first (full) batch, so the framing layer
    // closes that frame at three and the dispatcher loops straight back
    // into `reserve_space_for_request` for a second, smaller frame rather
    // than waiting for a future call to pick it up.
    plc.run().await.unwrap();

    let outbound = harness.connector.socket().outbound.lock().unwrap();
    assert_eq!(outbound.len(), 2, "the fourth request must open a second frame");

    let seen = responses.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[3], vec![4]);
}
