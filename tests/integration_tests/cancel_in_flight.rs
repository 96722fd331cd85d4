// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use plctag_core::{
    error::{LayerSignal, PlcError},
    layer::{Window, families::demo::demo_family},
    request::Request,
};

use crate::integration_tests::common::{encode_demo_response, new_harness, test_config};

#[tokio::test]
async fn stopping_a_request_before_it_is_built_keeps_it_off_the_wire() {
    let harness = new_harness(1_000);
    let cfg = test_config();
    let plc = harness
        .client
        .get_or_create("gw-cancel", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    let a_called = Arc::new(AtomicBool::new(false));
    let a_called_for_response = Arc::clone(&a_called);
    let a = Request::new(
        |window: &mut Window<'_>| {
            window.live_mut()[..1].copy_from_slice(&[b'a']);
            window.end = window.start + 1;
            Ok(LayerSignal::Ok)
        },
        move |_window: &mut Window<'_>| {
            a_called_for_response.store(true, Ordering::Relaxed);
            Ok(())
        },
    );
    let a_handle = a.handle();

    let b_received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let b_received_for_response = Arc::clone(&b_received);
    let b = Request::new(
        |window: &mut Window<'_>| {
            window.live_mut()[..1].copy_from_slice(&[b'b']);
            window.end = window.start + 1;
            Ok(LayerSignal::Ok)
        },
        move |window: &mut Window<'_>| {
            b_received_for_response.lock().unwrap().extend_from_slice(window.live());
            Ok(())
        },
    );

    // Both requests land in the pending FIFO before the runner ever looks at
    // it, the way two client threads submitting back-to-back would.
    plc.test_enqueue(a).await;
    plc.test_enqueue(b).await;

    harness.client.stop_request(&plc, a_handle).await.unwrap();

    harness.connector.socket().queue_inbound(encode_demo_response(1, b"b-reply"));
    plc.run().await.unwrap();

    assert!(!a_called.load(Ordering::Relaxed), "a cancelled request must never build a frame");
    assert_eq!(&*b_received.lock().unwrap(), b"b-reply");

    let outbound = harness.connector.socket().outbound.lock().unwrap();
    assert_eq!(outbound.len(), 1, "only b's request should have gone out");
}

#[tokio::test]
async fn stopping_an_unknown_handle_is_not_found() {
    let harness = new_harness(1_000);
    let cfg = test_config();
    let plc = harness
        .client
        .get_or_create("gw-cancel-2", "127.0.0.1".into(), 9999, &cfg, demo_family)
        .unwrap();

    let ghost = Request::new(|_w: &mut Window<'_>| Ok(LayerSignal::Ok), |_w: &mut Window<'_>| Ok(()));
    let ghost_handle = ghost.handle();
    drop(ghost);

    let err = harness.client.stop_request(&plc, ghost_handle).await.unwrap_err();
    assert_eq!(err, PlcError::NotFound);
}
