// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use plctag_core::layer::Window;

#[test]
fn fresh_window_spans_the_full_capacity_and_is_sane() {
    let mut buf = [0u8; 64];
    let window = Window::new(&mut buf, 64);
    assert_eq!(window.start, 0);
    assert_eq!(window.end, 64);
    assert!(window.is_sane());
}

#[test]
fn capacity_smaller_than_the_backing_buffer_clamps_end() {
    let mut buf = [0u8; 64];
    let window = Window::new(&mut buf, 16);
    assert_eq!(window.end, 16);
    assert!(window.is_sane());
}

#[test]
fn narrowing_start_past_end_is_not_sane() {
    let mut buf = [0u8; 16];
    let mut window = Window::new(&mut buf, 16);
    window.start = 20;
    assert!(!window.is_sane());
}

#[test]
fn live_mut_only_exposes_the_narrowed_span() {
    let mut buf = [0u8; 16];
    let mut window = Window::new(&mut buf, 16);
    window.start = 4;
    window.end = 8;
    assert_eq!(window.live_mut().len(), 4);
    window.live_mut().copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(&window.raw_mut()[4..8], &[1, 2, 3, 4]);
}
