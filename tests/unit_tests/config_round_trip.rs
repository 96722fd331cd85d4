// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use plctag_core::cfg::config::Config;

#[test]
fn demo_yaml_loads_and_validates() {
    let cfg = Config::load_from_file("config/demo.yaml").expect("demo.yaml must load");
    assert_eq!(cfg.timing.idle_timeout_ms, 5000);
    assert_eq!(cfg.timing.heartbeat_interval_ms, 200);
    assert_eq!(cfg.timing.retry_interval_ms, 1000);
    assert_eq!(cfg.timing.retry_ceiling_ms, 16000);
    assert_eq!(cfg.buffer.initial_capacity, 512);
    assert_eq!(cfg.buffer.max_capacity, 65536);
    assert_eq!(cfg.transport.timeout_connection.as_millis(), 5000);
}

#[test]
fn serializing_and_reparsing_preserves_values() {
    let mut cfg = Config::default();
    cfg.timing.idle_timeout_ms = 2500;
    let yaml = serde_yaml::to_string(&cfg).expect("serialize");
    let reparsed: Config = serde_yaml::from_str(&yaml).expect("reparse");
    assert_eq!(reparsed.timing.idle_timeout_ms, 2500);
    assert_eq!(reparsed.buffer.initial_capacity, cfg.buffer.initial_capacity);
}
