// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Top-level configuration for a PLC connection core.
///
/// Loaded from YAML via [`Config::load_from_file`]; every field here maps to
/// a knob the core itself owns (timing, buffering, retry) — nothing about
/// the wire protocol of a specific PLC family lives here, since that is the
/// job of the per-family layer builder.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Per-gateway timing knobs (idle timeout, heartbeat, retry backoff).
    pub timing: TimingConfig,
    /// Buffer sizing knobs for the shared PLC byte window.
    pub buffer: BufferConfig,
    /// Socket-level timeouts that do not belong to the protocol itself.
    pub transport: TransportConfig,
}

/// Timing knobs that drive the dispatcher.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    /// Idle timeout in milliseconds before an established connection is torn
    /// down. Legal range is `0..=5000`; `0` disables idle disconnect.
    #[serde(rename = "IdleTimeoutMs", default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u32,

    /// Heartbeat re-arm interval in milliseconds. Defaults to 200ms; exposed
    /// so tests can run a compressed clock.
    #[serde(rename = "HeartbeatIntervalMs", default = "default_heartbeat_ms")]
    pub heartbeat_interval_ms: u32,

    /// Initial retry backoff in milliseconds. Legal range is
    /// `1000..=16000`.
    #[serde(rename = "RetryIntervalMs", default = "default_retry_interval_ms")]
    pub retry_interval_ms: u32,

    /// Ceiling the exponential backoff may not exceed.
    #[serde(rename = "RetryCeilingMs", default = "default_retry_ceiling_ms")]
    pub retry_ceiling_ms: u32,

    /// Grace period `destroy()` waits for an in-flight disconnect before
    /// releasing resources unconditionally.
    #[serde(rename = "DestroyGraceMs", default = "default_destroy_grace_ms")]
    pub destroy_grace_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_ceiling_ms: default_retry_ceiling_ms(),
            destroy_grace_ms: default_destroy_grace_ms(),
        }
    }
}

fn default_idle_timeout_ms() -> u32 {
    5000
}

fn default_heartbeat_ms() -> u32 {
    200
}

fn default_retry_interval_ms() -> u32 {
    1000
}

fn default_retry_ceiling_ms() -> u32 {
    16000
}

fn default_destroy_grace_ms() -> u32 {
    500
}

/// Buffer sizing knobs for the shared PLC byte window.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BufferConfig {
    /// Starting capacity of a freshly-interned PLC's buffer.
    #[serde(rename = "InitialCapacity", default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Upper bound `set_buffer_size` will grow the buffer to. Buffers only
    /// grow, never shrink.
    #[serde(rename = "MaxCapacity", default = "default_max_capacity")]
    pub max_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_initial_capacity() -> usize {
    512
}

fn default_max_capacity() -> usize {
    64 * 1024
}

/// Socket-level timeouts that do not belong to the protocol itself.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TransportConfig {
    /// Timeout applied to the TCP connect attempt and to individual
    /// read/write completions.
    #[serde(rename = "TimeoutConnection", with = "serde_millis")]
    pub timeout_connection: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_connection: Duration::from_millis(5000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            buffer: BufferConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path.as_ref()))?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            self.timing.idle_timeout_ms <= 5000,
            "IdleTimeoutMs must be in 0..=5000"
        );
        ensure!(
            (1000..=16000).contains(&self.timing.retry_interval_ms),
            "RetryIntervalMs must be in 1000..=16000"
        );
        ensure!(
            self.timing.retry_ceiling_ms >= self.timing.retry_interval_ms,
            "RetryCeilingMs must be >= RetryIntervalMs"
        );
        ensure!(
            self.timing.heartbeat_interval_ms > 0,
            "HeartbeatIntervalMs must be > 0"
        );
        ensure!(
            self.buffer.max_capacity >= self.buffer.initial_capacity,
            "BufferConfig.MaxCapacity must be >= InitialCapacity"
        );
        Ok(())
    }
}

/// Serde helper for representing `Duration` as a number of milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
