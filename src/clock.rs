// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A seam over wall-clock time, narrowed to just "what time is it".
//!
//! The heartbeat itself runs on a plain spawned `tokio::time::interval`
//! (see `state_machine::dispatch`); the dispatcher's own decision rules —
//! "has the idle deadline passed", "has the retry backoff elapsed" — stay
//! pure functions of a `now_ms` value. `Clock` is the only seam those pure
//! functions need: a real clock for production, a `FakeClock` a test can
//! advance by hand without waiting on real time or spinning up a runtime.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A test clock that only advances when told to.
#[derive(Debug, Clone, Default)]
pub struct FakeClock(Arc<AtomicU64>);

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_ms)))
    }

    pub fn advance(&self, delta_ms: u64) {
        self.0.fetch_add(delta_ms, Ordering::Relaxed);
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::Relaxed);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
