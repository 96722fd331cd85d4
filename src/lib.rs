// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `plctag-core`: a connection-and-protocol core for talking to
//! industrial PLCs over a layered, frame-oriented transport.
//!
//! A single mutex-guarded [`plc::Plc`] per gateway drives a 14-state
//! dispatcher (`state_machine`) through connect, request, and disconnect
//! tracks, folding queued requests through a family-specific
//! [`layer::Layer`] stack that turns opaque client callbacks into wire
//! frames and back. [`registry::Registry`] interns PLCs by key so
//! concurrent callers targeting the same gateway share one connection;
//! [`client`] is the thin, ergonomic surface most callers actually want.

pub mod cfg;
pub mod client;
pub mod clock;
pub mod codec;
pub mod error;
pub mod gateway;
pub mod layer;
pub mod plc;
pub mod registry;
pub mod request;
pub mod socket;
mod state_machine;

pub use client::Client;
pub use error::{PlcError, PlcResult};
pub use plc::Plc;
pub use registry::{PlcHandle, Registry};
pub use request::{Request, RequestHandle};
