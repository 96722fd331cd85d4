// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-family layer stacks.
//!
//! Real PLC families (EtherNet/IP CIP, Modbus TCP, Omron FINS, …) are out of
//! scope (spec Non-goals): each would live in its own module here, built
//! from the same [`crate::layer::Layer`] contract. [`demo`] is the one
//! concrete family this crate ships, used by the CLI binary and the
//! integration tests to exercise the runner end to end. [`batch_demo`] is
//! the same idea with batching turned on, used by the tests that exercise
//! multiple requests folded into one frame.

pub mod batch_demo;
pub mod demo;
