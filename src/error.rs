// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// The closed set of error codes a layer implementation, or the core itself,
/// may surface.
///
/// `Ok`/`Pending`/`Partial`/`Retry` are not failures — they are control-flow
/// outcomes and live on [`LayerSignal`] instead, so that `PlcError` only ever
/// represents something actually wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlcError {
    #[error("null pointer")]
    NullPtr,
    #[error("allocation failed")]
    NoMem,
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("buffer window out of bounds")]
    OutOfBounds,
    #[error("buffer too small for request")]
    TooSmall,
    #[error("request already queued")]
    Busy,
    #[error("not found")]
    NotFound,
    /// A layer reported a protocol-level fault outside the fixed codes above
    /// (malformed frame, unexpected PDU, …). Still within the closed set in
    /// spirit: the layer contract only allows a layer to *fail*, never to
    /// invent a new success code.
    #[error("layer error: {0}")]
    Layer(String),
}

pub type PlcResult<T> = Result<T, PlcError>;

/// Outcomes of a layer capability call that are not failures.
///
/// `connect`, `disconnect`, `build_layer`, and `process_response` all return
/// one of these on the non-error path; the runner interprets the variant
/// according to which state invoked the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSignal {
    /// The layer (and everything below it) has completed this step.
    Ok,
    /// This layer produced bytes to send, or needs another read; re-enter
    /// after the I/O completes.
    Pending,
    /// `process_response` needs more bytes before it can make progress.
    Partial,
    /// The handshake step must be redone (e.g. a second login exchange).
    Retry,
}

/// Outcome of one iteration of the state runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerOutcome {
    /// A callback or timer has been registered; the runner suspends.
    Suspend,
    /// Re-enter the runner immediately (tail-call-like transition).
    Continue,
}
