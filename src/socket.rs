// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The socket collaborator (spec §9: "async I/O boundary"). This is the one
//! place in the crate that actually touches the network; everything above
//! it (layers, requests, the state machine) only sees byte windows.
//!
//! `PlcSocket` is object-safe via boxed futures, mirroring the teacher's
//! `ClientConnection` split into a mutex-guarded read half and write half
//! plus a two-tier cancellation token (`graceful_quiesce` drains in-flight
//! work, `kill_now` aborts immediately). Unlike the teacher's connection,
//! which demuxes responses into per-ITT channels itself, this socket stays
//! dumb — raw bytes in, raw bytes out — because request correlation belongs
//! to the layer stack (the tagging layer), not the transport.

use std::{
    pin::Pin,
    time::Duration,
};

use anyhow::{Result, anyhow, bail};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transport seam between the runner and a live connection.
///
/// Boxed futures keep this object-safe, the same way the teacher reaches
/// for `Pin<Box<dyn Future<...>>>` wherever a trait needs to be both async
/// and usable as `dyn`.
pub trait PlcSocket: Send + Sync + std::fmt::Debug {
    fn write_all<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Reads up to `buf.len()` bytes, returning the number read. `0` means
    /// the peer closed its write side.
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, Result<usize>>;

    /// Stop accepting new writes and wait for `max_wait` for the caller to
    /// finish processing whatever is already in flight, without tearing
    /// down the socket.
    fn graceful_quiesce(&self, max_wait: Duration) -> BoxFuture<'_, Result<()>>;

    /// Abort both directions immediately; any in-flight `read`/`write_all`
    /// future resolves to an error.
    fn kill_now(&self);

    fn is_killed(&self) -> bool;
}

/// A real TCP-backed [`PlcSocket`].
#[derive(Debug)]
pub struct TcpPlcSocket {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    io_timeout: Duration,
    cancel: CancellationToken,
    stop_writes: CancellationToken,
}

impl TcpPlcSocket {
    pub async fn connect(addr: (&str, u16), io_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (r, w) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(r),
            writer: Mutex::new(w),
            io_timeout,
            cancel: CancellationToken::new(),
            stop_writes: CancellationToken::new(),
        })
    }

    async fn with_timeout<F, T>(&self, label: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(anyhow!("{label} cancelled")),
            res = timeout(self.io_timeout, fut) => match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow!("{label} timed out")),
            },
        }
    }
}

impl PlcSocket for TcpPlcSocket {
    fn write_all<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                bail!("socket killed");
            }
            if self.stop_writes.is_cancelled() {
                bail!("writes quiesced");
            }
            let mut w = self.writer.lock().await;
            debug!(len = bytes.len(), "write_all");
            self.with_timeout("write_all", w.write_all(bytes)).await
        })
    }

    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                bail!("socket killed");
            }
            let mut r = self.reader.lock().await;
            self.with_timeout("read", r.read(buf)).await
        })
    }

    fn graceful_quiesce(&self, max_wait: Duration) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.stop_writes.cancel();
            tokio::select! {
                _ = self.cancel.cancelled() => Err(anyhow!("killed during quiesce")),
                _ = tokio::time::sleep(max_wait) => Ok(()),
            }
        })
    }

    fn kill_now(&self) {
        self.cancel.cancel();
        self.stop_writes.cancel();
    }

    fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::{
        collections::VecDeque,
        sync::Mutex as StdMutex,
    };

    use super::*;

    /// An in-memory double for unit tests: queued inbound frames, and a
    /// record of everything written out.
    #[derive(Debug, Default)]
    pub struct FakeSocket {
        inbound: StdMutex<VecDeque<Vec<u8>>>,
        pub outbound: StdMutex<Vec<Vec<u8>>>,
        killed: std::sync::atomic::AtomicBool,
    }

    impl FakeSocket {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_inbound(&self, frame: Vec<u8>) {
            self.inbound.lock().unwrap().push_back(frame);
        }
    }

    impl PlcSocket for FakeSocket {
        fn write_all<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.outbound.lock().unwrap().push(bytes.to_vec());
                Ok(())
            })
        }

        fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                let Some(frame) = self.inbound.lock().unwrap().pop_front() else {
                    return Ok(0);
                };
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            })
        }

        fn graceful_quiesce(&self, _max_wait: Duration) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn kill_now(&self) {
            self.killed.store(true, std::sync::atomic::Ordering::Relaxed);
        }

        fn is_killed(&self) -> bool {
            self.killed.load(std::sync::atomic::Ordering::Relaxed)
        }
    }

    #[tokio::test]
    async fn fake_socket_echoes_queued_frames() {
        let sock = FakeSocket::new();
        sock.queue_inbound(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        let n = sock.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn fake_socket_records_writes() {
        let sock = FakeSocket::new();
        sock.write_all(&[9, 9]).await.unwrap();
        assert_eq!(sock.outbound.lock().unwrap().as_slice(), &[vec![9, 9]]);
    }
}
