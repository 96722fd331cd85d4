// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bounds-checked little-endian accessors for layer implementations.
//!
//! Every getter/setter here takes the declared `capacity` of the backing
//! buffer and checks the access against it *before* touching `buf`. `buf` is
//! `Option<&mut [u8]>` on purpose: passing `None` runs the same bounds check
//! and returns the advanced offset without writing anything — a
//! capacity-probe mode layer authors use to size a header before the real
//! buffer exists (e.g. during the first, capacity-only pass of
//! `reserve_space`). The probe and the real write must bounds-check
//! identically, or a layer could size itself against one rule and then
//! write past a buffer it sized using another.

use crate::error::{PlcError, PlcResult};

macro_rules! try_get_le {
    ($name:ident, $ty:ty, $width:expr) => {
        /// Reads a little-endian
        #[doc = stringify!($ty)]
        /// at `offset`, bounds-checked against `capacity`.
        pub fn $name(buf: &[u8], offset: usize, capacity: usize) -> PlcResult<$ty> {
            let end = offset.checked_add($width).ok_or(PlcError::OutOfBounds)?;
            if end > capacity || end > buf.len() {
                return Err(PlcError::OutOfBounds);
            }
            let mut raw = [0u8; $width];
            raw.copy_from_slice(&buf[offset..end]);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

macro_rules! try_set_le {
    ($name:ident, $ty:ty, $width:expr) => {
        /// Writes `value` little-endian at `offset`, bounds-checked against
        /// `capacity`. Pass `buf = None` to probe sizing without writing;
        /// either way the returned offset is `offset + ` the encoded width.
        pub fn $name(
            buf: Option<&mut [u8]>,
            offset: usize,
            capacity: usize,
            value: $ty,
        ) -> PlcResult<usize> {
            let end = offset.checked_add($width).ok_or(PlcError::OutOfBounds)?;
            if end > capacity {
                return Err(PlcError::OutOfBounds);
            }
            if let Some(buf) = buf {
                if end > buf.len() {
                    return Err(PlcError::OutOfBounds);
                }
                buf[offset..end].copy_from_slice(&value.to_le_bytes());
            }
            Ok(end)
        }
    };
}

try_get_le!(get_u8_le, u8, 1);
try_get_le!(get_u16_le, u16, 2);
try_get_le!(get_u32_le, u32, 4);
try_get_le!(get_u64_le, u64, 8);

try_set_le!(set_u8_le, u8, 1);
try_set_le!(set_u16_le, u16, 2);
try_set_le!(set_u32_le, u32, 4);
try_set_le!(set_u64_le, u64, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_mode_advances_without_writing() {
        let end = set_u32_le(None, 0, 16, 0xdead_beef).expect("probe must succeed");
        assert_eq!(end, 4);
    }

    #[test]
    fn probe_and_real_write_bounds_check_identically() {
        let probe_err = set_u32_le(None, 14, 16, 0).unwrap_err();
        let mut buf = [0u8; 16];
        let real_err = set_u32_le(Some(&mut buf), 14, 16, 0).unwrap_err();
        assert_eq!(probe_err, real_err);
    }

    #[test]
    fn round_trip() {
        let mut buf = [0u8; 8];
        set_u64_le(Some(&mut buf), 0, 8, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(get_u64_le(&buf, 0, 8).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn rejects_offset_past_capacity_even_with_room_in_buf() {
        let mut buf = [0u8; 32];
        // capacity declares a smaller logical window than the physical buf.
        assert!(set_u16_le(Some(&mut buf), 12, 12, 7).is_err());
    }
}
