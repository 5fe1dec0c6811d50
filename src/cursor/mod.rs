//! Bounds-checked read position over an immutable byte buffer.
//!
//! Offsets reported by a cursor (and by every error it raises) are absolute
//! positions in the top-level buffer, so child cursors created for nested
//! records still produce diagnostics in the caller's coordinate space.

use serde::{Deserialize, Serialize};

use crate::error::WalkError;

/// Byte order of multi-byte integer fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Read cursor: (buffer, offset, limit) with `offset <= limit <= buffer.len()`.
///
/// A failed read leaves the cursor where it was.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    offset: usize,
    limit: usize,
}

impl<'a> ByteCursor<'a> {
    /// Cursor over the whole buffer
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            limit: buf.len(),
        }
    }

    /// Current absolute offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Absolute end of the readable window
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left before `limit`
    pub fn remaining(&self) -> usize {
        self.limit - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == self.limit
    }

    /// Unread bytes, without advancing
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.offset..self.limit]
    }

    fn truncated(&self, needed: usize) -> WalkError {
        WalkError::Truncated {
            offset: self.offset,
            needed,
            available: self.remaining(),
        }
    }

    /// Borrow `[offset + skip, offset + skip + n)` without moving.
    fn window(&self, skip: usize, n: usize) -> Result<&'a [u8], WalkError> {
        let end = skip
            .checked_add(n)
            .filter(|&end| end <= self.remaining())
            .ok_or_else(|| self.truncated(skip.saturating_add(n)))?;
        Ok(&self.buf[self.offset + skip..self.offset + end])
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WalkError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.window(0, N)?);
        self.offset += N;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WalkError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self, endian: Endian) -> Result<u16, WalkError> {
        let b = self.take::<2>()?;
        Ok(match endian {
            Endian::Big => u16::from_be_bytes(b),
            Endian::Little => u16::from_le_bytes(b),
        })
    }

    pub fn read_u24(&mut self, endian: Endian) -> Result<u32, WalkError> {
        let b = self.take::<3>()?;
        Ok(match endian {
            Endian::Big => u32::from_be_bytes([0, b[0], b[1], b[2]]),
            Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], 0]),
        })
    }

    pub fn read_u32(&mut self, endian: Endian) -> Result<u32, WalkError> {
        let b = self.take::<4>()?;
        Ok(match endian {
            Endian::Big => u32::from_be_bytes(b),
            Endian::Little => u32::from_le_bytes(b),
        })
    }

    pub fn read_u64(&mut self, endian: Endian) -> Result<u64, WalkError> {
        let b = self.take::<8>()?;
        Ok(match endian {
            Endian::Big => u64::from_be_bytes(b),
            Endian::Little => u64::from_le_bytes(b),
        })
    }

    /// Fixed-size array read, used for FourCCs and UUIDs
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WalkError> {
        self.take::<N>()
    }

    /// Borrow the next `n` bytes and advance past them. Never copies.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WalkError> {
        let bytes = self.window(0, n)?;
        self.offset += n;
        Ok(bytes)
    }

    /// Read a NUL-terminated ASCII string of at most `max_len` bytes.
    ///
    /// Stops at the first NUL (consumed, not returned) or after `max_len`
    /// bytes. Fails with `Truncated` only when no NUL lies inside the
    /// readable window and `max_len` reaches past `limit`. Non-ASCII bytes
    /// are rendered as `?`.
    pub fn read_cstring_ascii(&mut self, max_len: usize) -> Result<String, WalkError> {
        let scan = max_len.min(self.remaining());
        let window = self.window(0, scan)?;
        let (text, consumed) = match window.iter().position(|&b| b == 0) {
            Some(nul) => (&window[..nul], nul + 1),
            None if max_len > self.remaining() => return Err(self.truncated(max_len)),
            None => (window, scan),
        };
        self.offset += consumed;
        Ok(text
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect())
    }

    pub fn peek_u8(&self) -> Result<u8, WalkError> {
        Ok(self.window(0, 1)?[0])
    }

    pub fn peek_u16(&self, endian: Endian) -> Result<u16, WalkError> {
        let mut probe = *self;
        probe.read_u16(endian)
    }

    pub fn peek_u32(&self, endian: Endian) -> Result<u32, WalkError> {
        let mut probe = *self;
        probe.read_u32(endian)
    }

    /// Peek a byte `skip` bytes ahead of the current position
    pub fn peek_u8_at(&self, skip: usize) -> Result<u8, WalkError> {
        Ok(self.window(skip, 1)?[0])
    }

    /// Advance by `n` bytes without interpreting them
    pub fn skip(&mut self, n: usize) -> Result<(), WalkError> {
        self.window(0, n)?;
        self.offset += n;
        Ok(())
    }

    /// Child cursor over `[offset + offset_delta, offset + len)`.
    ///
    /// Both arguments are relative to the current position. Fails with
    /// `Truncated` when the child window would end past this cursor's limit.
    /// The parent does not move.
    pub fn sub_cursor(&self, offset_delta: usize, len: usize) -> Result<ByteCursor<'a>, WalkError> {
        if len > self.remaining() || offset_delta > len {
            return Err(self.truncated(len.max(offset_delta)));
        }
        Ok(ByteCursor {
            buf: self.buf,
            offset: self.offset + offset_delta,
            limit: self.offset + len,
        })
    }
}
