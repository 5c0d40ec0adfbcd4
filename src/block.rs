//! Block addressing and bounds-checked big-endian cursors.
//!
//! # Block addresses
//! The allocator packs a block's offset and size class into one `u32`:
//! the low 5 bits are an exponent `e` (size = 2^e) and the remaining bits
//! are the byte offset, which is therefore always 32-byte aligned.
//!
//! # The 4-byte skew
//! Allocator offsets are relative to byte 4 of the file, not byte 0: the
//! first word of the file sits outside the allocator's address space.  Every
//! allocator offset `o` is therefore read from file position `o + 4`.  The
//! same skew is applied on write.
//!
//! # Endianness
//! Every multi-byte integer in the container is big-endian.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{DsStoreError, Result};

/// Distance between allocator offset 0 and file offset 0.
pub const HEADER_SKEW: u64 = 4;

const EXPONENT_MASK: u32 = 0x1F;

// ── BlockAddress ─────────────────────────────────────────────────────────────

/// A decoded allocator block address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockAddress {
    /// Allocator offset (file position minus [`HEADER_SKEW`]).
    pub offset: u64,
    /// Block size in bytes, always a power of two.
    pub size:   u32,
}

impl BlockAddress {
    /// Decode a raw address.  Every `u32` decodes to a well-formed address;
    /// whether it lies inside the file is checked when a reader is opened.
    pub fn from_raw(raw: u32) -> Self {
        Self {
            offset: u64::from(raw & !EXPONENT_MASK),
            size:   1u32 << (raw & EXPONENT_MASK),
        }
    }

    /// Build an address, rejecting sizes that are not powers of two and
    /// offsets the 27 high bits cannot express or that are not aligned to
    /// the block size.
    pub fn new(offset: u64, size: u32) -> Result<Self> {
        if !size.is_power_of_two() {
            return Err(DsStoreError::format(offset, format!("block size {size} is not a power of two")));
        }
        if offset & u64::from(EXPONENT_MASK) != 0 || offset > u64::from(u32::MAX & !EXPONENT_MASK) {
            return Err(DsStoreError::format(offset, "block offset not encodable"));
        }
        if offset % u64::from(size) != 0 {
            return Err(DsStoreError::format(offset, format!("block offset not aligned to size {size}")));
        }
        Ok(Self { offset, size })
    }

    #[inline]
    pub fn exponent(&self) -> u32 {
        self.size.trailing_zeros()
    }

    /// Re-encode as the on-disk `u32`.
    #[inline]
    pub fn to_raw(&self) -> u32 {
        (self.offset as u32) | self.exponent()
    }

    /// First file byte of the block, skew included.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.offset + HEADER_SKEW
    }

    /// One past the last allocator byte of the block.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }
}

// ── BlockReader ──────────────────────────────────────────────────────────────

/// Sequential reader over `[base, base + len)` of a byte buffer.
///
/// The reader borrows the container's bytes, so a view can never outlive
/// the buffer it reads and nothing needs releasing on error paths.
#[derive(Debug, Clone)]
pub struct BlockReader<'a> {
    data:  &'a [u8],
    base:  u64,
    limit: u64,
    pos:   u64,
}

impl<'a> BlockReader<'a> {
    /// Open a view over `len` bytes at absolute position `base`.
    pub fn new(data: &'a [u8], base: u64, len: u64) -> Result<Self> {
        let limit = base.checked_add(len).ok_or(DsStoreError::Range {
            offset: base,
            len,
            limit: data.len() as u64,
        })?;
        if limit > data.len() as u64 {
            return Err(DsStoreError::Range { offset: base, len, limit: data.len() as u64 });
        }
        Ok(Self { data, base, limit, pos: base })
    }

    /// Open a view over an allocator block, applying the 4-byte skew.
    pub fn for_block(data: &'a [u8], addr: BlockAddress) -> Result<Self> {
        Self::new(data, addr.file_offset(), u64::from(addr.size))
    }

    /// Absolute file position of the cursor.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.limit - self.pos
    }

    fn take(&mut self, n: u64) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(DsStoreError::Range { offset: self.pos, len: n, limit: self.limit });
        }
        let start = self.pos as usize;
        self.pos += n;
        Ok(&self.data[start..start + n as usize])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n as u64)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N as u64)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.take(n).map(|_| ())
    }
}

// ── BlockWriter ──────────────────────────────────────────────────────────────

/// Growable big-endian writer used to stage a whole container in memory.
#[derive(Debug, Default)]
pub struct BlockWriter {
    buf: Vec<u8>,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.buf.write_u8(v)?;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.buf.write_u16::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.buf.write_u32::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.buf.write_u64::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrite a `u32` already written at `pos`.
    pub fn patch_u32(&mut self, pos: usize, v: u32) -> Result<()> {
        let end = pos + 4;
        if end > self.buf.len() {
            return Err(DsStoreError::Range { offset: pos as u64, len: 4, limit: self.buf.len() as u64 });
        }
        BigEndian::write_u32(&mut self.buf[pos..end], v);
        Ok(())
    }

    /// Zero-fill up to absolute length `len`.  Fails if already past it.
    pub fn pad_to(&mut self, len: usize) -> Result<()> {
        if self.buf.len() > len {
            return Err(DsStoreError::CapacityExceeded { needed: self.buf.len(), capacity: len });
        }
        self.buf.resize(len, 0);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
