//! Owned byte buffer with little-endian word access.
//!
//! All object-file data and the relocated output image flow through this
//! type. Reads and writes past the end are errors rather than panics, since
//! offsets usually come straight out of untrusted input files.

use anyhow::{bail, Result};
use byteorder::{ByteOrder, LittleEndian};

/// A growable, contiguous byte sequence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Truncates to zero length. The allocation is kept for reuse across
    /// relocation passes.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn append_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Zero-extends the buffer by `count` bytes.
    pub fn reserve_bytes(&mut self, count: usize) {
        self.data.resize(self.data.len() + count, 0);
    }

    /// Returns `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        match self.data.get(offset..offset + len) {
            Some(s) => Ok(s),
            None => bail!(
                "byte range {:#x}..{:#x} lies outside buffer of size {:#x}",
                offset,
                offset + len,
                self.data.len()
            ),
        }
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.slice(offset, 2)?))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.slice(offset, 4)?))
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        if offset + 4 > self.data.len() {
            bail!(
                "write at {:#x} lies outside buffer of size {:#x}",
                offset,
                self.data.len()
            );
        }
        LittleEndian::write_u32(&mut self.data[offset..offset + 4], value);
        Ok(())
    }

    /// Copies `bytes` over the existing contents at `offset`.
    pub fn write_slice(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if offset + bytes.len() > self.data.len() {
            bail!(
                "write of {:#x} bytes at {:#x} lies outside buffer of size {:#x}",
                bytes.len(),
                offset,
                self.data.len()
            );
        }
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
