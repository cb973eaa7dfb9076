use core::cmp;

use crate::Error;

/// Little-endian reader over a byte slice.
pub struct Bytes<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Bytes<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn tail(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Returns a slice up to `max_len` bytes.
    pub fn peek_slice(&self, max_len: usize) -> &'a [u8] {
        let len = cmp::min(max_len, self.remaining());
        &self.tail()[..len]
    }

    pub fn read(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            return Err(Error::More(self.offset + len));
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut raw = [0; N];
        raw.copy_from_slice(self.read(N)?);
        Ok(raw)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }
}

/// Reads a `size`-byte token starting at `offset`.
///
/// Fails with [`Error::More`] when the token runs past the end of `data`.
pub fn read_token(data: &[u8], offset: usize, size: usize, big_endian: bool) -> Result<u64, Error> {
    debug_assert!(size != 0 && size <= 8);
    let end = offset + size;
    let raw = data.get(offset..end).ok_or(Error::More(end))?;
    let value = if big_endian {
        raw.iter().fold(0, |acc, &b| (acc << 8) | b as u64)
    } else {
        raw.iter().rev().fold(0, |acc, &b| (acc << 8) | b as u64)
    };
    Ok(value)
}
