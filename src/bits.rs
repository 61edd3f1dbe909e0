//! Bit-level reader and writer for the binary game format.
//!
//! Inside a byte, bits are filled from the lowest (`0x01`) to the highest
//! (`0x80`). Multi-bit values are written most significant bit first.

use crate::error::ParseError;

/// Accumulates bits into bytes.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Mask of the next bit in the last byte; 0 when a new byte is needed.
    mask: u8,
    len: usize,
}

impl BitWriter {
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            mask: 0,
            len: 0,
        }
    }

    /// Number of bits written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        if self.mask == 0 {
            self.bytes.push(0);
            self.mask = 0x01;
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= self.mask;
            }
        }
        self.mask = self.mask.wrapping_shl(1);
        self.len += 1;
    }

    /// Writes the low `bits` bits of `value`, highest first.
    pub fn write(&mut self, value: u64, bits: u32) {
        for i in (0..bits.min(64)).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Returns the bytes; a partial last byte is padded with zeros.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads bits from a byte slice.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bits consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// True once every bit of the input has been read.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len() * 8
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<bool, ParseError> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or(ParseError::Truncated { bits: self.pos })?;
        let bit = byte & (1 << (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    /// Reads a `bits`-wide value, highest bit first.
    pub fn read(&mut self, bits: u32) -> Result<u64, ParseError> {
        let mut value = 0u64;
        for _ in 0..bits.min(64) {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }
}

/// Number of bits needed to write every value in `0..count`.
pub fn bits_for(count: usize) -> u32 {
    usize::BITS - count.saturating_sub(1).leading_zeros()
}
