//! Bit-level reading and writing plus Annex-B NAL unit scanning.
//!
//! [`BitReader`] is used to parse parameter set RBSPs (SPS, profile/tier/level).
//! [`NalUnits`] splits an Annex-B byte stream into borrowed NAL payloads
//! without unescaping emulation prevention bytes.

use crate::error::{BitstreamError, Error, Result};

/// A bitstream reader for parsing coded data.
///
/// Supports single bits, fixed-width fields and Exp-Golomb codes as used by
/// H.264 and H.265 parameter sets.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Current bit position in the stream.
    pub fn position(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// Number of unread bits.
    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position())
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self
            .data
            .get(self.byte_pos)
            .ok_or(BitstreamError::UnexpectedEnd)?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Ok(bit != 0)
    }

    /// Read a flag bit. Alias of [`read_bit`](Self::read_bit) that reads better in syntax parsers.
    pub fn read_flag(&mut self) -> Result<bool> {
        self.read_bit()
    }

    /// Read up to 32 bits as an unsigned integer.
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        if n > 32 {
            return Err(Error::InvalidParameter(
                "Cannot read more than 32 bits at once".into(),
            ));
        }
        self.read_bits_u64(n).map(|v| v as u32)
    }

    /// Read up to 64 bits as an unsigned integer.
    pub fn read_bits_u64(&mut self, n: u8) -> Result<u64> {
        if n > 64 {
            return Err(Error::InvalidParameter(
                "Cannot read more than 64 bits at once".into(),
            ));
        }
        if self.remaining_bits() < n as usize {
            return Err(BitstreamError::UnexpectedEnd.into());
        }
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Read an unsigned Exp-Golomb coded value (ue(v)).
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u8;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(BitstreamError::ExpGolombOverflow.into());
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) - 1 + u64::from(suffix)) as u32)
    }

    /// Read a signed Exp-Golomb coded value (se(v)).
    pub fn read_se(&mut self) -> Result<i32> {
        let ue = self.read_ue()?;
        let magnitude = ue.div_ceil(2) as i32;
        Ok(if ue % 2 == 0 { -magnitude } else { magnitude })
    }

    /// Skip a number of bits.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining_bits() < n {
            return Err(BitstreamError::UnexpectedEnd.into());
        }
        let new_pos = self.position() + n;
        self.byte_pos = new_pos / 8;
        self.bit_pos = (new_pos % 8) as u8;
        Ok(())
    }
}

/// A bitstream writer, used to synthesise parameter sets.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_pos: u8,
}

impl BitWriter {
    /// Create a new bit writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        if self.bit_pos == 0 {
            self.data.push(0);
        }
        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 1 << (7 - self.bit_pos);
            }
        }
        self.bit_pos = (self.bit_pos + 1) % 8;
    }

    /// Write the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, n: u8) {
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    /// Write an unsigned Exp-Golomb coded value.
    pub fn write_ue(&mut self, value: u32) {
        let value_plus_1 = u64::from(value) + 1;
        let bits = 64 - value_plus_1.leading_zeros() as u8;
        for _ in 0..bits - 1 {
            self.write_bit(false);
        }
        for i in (0..bits).rev() {
            self.write_bit((value_plus_1 >> i) & 1 != 0);
        }
    }

    /// Write a signed Exp-Golomb coded value.
    pub fn write_se(&mut self, value: i32) {
        let ue = if value <= 0 {
            value.unsigned_abs() * 2
        } else {
            value as u32 * 2 - 1
        };
        self.write_ue(ue);
    }

    /// Write RBSP trailing bits (1 followed by zeros to byte alignment).
    pub fn write_rbsp_trailing_bits(&mut self) {
        self.write_bit(true);
        while self.bit_pos != 0 {
            self.write_bit(false);
        }
    }

    /// Get the written data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take the written data, consuming the writer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Find the next start code in a byte slice.
///
/// Returns the offset of the first byte of the start code and its length
/// (3 for `00 00 01`, 4 for `00 00 00 01`).
pub fn find_start_code(data: &[u8]) -> Option<(usize, usize)> {
    let len = data.len();
    if len < 3 {
        return None;
    }
    for i in 0..len - 2 {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, 3));
            } else if i + 3 < len && data[i + 2] == 0 && data[i + 3] == 1 {
                return Some((i, 4));
            }
        }
    }
    None
}

/// Strip a leading start code, if any.
pub fn strip_start_code(data: &[u8]) -> &[u8] {
    match find_start_code(data) {
        Some((0, len)) => &data[len..],
        _ => data,
    }
}

/// Lazy iterator over the NAL unit payloads of an Annex-B buffer.
///
/// Each item starts right after a start code and ends at the byte before the
/// next start code (or the end of the buffer). Bytes before the first start
/// code are skipped, as are empty NAL units.
#[derive(Debug, Clone)]
pub struct NalUnits<'a> {
    rest: &'a [u8],
}

impl<'a> NalUnits<'a> {
    /// Scan `data` for NAL units.
    pub fn new(data: &'a [u8]) -> Self {
        let rest: &[u8] = match find_start_code(data) {
            Some((offset, len)) => &data[offset + len..],
            None => &[],
        };
        Self { rest }
    }
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while !self.rest.is_empty() {
            let data = self.rest;
            let (nal, rest) = match find_start_code(data) {
                Some((offset, len)) => (&data[..offset], &data[offset + len..]),
                None => (data, &[][..]),
            };
            self.rest = rest;
            if !nal.is_empty() {
                return Some(nal);
            }
        }
        None
    }
}

/// Return the first NAL unit of `data` and the remainder, which begins at
/// the following start code.
///
/// Fails with [`BitstreamError::Truncated`] when `data` holds no NAL unit.
pub fn next_nal(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let mut rest = match find_start_code(data) {
        Some((offset, len)) => &data[offset + len..],
        None => return Err(BitstreamError::Truncated.into()),
    };
    loop {
        match find_start_code(rest) {
            Some((0, len)) => rest = &rest[len..],
            Some((offset, _)) => return Ok((&rest[..offset], &rest[offset..])),
            None if rest.is_empty() => return Err(BitstreamError::Truncated.into()),
            None => return Ok((rest, &[][..])),
        }
    }
}

/// Remove emulation prevention bytes (`00 00 03` becomes `00 00`).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte == 3 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        result.push(byte);
    }
    result
}
