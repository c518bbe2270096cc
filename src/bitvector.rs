use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// A fixed-capacity sequence of bits with a cached population count.
///
/// Bit `i` lives in byte `i / 8`, at bit position `i % 8` counting from the
/// least-significant bit. That layout is an internal choice but is used
/// consistently everywhere a `BitVector` is stored or compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    capacity: u32,
    popcount: u32,
    buf: Vec<u8>,
}

fn byte_len(capacity: u32) -> usize {
    ((capacity as usize) + 7) / 8
}

impl BitVector {
    /// Creates a new, all-zero bit vector. Fails if `capacity == 0`.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::NullArgument);
        }
        Ok(Self {
            capacity,
            popcount: 0,
            buf: vec![0u8; byte_len(capacity)],
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn popcount(&self) -> u32 {
        self.popcount
    }

    fn check_index(&self, i: u32) -> Result<()> {
        if i >= self.capacity {
            return Err(Error::OutOfRange {
                index: i,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn get(&self, i: u32) -> Result<u8> {
        self.check_index(i)?;
        let byte = self.buf[(i / 8) as usize];
        Ok((byte >> (i % 8)) & 1)
    }

    /// Sets bit `i` to `v` (0 or 1). Updates the cached popcount only when
    /// the bit actually changed, keeping set/clear idempotent.
    pub fn set(&mut self, i: u32, v: u8) -> Result<()> {
        self.check_index(i)?;
        let byte_idx = (i / 8) as usize;
        let mask = 1u8 << (i % 8);
        let was_set = self.buf[byte_idx] & mask != 0;
        let want_set = v != 0;

        if want_set && !was_set {
            self.buf[byte_idx] |= mask;
            self.popcount += 1;
        } else if !want_set && was_set {
            self.buf[byte_idx] &= !mask;
            self.popcount -= 1;
        }
        Ok(())
    }

    fn check_capacity(&self, other: u32) -> Result<()> {
        if self.capacity != other {
            return Err(Error::CapacityMismatch {
                expected: self.capacity,
                actual: other,
            });
        }
        Ok(())
    }

    /// `dst = a | b`. All three must share the same capacity.
    pub fn or_into(dst: &mut BitVector, a: &BitVector, b: &BitVector) -> Result<()> {
        dst.check_capacity(a.capacity)
            .map_err(|e| Error::OrFail(e.to_string()))?;
        dst.check_capacity(b.capacity)
            .map_err(|e| Error::OrFail(e.to_string()))?;

        let mut popcount = 0u32;
        for i in 0..dst.buf.len() {
            dst.buf[i] = a.buf[i] | b.buf[i];
            popcount += dst.buf[i].count_ones();
        }
        dst.popcount = popcount;
        Ok(())
    }

    /// `dst &= src`. Both must share the same capacity.
    pub fn and_in_place(dst: &mut BitVector, src: &BitVector) -> Result<()> {
        dst.check_capacity(src.capacity)
            .map_err(|e| Error::AndFail(e.to_string()))?;

        let mut popcount = 0u32;
        for i in 0..dst.buf.len() {
            dst.buf[i] &= src.buf[i];
            popcount += dst.buf[i].count_ones();
        }
        dst.popcount = popcount;
        Ok(())
    }

    /// Overwrites `self` with `other`'s bits. Used by the query fold to seed
    /// the (already empty, correctly-sized) result with the first hit row
    /// without requiring a separate all-zero operand.
    pub(crate) fn assign_from(&mut self, other: &BitVector) -> Result<()> {
        self.check_capacity(other.capacity)?;
        self.buf.copy_from_slice(&other.buf);
        self.popcount = other.popcount;
        Ok(())
    }

    /// Serialises as little-endian `capacity` (u32) followed by the raw byte
    /// buffer. Popcount is never stored.
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u32_le(self.capacity);
        out.put_slice(&self.buf);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.buf.len());
        self.encode(&mut out);
        out
    }

    /// Deserialises a bit vector, recomputing popcount rather than trusting
    /// any stored value.
    pub fn decode(mut src: impl Buf) -> Result<Self> {
        if src.remaining() < 4 {
            return Err(Error::Serialisation(
                "bit vector buffer too short for capacity header".into(),
            ));
        }
        let capacity = src.get_u32_le();
        if capacity == 0 {
            return Err(Error::Serialisation("bit vector capacity is zero".into()));
        }
        let expected_len = byte_len(capacity);
        if src.remaining() != expected_len {
            return Err(Error::Serialisation(format!(
                "bit vector buffer has {} bytes, expected {}",
                src.remaining(),
                expected_len
            )));
        }

        let mut buf = vec![0u8; expected_len];
        src.copy_to_slice(&mut buf);
        let popcount = buf.iter().map(|b| b.count_ones()).sum();

        Ok(Self {
            capacity,
            popcount,
            buf,
        })
    }
}
