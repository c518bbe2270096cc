use crate::bitvector::BitVector;
use crate::error::{Error, Result};

/// A Bloom filter handed to the index by an external sketcher: an owned bit
/// vector plus the hash count used to build it. The index only ever reads
/// `num_hashes`, `bitvector().capacity()`, and clones the bit vector. It
/// never mutates a `BloomFilter` it receives.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bitvector: BitVector,
    num_hashes: u32,
}

impl BloomFilter {
    pub fn new(bitvector: BitVector, num_hashes: u32) -> Result<Self> {
        if num_hashes == 0 {
            return Err(Error::NullArgument);
        }
        Ok(Self {
            bitvector,
            num_hashes,
        })
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn bitvector(&self) -> &BitVector {
        &self.bitvector
    }
}
