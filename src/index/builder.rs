use std::collections::HashMap;

use tracing::{info, instrument};

use crate::bitvector::BitVector;
use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::store::KeyedStore;
use crate::MAX_COLOURS;

use super::{Index, State};

impl<S: KeyedStore> Index<S> {
    /// Inserts a batch of `(sequence id, bloom filter)` pairs, assigning
    /// each a monotonically increasing colour. Iteration order over `batch`
    /// is the caller's `HashMap`'s, unspecified by this interface, so colour
    /// assignment is deterministic only for a given iteration order.
    ///
    /// Not required to be atomic across the batch: entries processed before
    /// a per-entry rejection remain in the index.
    #[instrument(skip_all, fields(batch_len = batch.len()))]
    pub fn insert(&mut self, batch: HashMap<String, BloomFilter>) -> Result<()> {
        if self.state != State::Building {
            return Err(Error::AlreadyIndexed);
        }

        for (id, bloom) in batch {
            if self.id_to_colour.contains_key(&id) {
                return Err(Error::DuplicateId(id));
            }
            if bloom.num_hashes() != self.num_hashes || bloom.bitvector().capacity() != self.num_bits
            {
                return Err(Error::IncompatibleFilter);
            }
            if bloom.bitvector().popcount() == 0 {
                return Err(Error::EmptyFilter);
            }
            if self.num_colours >= MAX_COLOURS {
                return Err(Error::ColourOverflow(MAX_COLOURS));
            }

            let colour = self.num_colours;
            self.staged_bits.push(bloom.bitvector().clone());
            self.staged_ids.push(id.clone());
            self.id_to_colour.insert(id, colour);
            self.num_colours += 1;
        }

        Ok(())
    }

    /// Transposes the staged, colour-ordered Bloom-filter bit vectors into
    /// the row-store, writes the colour-store, flushes metadata, and
    /// transitions to `Indexed`. Releases the staged arrays and the
    /// duplicate-detection map.
    #[instrument(skip(self), fields(num_bits = self.num_bits, num_colours = self.num_colours))]
    pub fn finalise(&mut self) -> Result<()> {
        if self.state != State::Building {
            return Err(Error::AlreadyIndexed);
        }
        if self.num_colours < 1 {
            return Err(Error::Unindexed);
        }

        for row_idx in 0..self.num_bits {
            let mut row = BitVector::new(self.num_colours)?;
            for (colour, bits) in self.staged_bits.iter().enumerate() {
                if bits.get(row_idx)? == 1 {
                    row.set(colour as u32, 1)?;
                }
            }
            self.row_store.put(row_idx, &row.encode_to_vec())?;
        }

        for (colour, id) in self.staged_ids.iter().enumerate() {
            let mut value = id.as_bytes().to_vec();
            value.push(0); // NUL-terminated, matching the row-store's byte-slice values.
            self.colour_store.put(colour as u32, &value)?;
        }

        self.staged_bits = Vec::new();
        self.staged_ids = Vec::new();
        self.id_to_colour = HashMap::new();

        let meta = Metadata::new(
            self.directory.display().to_string(),
            self.num_bits,
            self.num_hashes,
            self.num_colours,
        );
        meta.save(self.directory.join(crate::metadata::METADATA_BASENAME))?;

        self.state = State::Indexed;
        info!("index finalised");
        Ok(())
    }
}
