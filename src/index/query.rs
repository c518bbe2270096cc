use tracing::instrument;

use crate::bitvector::BitVector;
use crate::error::{Error, Result};
use crate::store::KeyedStore;

use super::Index;

impl<S: KeyedStore> Index<S> {
    /// Folds a set of query hashes through the row-store, ANDing the rows
    /// hit in turn into `result`, which must arrive empty and sized to
    /// `num_colours`. On success, `result`'s set bits are exactly the
    /// colours whose Bloom filter has every queried hash's bit set.
    ///
    /// Returns as soon as the running result (or a missed/all-zero row)
    /// goes empty, without reading any further rows.
    #[instrument(skip_all, fields(num_hashes = hashes.len()))]
    pub fn query(&self, hashes: &[u64], result: &mut BitVector) -> Result<()> {
        self.require_indexed()?;

        if hashes.len() as u32 != self.num_hashes {
            return Err(Error::HashMismatch {
                expected: self.num_hashes,
                actual: hashes.len() as u32,
            });
        }
        if result.capacity() != self.num_colours {
            return Err(Error::ResultMismatch {
                expected: self.num_colours,
                actual: result.capacity(),
            });
        }

        let mut rows_hit = 0u32;
        for &h in hashes {
            let row_idx = (h % self.num_bits as u64) as u32;

            let row_bytes = self.row_store.get(row_idx)?;
            let row = match row_bytes {
                None => {
                    // Missing row == all-zero row: the result becomes empty
                    // regardless of any earlier hits, and we return at once.
                    let zero = BitVector::new(result.capacity())?;
                    result.assign_from(&zero)?;
                    return Ok(());
                }
                Some(bytes) => BitVector::decode(&bytes[..])?,
            };

            if rows_hit == 0 {
                result.assign_from(&row)?;
            } else {
                BitVector::and_in_place(result, &row)?;
            }
            rows_hit += 1;

            if result.popcount() == 0 {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Resolves a colour back to the sequence id it was assigned at insert
    /// time.
    pub fn lookup_colour(&self, colour: u32) -> Result<String> {
        self.require_indexed()?;

        if colour >= self.num_colours {
            return Err(Error::OutOfRange {
                index: colour,
                capacity: self.num_colours,
            });
        }

        let bytes = self
            .colour_store
            .get(colour)?
            .ok_or(Error::NotFound(colour))?;

        let without_nul = match bytes.last() {
            Some(0) => &bytes[..bytes.len() - 1],
            _ => &bytes[..],
        };

        String::from_utf8(without_nul.to_vec())
            .map_err(|e| Error::Serialisation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::bloom::BloomFilter;
    use crate::store::mem::{CountingKeyedStore, MemKeyedStore};

    fn bloom_with_bits(num_bits: u32, num_hashes: u32, bits: &[u32]) -> BloomFilter {
        let mut bv = BitVector::new(num_bits).unwrap();
        for &b in bits {
            bv.set(b, 1).unwrap();
        }
        BloomFilter::new(bv, num_hashes).unwrap()
    }

    #[test]
    fn query_before_finalise_fails() {
        let dir = tempfile::tempdir().unwrap();
        let idx = crate::index::Index::open_new_in_memory(dir.path(), 16, 2).unwrap();
        let mut result = BitVector::new(1).unwrap();
        assert!(matches!(
            idx.query(&[3, 9], &mut result),
            Err(Error::Unindexed)
        ));
    }

    #[test]
    fn single_insert_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = crate::index::Index::open_new_in_memory(dir.path(), 16, 2).unwrap();

        let mut batch = HashMap::new();
        batch.insert("seqA".to_string(), bloom_with_bits(16, 2, &[3, 9]));
        idx.insert(batch).unwrap();
        idx.finalise().unwrap();

        let mut result = BitVector::new(1).unwrap();
        idx.query(&[3, 9], &mut result).unwrap();
        assert_eq!(result.popcount(), 1);
        assert_eq!(result.get(0).unwrap(), 1);
        assert_eq!(idx.lookup_colour(0).unwrap(), "seqA");
    }

    #[test]
    fn two_inserts_disjoint_hits() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = crate::index::Index::open_new_in_memory(dir.path(), 16, 2).unwrap();

        let mut batch = HashMap::new();
        batch.insert("seqA".to_string(), bloom_with_bits(16, 2, &[3, 9]));
        batch.insert("seqB".to_string(), bloom_with_bits(16, 2, &[4, 9]));
        idx.insert(batch).unwrap();
        idx.finalise().unwrap();

        let colour_a = if idx.lookup_colour(0).unwrap() == "seqA" { 0 } else { 1 };
        let colour_b = 1 - colour_a;

        let mut result = BitVector::new(2).unwrap();
        idx.query(&[3, 9], &mut result).unwrap();
        assert_eq!(result.popcount(), 1);
        assert_eq!(result.get(colour_a).unwrap(), 1);
        assert_eq!(result.get(colour_b).unwrap(), 0);

        let mut result = BitVector::new(2).unwrap();
        idx.query(&[4, 9], &mut result).unwrap();
        assert_eq!(result.popcount(), 1);
        assert_eq!(result.get(colour_b).unwrap(), 1);

        let mut result = BitVector::new(2).unwrap();
        assert!(matches!(
            idx.query(&[9], &mut result),
            Err(Error::HashMismatch { .. })
        ));

        let mut result = BitVector::new(2).unwrap();
        idx.query(&[9, 9], &mut result).unwrap();
        assert_eq!(result.popcount(), 2);
    }

    #[test]
    fn early_termination_on_all_zero_row_stops_reads() {
        let mut idx = crate::index::Index {
            directory: std::env::temp_dir(),
            num_bits: 16,
            num_hashes: 3,
            num_colours: 0,
            state: crate::index::State::Building,
            row_store: CountingKeyedStore::new(),
            colour_store: CountingKeyedStore::new(),
            lock_file: None,
            staged_bits: Vec::new(),
            staged_ids: Vec::new(),
            id_to_colour: HashMap::new(),
        };

        let mut batch = HashMap::new();
        batch.insert("seqA".to_string(), bloom_with_bits(16, 3, &[1, 2, 3]));
        batch.insert("seqB".to_string(), bloom_with_bits(16, 3, &[1, 2, 4]));
        batch.insert("seqC".to_string(), bloom_with_bits(16, 3, &[1, 5, 6]));
        idx.insert(batch).unwrap();
        idx.finalise().unwrap();

        // Hash 1 hits a populated row; hash 15 hits an all-zero (unwritten)
        // row; hash 2 would hit another populated row but must never be
        // read because the fold already went empty at hash 15.
        let mut result = BitVector::new(3).unwrap();
        idx.query(&[1, 15, 2], &mut result).unwrap();
        assert_eq!(result.popcount(), 0);
        assert_eq!(idx.row_store.reads(), 2);
    }

    #[test]
    fn missing_row_is_treated_as_empty_result() {
        // Construct an index whose row-store only has row 3 written, to
        // exercise the "row-store miss == all-zero row" branch directly
        // (finalise's recommended write-every-row policy means a miss never
        // occurs through the normal insert/finalise path).
        let row_store = MemKeyedStore::new();
        let mut row3 = BitVector::new(2).unwrap();
        row3.set(0, 1).unwrap();
        row_store.put(3, &row3.encode_to_vec()).unwrap();

        let idx = crate::index::Index {
            directory: std::env::temp_dir(),
            num_bits: 16,
            num_hashes: 2,
            num_colours: 2,
            state: crate::index::State::Indexed,
            row_store,
            colour_store: MemKeyedStore::new(),
            lock_file: None,
            staged_bits: Vec::new(),
            staged_ids: Vec::new(),
            id_to_colour: HashMap::new(),
        };

        let mut result = BitVector::new(2).unwrap();
        idx.query(&[3, 9], &mut result).unwrap();
        assert_eq!(result.popcount(), 0);
    }

    #[test]
    fn lookup_colour_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = crate::index::Index::open_new_in_memory(dir.path(), 16, 2).unwrap();
        let mut batch = HashMap::new();
        batch.insert("seqA".to_string(), bloom_with_bits(16, 2, &[3, 9]));
        idx.insert(batch).unwrap();
        idx.finalise().unwrap();

        assert!(matches!(
            idx.lookup_colour(1),
            Err(Error::OutOfRange { .. })
        ));
        assert!(idx.lookup_colour(0).is_ok());
    }

    #[test]
    fn result_capacity_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = crate::index::Index::open_new_in_memory(dir.path(), 16, 2).unwrap();
        let mut batch = HashMap::new();
        batch.insert("seqA".to_string(), bloom_with_bits(16, 2, &[3, 9]));
        idx.insert(batch).unwrap();
        idx.finalise().unwrap();

        let mut result = BitVector::new(2).unwrap();
        assert!(matches!(
            idx.query(&[3, 9], &mut result),
            Err(Error::ResultMismatch { .. })
        ));
    }
}
