pub mod bitvector;
pub mod bloom;
pub mod error;
pub mod index;
pub mod metadata;
pub mod store;

pub use bitvector::BitVector;
pub use bloom::BloomFilter;
pub use error::{Error, Result};
pub use index::Index;

/// Compile-time upper bound on the number of colours an index can hold.
/// Exceeding it fails `Index::insert` with `Error::ColourOverflow`.
pub const MAX_COLOURS: u32 = 1 << 24;
