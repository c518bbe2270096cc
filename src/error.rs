use thiserror::Error;

/// Every error kind a BIGSI index can surface. Callers match on variant
/// rather than string-sniffing a message; none of these are retried or
/// downgraded inside the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("required argument was null or empty")]
    NullArgument,

    #[error("index {index} out of range for capacity {capacity}")]
    OutOfRange { index: u32, capacity: u32 },

    #[error("capacity mismatch: expected {expected}, got {actual}")]
    CapacityMismatch { expected: u32, actual: u32 },

    #[error("sequence id already inserted: {0}")]
    DuplicateId(String),

    #[error("bloom filter incompatible with index parameters")]
    IncompatibleFilter,

    #[error("bloom filter has popcount zero")]
    EmptyFilter,

    #[error("inserting this colour would exceed MAX_COLOURS ({0})")]
    ColourOverflow(u32),

    #[error("operation requires a finalised (indexed) index")]
    Unindexed,

    #[error("finalise called on an already-indexed index")]
    AlreadyIndexed,

    #[error("query supplied {actual} hashes, index expects {expected}")]
    HashMismatch { expected: u32, actual: u32 },

    #[error("result bit vector has capacity {actual}, expected {expected}")]
    ResultMismatch { expected: u32, actual: u32 },

    #[error("colour store has no entry for key {0}")]
    NotFound(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialisation error: {0}")]
    Serialisation(String),

    #[error("bitwise OR failed: {0}")]
    OrFail(String),

    #[error("bitwise AND failed: {0}")]
    AndFail(String),
}

pub type Result<T> = std::result::Result<T, Error>;
