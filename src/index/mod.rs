mod builder;
mod query;

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::bitvector::BitVector;
use crate::error::{Error, Result};
use crate::metadata::{
    Metadata, COLOUR_STORE_BASENAME, METADATA_BASENAME, ROW_STORE_BASENAME,
};
use crate::store::fs::{lock_directory, FsKeyedStore};
use crate::store::mem::MemKeyedStore;
use crate::store::KeyedStore;

/// `Closed` is terminal: no method on `Index` accepts a handle in this state
/// except `close` itself, which is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Building,
    Indexed,
    Closed,
}

/// The BIGSI core: a bit-matrix mapping Bloom-filter bit positions (rows) to
/// colour sets (columns), built incrementally and persisted as a row-store,
/// a colour-store, and a metadata descriptor.
///
/// Generic over the keyed-store implementation so tests can swap in
/// [`crate::store::mem::MemKeyedStore`]; production code goes through
/// [`Index::open_new`] / [`Index::open_existing`], which are specialised to
/// the persistent [`FsKeyedStore`].
pub struct Index<S: KeyedStore> {
    directory: PathBuf,
    num_bits: u32,
    num_hashes: u32,
    num_colours: u32,
    state: State,
    row_store: S,
    colour_store: S,
    lock_file: Option<File>,

    // Transient build-time state, released at `finalise`.
    staged_bits: Vec<BitVector>,
    staged_ids: Vec<String>,
    id_to_colour: HashMap<String, u32>,
}

impl<S: KeyedStore> Index<S> {
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn num_colours(&self) -> u32 {
        self.num_colours
    }

    pub fn is_indexed(&self) -> bool {
        self.state == State::Indexed
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn require_indexed(&self) -> Result<()> {
        if self.state != State::Indexed {
            return Err(Error::Unindexed);
        }
        Ok(())
    }

    /// Flushes and closes both stores and releases the directory lock.
    /// Idempotent: calling `close` on an already-closed index is a no-op.
    #[instrument(skip(self), fields(directory = %self.directory.display()))]
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.row_store.close()?;
        self.colour_store.close()?;
        self.lock_file = None; // Dropping releases the advisory lock.
        self.state = State::Closed;
        info!("index closed");
        Ok(())
    }
}

/// Builds the three on-disk paths for a BIGSI directory.
fn paths(directory: &Path) -> (PathBuf, PathBuf, PathBuf) {
    (
        directory.join(METADATA_BASENAME),
        directory.join(ROW_STORE_BASENAME),
        directory.join(COLOUR_STORE_BASENAME),
    )
}

impl Index<FsKeyedStore> {
    /// Opens a brand-new index in `Building` state, backed by the persistent
    /// store. Fails if the directory doesn't exist, isn't writable, or
    /// already contains index files.
    #[instrument(skip_all, fields(directory = %directory.as_ref().display(), num_bits, num_hashes))]
    pub fn open_new(directory: impl AsRef<Path>, num_bits: u32, num_hashes: u32) -> Result<Self> {
        if num_bits == 0 || num_hashes == 0 {
            return Err(Error::NullArgument);
        }

        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", directory.display()),
            )));
        }

        let (meta_path, row_path, colour_path) = paths(&directory);
        if meta_path.exists() || row_path.exists() || colour_path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already contains an index", directory.display()),
            )));
        }

        let lock_file = lock_directory(directory.join("bigsi.lock"))?;
        let row_store = FsKeyedStore::create(&row_path)?;
        let colour_store = FsKeyedStore::create(&colour_path)?;

        info!("opened new index");
        Ok(Index {
            directory,
            num_bits,
            num_hashes,
            num_colours: 0,
            state: State::Building,
            row_store,
            colour_store,
            lock_file: Some(lock_file),
            staged_bits: Vec::new(),
            staged_ids: Vec::new(),
            id_to_colour: HashMap::new(),
        })
    }

    /// Opens a previously-finalised index for querying. Validates the
    /// metadata descriptor and runs a self-check read against the last row
    /// to confirm the row-store is readable.
    #[instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub fn open_existing(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let (meta_path, row_path, colour_path) = paths(&directory);

        let meta = Metadata::load(&meta_path)?;
        let lock_file = lock_directory(directory.join("bigsi.lock"))?;
        let row_store = FsKeyedStore::open(&row_path)?;
        let colour_store = FsKeyedStore::open(&colour_path)?;

        if meta.num_bits > 0 {
            // Self-check: confirm the row-store is actually readable. A
            // miss here is fine (the last row may legitimately be all-zero
            // and thus absent); only an I/O failure is fatal.
            row_store.get(meta.num_bits - 1)?;
        }

        info!(num_colours = meta.colour_iterator, "opened existing index");
        Ok(Index {
            directory,
            num_bits: meta.num_bits,
            num_hashes: meta.num_hashes,
            num_colours: meta.colour_iterator,
            state: State::Indexed,
            row_store,
            colour_store,
            lock_file: Some(lock_file),
            staged_bits: Vec::new(),
            staged_ids: Vec::new(),
            id_to_colour: HashMap::new(),
        })
    }
}

impl Index<MemKeyedStore> {
    /// Opens a new index backed entirely by in-memory stores. Metadata is
    /// still mirrored to `directory` on `finalise` so the on-disk descriptor
    /// format gets the same exercise as the persistent path; used by tests
    /// and by callers who want a disposable, process-local index.
    pub fn open_new_in_memory(
        directory: impl AsRef<Path>,
        num_bits: u32,
        num_hashes: u32,
    ) -> Result<Self> {
        if num_bits == 0 || num_hashes == 0 {
            return Err(Error::NullArgument);
        }
        Ok(Index {
            directory: directory.as_ref().to_path_buf(),
            num_bits,
            num_hashes,
            num_colours: 0,
            state: State::Building,
            row_store: MemKeyedStore::new(),
            colour_store: MemKeyedStore::new(),
            lock_file: None,
            staged_bits: Vec::new(),
            staged_ids: Vec::new(),
            id_to_colour: HashMap::new(),
        })
    }
}
