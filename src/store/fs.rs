use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crc32fast::Hasher;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::error::{Error, Result};
use crate::store::KeyedStore;

const HEADER_LEN: u64 = 4 + 4 + 4; // key, len, crc32, all little-endian u32.

#[derive(Clone, Copy, Debug)]
struct Slot {
    data_offset: u64,
    len: u32,
}

/// A persistent keyed store backed by an append-only record log, with an
/// in-memory offset index rebuilt from the log on open: durable put/get,
/// single-writer, multi-reader, crash-safe recovery via per-record
/// checksums.
///
/// Record layout: `[key: u32 LE][len: u32 LE][crc32: u32 LE][bytes]`.
#[derive(Clone)]
pub struct FsKeyedStore {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    index: Arc<RwLock<BTreeMap<u32, Slot>>>,
}

impl FsKeyedStore {
    /// Creates a brand-new, empty store file. Fails if one already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
            index: Arc::new(RwLock::new(BTreeMap::new())),
        })
    }

    /// Opens an existing store file and rebuilds the offset index by
    /// scanning it once. Stops at the first record that fails its checksum,
    /// treating the remainder as a crash-torn tail rather than a hard error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut index = BTreeMap::new();
        let mut pos: u64 = 0;
        let len = file.metadata()?.len();

        loop {
            if pos + HEADER_LEN > len {
                break;
            }
            let mut header = [0u8; HEADER_LEN as usize];
            file.seek(SeekFrom::Start(pos))?;
            file.read_exact(&mut header)?;

            let key = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let value_len = u32::from_le_bytes(header[4..8].try_into().unwrap());
            let crc = u32::from_le_bytes(header[8..12].try_into().unwrap());
            let data_offset = pos + HEADER_LEN;

            if data_offset + value_len as u64 > len {
                warn!(%key, "store file has a truncated trailing record, stopping recovery scan");
                break;
            }

            let mut value = vec![0u8; value_len as usize];
            file.read_exact(&mut value)?;

            let mut hasher = Hasher::new();
            hasher.update(&value);
            if hasher.finalize() != crc {
                warn!(%key, "store file has a corrupt trailing record, stopping recovery scan");
                break;
            }

            index.insert(
                key,
                Slot {
                    data_offset,
                    len: value_len,
                },
            );
            pos = data_offset + value_len as u64;
        }

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
            index: Arc::new(RwLock::new(index)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyedStore for FsKeyedStore {
    fn put(&self, key: u32, value: &[u8]) -> Result<()> {
        let mut hasher = Hasher::new();
        hasher.update(value);
        let crc = hasher.finalize();

        let mut file = self.file.lock();
        let pos = file.seek(SeekFrom::End(0))?;

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.extend_from_slice(&key.to_le_bytes());
        header.extend_from_slice(&(value.len() as u32).to_le_bytes());
        header.extend_from_slice(&crc.to_le_bytes());

        file.write_all(&header)?;
        file.write_all(value)?;
        file.flush()?;

        let data_offset = pos + HEADER_LEN;
        self.index.write().insert(
            key,
            Slot {
                data_offset,
                len: value.len() as u32,
            },
        );
        Ok(())
    }

    fn get(&self, key: u32) -> Result<Option<Vec<u8>>> {
        let slot = match self.index.read().get(&key).copied() {
            Some(slot) => slot,
            None => return Ok(None),
        };

        let mut buf = vec![0u8; slot.len as usize];
        let file = self.file.lock();
        file.read_exact_at(&mut buf, slot.data_offset)?;
        Ok(Some(buf))
    }

    fn close(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

/// Acquires an advisory exclusive lock on `path`, creating it if necessary,
/// so that at most one `Index` handle owns a given on-disk directory at a
/// time. Dropping the returned file releases the lock.
pub fn lock_directory(path: impl AsRef<Path>) -> Result<File> {
    use fs2::FileExt as _;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    file.try_lock_exclusive().map_err(|e| {
        Error::Serialisation(format!("directory is locked by another index handle: {e}"))
    })?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyedStore::create(dir.path().join("store.db")).unwrap();
        store.put(3, b"hello").unwrap();
        store.put(9, b"world").unwrap();
        assert_eq!(store.get(3).unwrap().unwrap(), b"hello".to_vec());
        assert_eq!(store.get(9).unwrap().unwrap(), b"world".to_vec());
        assert!(store.get(4).unwrap().is_none());
    }

    #[test]
    fn reopen_recovers_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = FsKeyedStore::create(&path).unwrap();
            store.put(1, b"a").unwrap();
            store.put(2, b"b").unwrap();
            store.close().unwrap();
        }

        let reopened = FsKeyedStore::open(&path).unwrap();
        assert_eq!(reopened.get(1).unwrap().unwrap(), b"a".to_vec());
        assert_eq!(reopened.get(2).unwrap().unwrap(), b"b".to_vec());
    }

    #[test]
    fn upsert_keeps_latest_value_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = FsKeyedStore::create(&path).unwrap();
            store.put(1, b"first").unwrap();
            store.put(1, b"second").unwrap();
        }

        let reopened = FsKeyedStore::open(&path).unwrap();
        assert_eq!(reopened.get(1).unwrap().unwrap(), b"second".to_vec());
    }

    #[test]
    fn recovery_stops_at_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = FsKeyedStore::create(&path).unwrap();
            store.put(1, b"good").unwrap();
        }

        // Simulate a crash mid-write: append a header that promises more
        // bytes than are actually present.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&99u32.to_le_bytes()).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(&0u32.to_le_bytes()).unwrap();
            file.write_all(b"short").unwrap();
        }

        let reopened = FsKeyedStore::open(&path).unwrap();
        assert_eq!(reopened.get(1).unwrap().unwrap(), b"good".to_vec());
        assert!(reopened.get(99).unwrap().is_none());
    }

    #[test]
    fn directory_lock_excludes_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("bigsi.lock");
        let _first = lock_directory(&lock_path).unwrap();
        assert!(lock_directory(&lock_path).is_err());
    }
}
