use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const METADATA_BASENAME: &str = "bigsi.meta";
pub const ROW_STORE_BASENAME: &str = "bigsi.bv.db";
pub const COLOUR_STORE_BASENAME: &str = "bigsi.col.db";

/// The on-disk descriptor written once by `finalise` and never mutated
/// afterwards. Field names are pinned with `serde(rename)` to the original
/// camelCase layout so the TOML file stays self-describing independent of
/// Rust's naming convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub db_directory: String,
    pub metadata: String,
    pub bitvectors: String,
    pub colours: String,
    #[serde(rename = "numBits")]
    pub num_bits: u32,
    #[serde(rename = "numHashes")]
    pub num_hashes: u32,
    #[serde(rename = "colourIterator")]
    pub colour_iterator: u32,
}

impl Metadata {
    pub fn new(db_directory: String, num_bits: u32, num_hashes: u32, colour_iterator: u32) -> Self {
        Self {
            db_directory,
            metadata: METADATA_BASENAME.to_string(),
            bitvectors: ROW_STORE_BASENAME.to_string(),
            colours: COLOUR_STORE_BASENAME.to_string(),
            num_bits,
            num_hashes,
            colour_iterator,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text =
            toml::to_string_pretty(self).map_err(|e| Error::Serialisation(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Loads and validates a metadata file. Rejects any missing field (via
    /// the usual deserialisation failure) or non-positive numeric field.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let meta: Metadata =
            toml::from_str(&text).map_err(|e| Error::Serialisation(e.to_string()))?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<()> {
        if self.db_directory.is_empty()
            || self.metadata.is_empty()
            || self.bitvectors.is_empty()
            || self.colours.is_empty()
        {
            return Err(Error::Serialisation(
                "metadata has an empty string field".into(),
            ));
        }
        if self.num_bits == 0 {
            return Err(Error::Serialisation("numBits must be > 0".into()));
        }
        if self.num_hashes == 0 {
            return Err(Error::Serialisation("numHashes must be > 0".into()));
        }
        if self.colour_iterator == 0 {
            return Err(Error::Serialisation("colourIterator must be >= 1".into()));
        }
        Ok(())
    }
}
