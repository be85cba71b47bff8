//! Per-location manifest.
//!
//! Every location directory carries a small CBOR manifest holding the
//! installation salt and an AEAD key-check blob. The salt is public; the
//! key-check is a sealed constant that lets `open` distinguish a wrong
//! device secret from ledger corruption before any block is touched.

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    block,
    device_key::{CacheKey, SALT_LEN},
    error::CacheError,
};

/// Manifest file name inside a location directory.
pub const MANIFEST_FILE: &str = "keywell.manifest";

/// Current manifest format version.
const MANIFEST_VERSION: u32 = 1;

/// Reserved sequence number for the key-check blob.
const KEY_CHECK_SEQ: u64 = u64::MAX;

/// Plaintext sealed into the key-check blob.
const KEY_CHECK_VALUE: &[u8] = b"keywell key check";

/// On-disk manifest for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version; unknown versions are corruption.
    pub version: u32,
    /// Per-installation salt for cache-key derivation.
    pub salt: [u8; SALT_LEN],
    /// Sealed constant verifying that a derived key matches this ledger.
    pub key_check: Vec<u8>,
}

impl Manifest {
    /// Build a fresh manifest binding `salt` to `key`.
    pub fn create(salt: [u8; SALT_LEN], key: &CacheKey) -> Result<Self, CacheError> {
        let key_check = block::seal(key, KEY_CHECK_SEQ, 0, KEY_CHECK_VALUE)?;
        Ok(Self { version: MANIFEST_VERSION, salt, key_check })
    }

    /// True if `key` opens this manifest's key-check blob.
    pub fn verifies(&self, key: &CacheKey) -> bool {
        match block::open(key, KEY_CHECK_SEQ, 0, &self.key_check) {
            Ok(value) => value.as_slice() == KEY_CHECK_VALUE,
            Err(_) => false,
        }
    }
}

/// Read the manifest from a location directory, if one exists.
pub fn read(dir: &Path) -> Result<Option<Manifest>, CacheError> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io("reading manifest", &e)),
    };

    let manifest: Manifest = ciborium::from_reader(bytes.as_slice())
        .map_err(|e| CacheError::Corrupt { detail: format!("manifest decode: {e}") })?;

    if manifest.version != MANIFEST_VERSION {
        return Err(CacheError::Corrupt {
            detail: format!("unsupported manifest version {}", manifest.version),
        });
    }

    Ok(Some(manifest))
}

/// Write the manifest into a location directory via tmp-file + rename.
pub fn write(dir: &Path, manifest: &Manifest) -> Result<(), CacheError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(manifest, &mut bytes)
        .map_err(|e| CacheError::Io { detail: format!("manifest encode: {e}") })?;

    let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
    fs::write(&tmp, &bytes).map_err(|e| CacheError::io("writing manifest", &e))?;
    fs::rename(&tmp, dir.join(MANIFEST_FILE))
        .map_err(|e| CacheError::io("committing manifest", &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use keywell_core::DeviceSecret;

    use super::*;
    use crate::device_key::derive_cache_key;

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let salt = [3u8; SALT_LEN];
        let key = derive_cache_key(&DeviceSecret::new(b"secret".to_vec()), &salt);

        let manifest = Manifest::create(salt, &key).unwrap();
        write(dir.path(), &manifest).unwrap();

        let loaded = read(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.salt, salt);
        assert!(loaded.verifies(&key));
    }

    #[test]
    fn missing_manifest_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let salt = [3u8; SALT_LEN];
        let key = derive_cache_key(&DeviceSecret::new(b"secret".to_vec()), &salt);
        let wrong = derive_cache_key(&DeviceSecret::new(b"other".to_vec()), &salt);

        let manifest = Manifest::create(salt, &key).unwrap();
        assert!(!manifest.verifies(&wrong));
    }

    #[test]
    fn garbage_manifest_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"not cbor at all").unwrap();

        assert!(matches!(read(dir.path()), Err(CacheError::Corrupt { .. })));
    }
}
