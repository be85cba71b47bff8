//! The encrypted random ledger.
//!
//! `CacheStore` owns a set of location directories, each holding sealed
//! block files plus a manifest. Blocks are consumed oldest-first by global
//! sequence number; a consumed byte is deleted from disk before the call
//! returns and can never be produced again.
//!
//! # Crash behavior
//!
//! - Appends write through a tmp file + rename; an interrupted append leaves
//!   a stray `.tmp` that is swept on open and never counted.
//! - Partial consumption rewrites the block remainder under a higher
//!   intra-block offset before removing the original file. If both files
//!   survive a crash, open keeps the highest offset and deletes the rest, so
//!   a crash can drop bytes but never resurrect consumed ones.
//! - Secret rotation stages a fully re-encrypted copy of every location, then
//!   commits through a marker file. Open rolls an interrupted rotation
//!   forward (marker present) or back (staging without marker); the ledger is
//!   always wholly under one key.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use zeroize::Zeroizing;

use keywell_core::{DeviceSecret, LocationConfig};

use crate::{
    block::{self, SEALED_OVERHEAD, block_file_name, parse_block_file_name},
    device_key::{CacheKey, SALT_LEN, derive_cache_key},
    error::CacheError,
    manifest::{self, MANIFEST_FILE, Manifest},
};

/// Persisted total-downloaded counter, kept in the primary location.
const COUNTER_FILE: &str = "keywell.counter";

/// Staging directory used during secret rotation.
const STAGING_DIR: &str = "staging";

/// Rotation commit marker, kept in the primary location.
const ROTATE_MARKER: &str = "rotation.commit";

/// One configured storage location.
struct Location {
    id: String,
    dir: PathBuf,
    capacity: u64,
    /// Unconsumed pool bytes currently stored here.
    used: u64,
}

impl Location {
    fn headroom(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

/// In-memory index entry for one block file.
#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    location: usize,
    /// Intra-block offset of the first unconsumed byte (part of the name).
    offset: u64,
    /// Unconsumed plaintext bytes in the file.
    len: u64,
}

/// Encrypted, capacity-bounded, exactly-once random ledger.
///
/// All mutating operations take `&mut self`; callers serialize access with a
/// single lock (see `keywell-client`). Nothing here blocks on the network.
pub struct CacheStore {
    locations: Vec<Location>,
    max_num_cached_bytes: u64,
    salt: [u8; SALT_LEN],
    key: CacheKey,
    /// Block index, ordered by sequence number (consumption order).
    blocks: BTreeMap<u64, BlockEntry>,
    next_seq: u64,
    total_downloaded: u64,
}

impl CacheStore {
    /// Open or create the ledger across the configured locations.
    ///
    /// Creation seeds a fresh installation salt and writes a manifest to
    /// every location. Opening an existing ledger verifies the derived key
    /// against the manifest key-check before any block is read.
    ///
    /// # Errors
    ///
    /// - `Authentication` if `secret` does not unlock existing data.
    /// - `Corrupt` on manifest damage, salt mismatch between locations,
    ///   unrecognized files, or impossible block sizes. Corruption at open is
    ///   fatal to the instance; there is no partial-recovery mode.
    /// - `Io` on filesystem failures.
    pub fn open(
        location_configs: &[LocationConfig],
        secret: &DeviceSecret,
        max_num_cached_bytes: u64,
    ) -> Result<Self, CacheError> {
        if location_configs.is_empty() {
            return Err(CacheError::Io { detail: "no storage locations configured".into() });
        }

        let mut locations = Vec::with_capacity(location_configs.len());
        for config in location_configs {
            fs::create_dir_all(&config.path)
                .map_err(|e| CacheError::io("creating location directory", &e))?;
            locations.push(Location {
                id: config.id.clone(),
                dir: config.path.clone(),
                capacity: config.available_size,
                used: 0,
            });
        }

        recover_rotation(&locations)?;

        let (salt, key, manifest) = match manifest::read(&locations[0].dir)? {
            Some(existing) => {
                let key = derive_cache_key(secret, &existing.salt);
                if !existing.verifies(&key) {
                    return Err(CacheError::Authentication);
                }
                (existing.salt, key, existing)
            },
            None => {
                let mut salt = [0u8; SALT_LEN];
                getrandom::fill(&mut salt)
                    .map_err(|e| CacheError::Io { detail: format!("salt generation: {e}") })?;
                let key = derive_cache_key(secret, &salt);
                let manifest = Manifest::create(salt, &key)?;
                (salt, key, manifest)
            },
        };

        // Every location carries the same manifest; a missing one (fresh
        // location added to an existing config) is filled in, a divergent
        // salt means the directory belongs to another installation.
        for location in &locations {
            match manifest::read(&location.dir)? {
                Some(other) if other.salt == salt => {},
                Some(_) => {
                    return Err(CacheError::Corrupt {
                        detail: format!("location {:?} has a foreign manifest", location.id),
                    });
                },
                None => manifest::write(&location.dir, &manifest)?,
            }
        }

        let mut store = Self {
            locations,
            max_num_cached_bytes,
            salt,
            key,
            blocks: BTreeMap::new(),
            next_seq: 0,
            total_downloaded: 0,
        };
        store.scan_locations()?;
        store.total_downloaded = read_counter(&store.locations[0].dir)?.unwrap_or_else(|| {
            // Counter lost: the remaining pool is the provable lower bound.
            store.blocks.values().map(|b| b.len).sum()
        });
        Ok(store)
    }

    /// Index every block file on disk, resolving crash leftovers.
    fn scan_locations(&mut self) -> Result<(), CacheError> {
        for index in 0..self.locations.len() {
            let dir = self.locations[index].dir.clone();
            let entries =
                fs::read_dir(&dir).map_err(|e| CacheError::io("listing location", &e))?;

            for entry in entries {
                let entry = entry.map_err(|e| CacheError::io("listing location", &e))?;
                let name = entry.file_name().to_string_lossy().into_owned();

                if name == MANIFEST_FILE || name == COUNTER_FILE || name == ROTATE_MARKER {
                    continue;
                }
                if name.ends_with(".tmp") {
                    // Interrupted write; never counted, safe to drop.
                    let _ = fs::remove_file(entry.path());
                    continue;
                }

                let Some((seq, offset)) = parse_block_file_name(&name) else {
                    return Err(CacheError::Corrupt {
                        detail: format!("unexpected file {name:?} in location {:?}",
                            self.locations[index].id),
                    });
                };

                let size = entry
                    .metadata()
                    .map_err(|e| CacheError::io("reading block metadata", &e))?
                    .len();
                if size <= SEALED_OVERHEAD {
                    return Err(CacheError::Corrupt {
                        detail: format!("block file {name:?} is too small ({size} bytes)"),
                    });
                }
                let len = size - SEALED_OVERHEAD;

                match self.blocks.get(&seq).copied() {
                    // Crash mid-consume can leave two files for one block;
                    // the higher offset is the surviving truth.
                    Some(existing) if existing.offset >= offset => {
                        let _ = fs::remove_file(entry.path());
                    },
                    Some(existing) => {
                        let stale = self.locations[existing.location]
                            .dir
                            .join(block_file_name(seq, existing.offset));
                        let _ = fs::remove_file(stale);
                        self.locations[existing.location].used -= existing.len;
                        self.locations[index].used += len;
                        self.blocks.insert(seq, BlockEntry { location: index, offset, len });
                    },
                    None => {
                        self.locations[index].used += len;
                        self.blocks.insert(seq, BlockEntry { location: index, offset, len });
                    },
                }
            }
        }

        self.next_seq = self.blocks.keys().next_back().map_or(0, |&seq| seq + 1);
        Ok(())
    }

    /// Unconsumed bytes currently in the pool.
    pub fn remaining(&self) -> u64 {
        self.locations.iter().map(|l| l.used).sum()
    }

    /// Total random ever downloaded to this ledger; reset only by [`wipe`](Self::wipe).
    pub fn total_downloaded(&self) -> u64 {
        self.total_downloaded
    }

    /// Bytes an append can still accommodate: the tighter of the pool bound
    /// and the combined free location capacity.
    ///
    /// Replenishment sizes its requests with this, so a configuration whose
    /// locations hold less than `max_num_cached_bytes` plateaus at the
    /// location bound instead of requesting bytes it cannot store.
    pub fn headroom(&self) -> u64 {
        let pool = self.max_num_cached_bytes.saturating_sub(self.remaining());
        let locations: u64 = self.locations.iter().map(Location::headroom).sum();
        pool.min(locations)
    }

    /// Append fresh pool bytes, splitting across locations by free capacity.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if the bytes do not fit under both the pool bound
    /// (`max_num_cached_bytes`) and the combined location capacities; nothing
    /// is written in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), CacheError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let appended = bytes.len() as u64;

        let headroom = self.headroom();
        if appended > headroom {
            return Err(CacheError::CapacityExceeded { appended, headroom });
        }

        let mut rest = bytes;
        for index in 0..self.locations.len() {
            if rest.is_empty() {
                break;
            }
            let free = self.locations[index].headroom();
            if free == 0 {
                continue;
            }

            let take = rest.len().min(free as usize);
            let (chunk, tail) = rest.split_at(take);
            let seq = self.next_seq;
            let sealed = block::seal(&self.key, seq, 0, chunk)?;
            write_file_atomic(&self.locations[index].dir, &block_file_name(seq, 0), &sealed)?;

            self.blocks.insert(seq, BlockEntry { location: index, offset: 0, len: take as u64 });
            self.locations[index].used += take as u64;
            self.next_seq += 1;
            rest = tail;
        }

        self.total_downloaded += appended;
        write_counter(&self.locations[0].dir, self.total_downloaded)?;
        tracing::debug!(appended, remaining = self.remaining(), "appended pool bytes");
        Ok(())
    }

    /// Atomically consume the oldest `num_bytes` unconsumed bytes.
    ///
    /// The availability check and the deletion form one step under the
    /// caller's lock: a failed request consumes nothing. Decryption of every
    /// involved block happens before any file is touched, so an I/O or
    /// corruption error also consumes nothing.
    ///
    /// # Errors
    ///
    /// `InsufficientRandom` if the pool is short; `Corrupt` if a block fails
    /// authentication or its size disagrees with the index.
    pub fn consume(&mut self, num_bytes: u64) -> Result<Zeroizing<Vec<u8>>, CacheError> {
        let available = self.remaining();
        if num_bytes > available {
            return Err(CacheError::InsufficientRandom { requested: num_bytes, available });
        }
        if num_bytes == 0 {
            return Ok(Zeroizing::new(Vec::new()));
        }

        // Phase 1: decrypt everything we will touch. No disk mutation yet.
        let mut picked: Vec<(u64, Zeroizing<Vec<u8>>, u64)> = Vec::new();
        let mut needed = num_bytes;
        for (&seq, entry) in &self.blocks {
            let path = self.block_path(seq, entry);
            let sealed = fs::read(&path).map_err(|e| CacheError::io("reading block", &e))?;
            let plaintext = block::open(&self.key, seq, entry.offset, &sealed)?;
            if plaintext.len() as u64 != entry.len {
                return Err(CacheError::Corrupt {
                    detail: format!(
                        "block {seq:#x} holds {} bytes, index says {}",
                        plaintext.len(),
                        entry.len
                    ),
                });
            }
            let take = needed.min(entry.len);
            picked.push((seq, plaintext, take));
            needed -= take;
            if needed == 0 {
                break;
            }
        }

        // Phase 2: emit bytes and delete them from disk, oldest first.
        let mut out = Zeroizing::new(Vec::with_capacity(num_bytes as usize));
        for (seq, plaintext, take) in picked {
            let Some(entry) = self.blocks.get(&seq).copied() else {
                unreachable!("picked blocks come from the index and the lock is held");
            };
            let old_path = self.block_path(seq, &entry);
            out.extend_from_slice(&plaintext[..take as usize]);

            if take == entry.len {
                fs::remove_file(&old_path).map_err(|e| CacheError::io("deleting block", &e))?;
                self.blocks.remove(&seq);
            } else {
                // Remainder first, original second: a crash between the two
                // leaves both on disk and open keeps the higher offset.
                let new_offset = entry.offset + take;
                let sealed =
                    block::seal(&self.key, seq, new_offset, &plaintext[take as usize..])?;
                write_file_atomic(
                    &self.locations[entry.location].dir,
                    &block_file_name(seq, new_offset),
                    &sealed,
                )?;
                fs::remove_file(&old_path).map_err(|e| CacheError::io("deleting block", &e))?;
                self.blocks
                    .insert(seq, BlockEntry { offset: new_offset, len: entry.len - take, ..entry });
            }
            self.locations[entry.location].used -= take;
        }

        Ok(out)
    }

    /// Securely delete all pool material and reset counters; idempotent.
    ///
    /// The manifest (salt + key-check) stays: the ledger remains unlocked
    /// under the same device secret and can be refilled immediately.
    pub fn wipe(&mut self) -> Result<(), CacheError> {
        for index in 0..self.locations.len() {
            let dir = self.locations[index].dir.clone();
            remove_if_present(&dir.join(STAGING_DIR), true)?;
            remove_if_present(&dir.join(ROTATE_MARKER), false)?;
            remove_if_present(&dir.join(COUNTER_FILE), false)?;

            let entries =
                fs::read_dir(&dir).map_err(|e| CacheError::io("listing location", &e))?;
            for entry in entries {
                let entry = entry.map_err(|e| CacheError::io("listing location", &e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if parse_block_file_name(&name).is_some() || name.ends_with(".tmp") {
                    fs::remove_file(entry.path())
                        .map_err(|e| CacheError::io("wiping block", &e))?;
                }
            }
            self.locations[index].used = 0;
        }

        self.blocks.clear();
        self.next_seq = 0;
        self.total_downloaded = 0;
        tracing::info!("cache wiped");
        Ok(())
    }

    /// Re-encrypt the whole ledger under a new device secret.
    ///
    /// Atomic with respect to crashes: the new ledger is fully staged in
    /// every location, a commit marker is written, and only then are the
    /// staged files swapped into place. An interruption anywhere leaves the
    /// store entirely under the old secret (no marker yet) or entirely under
    /// the new one (marker written) after [`open`](Self::open) recovery.
    ///
    /// # Errors
    ///
    /// `Authentication` if `old_secret` does not unlock the current ledger.
    pub fn rotate(
        &mut self,
        old_secret: &DeviceSecret,
        new_secret: &DeviceSecret,
    ) -> Result<(), CacheError> {
        let old_key = derive_cache_key(old_secret, &self.salt);
        let current = manifest::read(&self.locations[0].dir)?
            .ok_or_else(|| CacheError::Corrupt { detail: "manifest missing".into() })?;
        if !current.verifies(&old_key) {
            return Err(CacheError::Authentication);
        }

        let mut new_salt = [0u8; SALT_LEN];
        getrandom::fill(&mut new_salt)
            .map_err(|e| CacheError::Io { detail: format!("salt generation: {e}") })?;
        let new_key = derive_cache_key(new_secret, &new_salt);
        let new_manifest = Manifest::create(new_salt, &new_key)?;

        self.stage_rotation(&old_key, &new_key, &new_manifest)?;
        self.write_rotation_marker()?;
        self.commit_rotation()?;

        self.salt = new_salt;
        self.key = new_key;
        tracing::info!("device secret rotated");
        Ok(())
    }

    /// Write a fully re-encrypted copy of every location into its staging dir.
    fn stage_rotation(
        &self,
        old_key: &CacheKey,
        new_key: &CacheKey,
        new_manifest: &Manifest,
    ) -> Result<(), CacheError> {
        for (index, location) in self.locations.iter().enumerate() {
            let staging = location.dir.join(STAGING_DIR);
            remove_if_present(&staging, true)?;
            fs::create_dir(&staging).map_err(|e| CacheError::io("creating staging", &e))?;
            manifest::write(&staging, new_manifest)?;

            for (&seq, entry) in self.blocks.iter().filter(|(_, e)| e.location == index) {
                let sealed = fs::read(self.block_path(seq, entry))
                    .map_err(|e| CacheError::io("reading block", &e))?;
                let plaintext = block::open(old_key, seq, entry.offset, &sealed)?;
                let resealed = block::seal(new_key, seq, entry.offset, &plaintext)?;
                fs::write(staging.join(block_file_name(seq, entry.offset)), &resealed)
                    .map_err(|e| CacheError::io("staging block", &e))?;
            }
        }
        Ok(())
    }

    /// Commit point: once this marker exists, recovery rolls forward.
    fn write_rotation_marker(&self) -> Result<(), CacheError> {
        fs::write(self.locations[0].dir.join(ROTATE_MARKER), b"1")
            .map_err(|e| CacheError::io("writing rotation marker", &e))
    }

    /// Swap staged files into place, then clear staging and the marker.
    fn commit_rotation(&self) -> Result<(), CacheError> {
        for location in &self.locations {
            swap_staging_into(&location.dir)?;
        }
        remove_if_present(&self.locations[0].dir.join(ROTATE_MARKER), false)?;
        Ok(())
    }

    fn block_path(&self, seq: u64, entry: &BlockEntry) -> PathBuf {
        self.locations[entry.location].dir.join(block_file_name(seq, entry.offset))
    }
}

/// Resolve an interrupted rotation before the manifest is read.
fn recover_rotation(locations: &[Location]) -> Result<(), CacheError> {
    let marker = locations[0].dir.join(ROTATE_MARKER);
    if marker.exists() {
        // The rotation reached its commit point: finish the swap.
        for location in locations {
            swap_staging_into(&location.dir)?;
        }
        remove_if_present(&marker, false)?;
        tracing::warn!("completed interrupted secret rotation");
    } else {
        // No commit marker: discard any staged copy, the old key stands.
        for location in locations {
            let staging = location.dir.join(STAGING_DIR);
            if staging.exists() {
                remove_if_present(&staging, true)?;
                tracing::warn!("discarded uncommitted secret rotation");
            }
        }
    }
    Ok(())
}

/// Move every staged file into the location root, replacing originals.
fn swap_staging_into(dir: &Path) -> Result<(), CacheError> {
    let staging = dir.join(STAGING_DIR);
    if !staging.exists() {
        return Ok(());
    }
    let entries = fs::read_dir(&staging).map_err(|e| CacheError::io("listing staging", &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io("listing staging", &e))?;
        let name = entry.file_name();
        fs::rename(entry.path(), dir.join(&name))
            .map_err(|e| CacheError::io("committing staged file", &e))?;
    }
    fs::remove_dir(&staging).map_err(|e| CacheError::io("removing staging", &e))?;
    Ok(())
}

fn write_file_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = dir.join(format!("{name}.tmp"));
    fs::write(&tmp, bytes).map_err(|e| CacheError::io("writing block", &e))?;
    fs::rename(&tmp, dir.join(name)).map_err(|e| CacheError::io("committing block", &e))?;
    Ok(())
}

fn write_counter(dir: &Path, value: u64) -> Result<(), CacheError> {
    let tmp = dir.join(format!("{COUNTER_FILE}.tmp"));
    fs::write(&tmp, value.to_be_bytes()).map_err(|e| CacheError::io("writing counter", &e))?;
    fs::rename(&tmp, dir.join(COUNTER_FILE))
        .map_err(|e| CacheError::io("committing counter", &e))?;
    Ok(())
}

fn read_counter(dir: &Path) -> Result<Option<u64>, CacheError> {
    match fs::read(dir.join(COUNTER_FILE)) {
        Ok(bytes) => {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| CacheError::Corrupt {
                detail: format!("counter file has {} bytes, expected 8", bytes.len()),
            })?;
            Ok(Some(u64::from_be_bytes(raw)))
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io("reading counter", &e)),
    }
}

fn remove_if_present(path: &Path, is_dir: bool) -> Result<(), CacheError> {
    let result = if is_dir { fs::remove_dir_all(path) } else { fs::remove_file(path) };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io("removing stale file", &e)),
    }
}
