//! Hash-based on-disk object storage layout.
//!
//! Directory layout:
//! ```text
//! <object_dir>/
//!   <hash-chunk-1>/<hash-chunk-2>/.../<fileIdSafe>/
//!     <objectFileName>           # identity-encoded, see object_name
//!     .tepoch                    # 8-byte big-endian truncate epoch
//!     .mepoch                    # 4-byte big-endian master epoch
//!     .tlog                      # length-delimited truncate log
//!     .vlog                      # whole-file version log
//! ```
//!
//! One object version is one file; the name encodes
//! `(object number, version, timestamp, checksum)`. Copy-on-write keeps the
//! predecessor intact under its old name, in-place writes reuse the file and
//! rename it when the version changes. Crash safety follows from this naming
//! discipline: every write targets either a brand-new name or renames into
//! one, so a torn write can never corrupt a previously published version.
//! The version index is rebuilt from the directory on load; it is a cache,
//! not a source of truth.
//!
//! Callers are serialized per file id by the upstream stage; nothing here
//! locks across operations.

use crate::cow::CowPolicy;
use crate::metadata::FileMetadata;
use crate::object_name::ObjectFileName;
use crate::path::{PathMapper, COLON_RESERVED};
use crate::proto::TruncateLog;
use crate::version::{ObjectVersionInfo, VersionManager};
use crate::vlog::FileVersionLog;
use bytes::Bytes;
use parking_lot::Mutex;
use prost::Message;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stripeio_common::checksum::ChecksumEngine;
use stripeio_common::striping::StripingPolicy;
use stripeio_common::{Error, LayoutConfig, Result};
use tracing::{debug, warn};

/// Truncate epoch metadata file
pub const TEPOCH_FILENAME: &str = ".tepoch";
/// Master epoch metadata file
pub const MEPOCH_FILENAME: &str = ".mepoch";
/// Truncate log metadata file
pub const TLOG_FILENAME: &str = ".tlog";
/// Whole-file version log
pub const VLOG_FILENAME: &str = ".vlog";

/// On-disk layout version tag
pub const LAYOUT_VERSION_TAG: i32 = 0x0000_0002;

/// Returns true for layout tags this implementation can read. Tag 1 is the
/// legacy layout whose version field was a 32-bit integer.
#[must_use]
pub fn is_compatible_version(tag: i32) -> bool {
    tag == LAYOUT_VERSION_TAG || tag == 1
}

/// State of an object on disk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectStatus {
    /// No file for the requested version
    DoesNotExist,
    /// A zero-length file standing in for a full stripe of zeroes
    PaddingObject,
    /// Regular object data
    Exists,
}

/// Result of a read
#[derive(Clone, Debug)]
pub struct ObjectInformation {
    pub status: ObjectStatus,
    pub data: Option<Bytes>,
    pub stripe_size: usize,
}

impl ObjectInformation {
    fn new(status: ObjectStatus, data: Option<Bytes>, stripe_size: usize) -> Self {
        Self {
            status,
            data,
            stripe_size,
        }
    }
}

/// Aggregate entry for the paged file walk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileData {
    pub size: u64,
    pub object_size_kb: u32,
}

/// Resumable cursor plus one page of results for [`HashLayout::file_list`]
#[derive(Debug, Default)]
pub struct FileList {
    /// Pending directories, relative to the storage root
    status: Vec<String>,
    /// The current page, keyed by file id
    pub files: HashMap<String, FileData>,
    /// False once the walk has visited everything
    pub has_more: bool,
}

/// The storage layout engine
pub struct HashLayout {
    object_dir: PathBuf,
    paths: PathMapper,
    checksums_enabled: bool,
    checksums: Mutex<ChecksumEngine>,
}

impl HashLayout {
    /// Create a layout over the configured storage root. The root directory
    /// is created if absent. An unknown checksum algorithm disables
    /// checksumming (logged as an error) instead of failing startup.
    pub fn new(config: LayoutConfig) -> Result<Self> {
        fs::create_dir_all(&config.object_dir)?;

        let engine = ChecksumEngine::new(config.checksums_enabled, &config.checksum_algorithm);
        let checksums_enabled = engine.enabled();
        let paths = PathMapper::new(config.max_subdirs_per_dir, config.max_dir_depth);

        debug!(
            checksums = checksums_enabled,
            root = %config.object_dir.display(),
            "initialized object storage layout"
        );

        Ok(Self {
            object_dir: config.object_dir,
            paths,
            checksums_enabled,
            checksums: Mutex::new(engine),
        })
    }

    /// Whether per-object checksums are in effect
    #[must_use]
    pub fn checksums_enabled(&self) -> bool {
        self.checksums_enabled
    }

    fn calc_checksum(&self, data: &[u8]) -> u64 {
        self.checksums.lock().calc(data)
    }

    fn absolute_file_dir(&self, file_id: &str) -> PathBuf {
        self.object_dir.join(self.paths.relative_file_path(file_id))
    }

    fn object_path(
        &self,
        file_id: &str,
        object_no: u64,
        version: u64,
        timestamp: i64,
        checksum: u64,
    ) -> PathBuf {
        self.absolute_file_dir(file_id)
            .join(ObjectFileName::new(object_no, version, timestamp, checksum).encode())
    }

    /// Read (part of) one object version.
    ///
    /// `length` of `None` means the entire stripe and requires `offset` 0.
    /// A version of 0 means the object is already known not to exist.
    pub fn read_object(
        &self,
        file_id: &str,
        md: &FileMetadata,
        object_no: u64,
        offset: usize,
        length: Option<usize>,
        version: ObjectVersionInfo,
    ) -> Result<ObjectInformation> {
        let stripe_size = md.striping().stripe_size_for_object(object_no);
        debug!(file_id, object_no, "fetching object from disk");

        let length = match length {
            Some(l) => l,
            None => {
                debug_assert_eq!(offset, 0, "whole-stripe reads start at offset 0");
                stripe_size
            }
        };

        if version.version == 0 {
            debug!(object_no, "object does not exist (according to metadata)");
            return Ok(ObjectInformation::new(
                ObjectStatus::DoesNotExist,
                None,
                stripe_size,
            ));
        }

        // the checksum is part of the file name and must come from the index
        let known = md
            .versions()
            .get_object_version(object_no, version.version, version.timestamp)
            .ok_or(Error::VersionNotFound {
                object: object_no,
                version: version.version,
                timestamp: version.timestamp,
            })?;
        let path = self.object_path(
            file_id,
            object_no,
            version.version,
            version.timestamp,
            known.checksum,
        );
        debug!(path = %path.display(), "path to object on disk");

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(object_no, "object does not exist");
                return Ok(ObjectInformation::new(
                    ObjectStatus::DoesNotExist,
                    None,
                    stripe_size,
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let file_length = file.metadata()?.len() as usize;
        if file_length == 0 {
            debug!(object_no, "object is a padding object");
            return Ok(ObjectInformation::new(
                ObjectStatus::PaddingObject,
                None,
                stripe_size,
            ));
        }
        if file_length <= offset {
            debug!(object_no, offset, "object read at an offset beyond its size");
            return Ok(ObjectInformation::new(
                ObjectStatus::Exists,
                Some(Bytes::new()),
                stripe_size,
            ));
        }

        let last_offset = offset + length;
        debug_assert!(last_offset <= stripe_size);
        let to_read = if last_offset > file_length {
            file_length - offset
        } else {
            length
        };

        let mut buf = vec![0u8; to_read];
        file.seek(SeekFrom::Start(offset as u64))?;
        file.read_exact(&mut buf)?;
        debug!(object_no, offset, read = to_read, "object read");

        Ok(ObjectInformation::new(
            ObjectStatus::Exists,
            Some(Bytes::from(buf)),
            stripe_size,
        ))
    }

    /// Write (part of) one object under a new version.
    ///
    /// Full-stripe writes go to a fresh file; partial writes either
    /// materialize the full stripe (copy-on-write, also when checksums are
    /// enabled, since the checksum covers the whole object) or patch the
    /// predecessor in place. Zero-length data is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn write_object(
        &self,
        file_id: &str,
        md: &mut FileMetadata,
        data: &[u8],
        object_no: u64,
        offset: usize,
        new_version: u64,
        new_timestamp: i64,
        sync: bool,
        cow: &mut CowPolicy,
    ) -> Result<()> {
        assert!(new_version > 0, "object version must be > 0");
        if data.is_empty() {
            return Ok(());
        }

        let file_dir = self.absolute_file_dir(file_id);
        fs::create_dir_all(&file_dir)
            .map_err(|e| Error::storage(format!("unable to create file directory or object: {e}")))?;
        debug!(file_id, object_no, dir = %file_dir.display(), "writing object to disk");

        let is_cow = cow.is_cow(object_no);
        let is_range_write =
            offset > 0 || data.len() < md.striping().stripe_size_for_object(object_no);

        if is_range_write {
            if is_cow || self.checksums_enabled {
                self.partial_write_cow(
                    &file_dir,
                    file_id,
                    md,
                    data,
                    offset,
                    object_no,
                    new_version,
                    new_timestamp,
                    sync,
                    !is_cow,
                )?;
            } else {
                self.partial_write_no_cow(
                    &file_dir,
                    md,
                    data,
                    object_no,
                    offset,
                    new_version,
                    new_timestamp,
                    sync,
                    cow.cow_enabled(),
                )?;
            }
        } else {
            self.complete_write(
                &file_dir,
                md,
                data,
                object_no,
                new_version,
                new_timestamp,
                sync,
                !is_cow,
            )?;
        }

        // may affect future writes: only the first write copies
        if is_cow {
            cow.object_changed(object_no);
        }
        Ok(())
    }

    /// Partial write that materializes the full stripe into a fresh file.
    /// `delete_old_version` is set when copy-on-write is off for this object
    /// but checksums force the full-stripe path anyway.
    #[allow(clippy::too_many_arguments)]
    fn partial_write_cow(
        &self,
        file_dir: &Path,
        file_id: &str,
        md: &mut FileMetadata,
        data: &[u8],
        offset: usize,
        object_no: u64,
        new_version: u64,
        new_timestamp: i64,
        sync: bool,
        delete_old_version: bool,
    ) -> Result<()> {
        let object_count = (md.last_object_number() + 1) as u64;
        let old = md
            .versions()
            .latest_object_version_before(object_no, i64::MAX, object_count);

        let mut full = self.unwrap_object_data(file_id, md, object_no, old)?;
        if full.len() < offset + data.len() {
            full.resize(offset + data.len(), 0);
        }
        full[offset..offset + data.len()].copy_from_slice(data);

        let new_checksum = self.calc_checksum(&full);
        let new_path = file_dir
            .join(ObjectFileName::new(object_no, new_version, new_timestamp, new_checksum).encode());
        debug!(path = %new_path.display(), "writing object copy");
        write_object_file(&new_path, &full, sync)?;

        if delete_old_version {
            let old_path = file_dir
                .join(ObjectFileName::new(object_no, old.version, old.timestamp, old.checksum).encode());
            remove_predecessor(&old_path);
            md.versions_mut()
                .remove_object_version(object_no, old.version, old.timestamp);
        }

        md.versions_mut()
            .add_object_version(object_no, new_version, new_timestamp, new_checksum);
        Ok(())
    }

    /// Partial write patching the predecessor in place, renaming it when the
    /// version or timestamp changed. Requires checksums off: the name would
    /// otherwise carry a checksum the patched content no longer matches.
    #[allow(clippy::too_many_arguments)]
    fn partial_write_no_cow(
        &self,
        file_dir: &Path,
        md: &mut FileMetadata,
        data: &[u8],
        object_no: u64,
        offset: usize,
        new_version: u64,
        new_timestamp: i64,
        sync: bool,
        cow_enabled: bool,
    ) -> Result<()> {
        assert!(
            !self.checksums_enabled,
            "in-place writes require checksums to be disabled"
        );

        // With COW enabled for the file the latest version has to be resolved
        // through the version log: the object may have been truncated away in
        // the meantime. Otherwise the largest known version is the
        // predecessor.
        let old = if cow_enabled {
            let object_count = (md.last_object_number() + 1) as u64;
            md.versions()
                .latest_object_version_before(object_no, i64::MAX, object_count)
        } else {
            md.versions().largest_object_version(object_no)
        };

        let path = file_dir
            .join(ObjectFileName::new(object_no, old.version, old.timestamp, old.checksum).encode());
        debug!(path = %path.display(), "writing object in place");

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(data)?;
        if sync {
            file.sync_data()?;
        }
        drop(file);

        if new_timestamp != old.timestamp || new_version != old.version {
            // checksum is always zero on this path
            let new_path =
                file_dir.join(ObjectFileName::new(object_no, new_version, new_timestamp, 0).encode());
            fs::rename(&path, &new_path)?;
            debug!(path = %new_path.display(), "renamed object");

            md.versions_mut()
                .remove_object_version(object_no, old.version, old.timestamp);
            md.versions_mut()
                .add_object_version(object_no, new_version, new_timestamp, 0);
        }
        Ok(())
    }

    /// Full-stripe write to a fresh file
    #[allow(clippy::too_many_arguments)]
    fn complete_write(
        &self,
        file_dir: &Path,
        md: &mut FileMetadata,
        data: &[u8],
        object_no: u64,
        new_version: u64,
        new_timestamp: i64,
        sync: bool,
        delete_old_version: bool,
    ) -> Result<()> {
        let old = md.versions().largest_object_version(object_no);

        let new_checksum = self.calc_checksum(data);
        let new_path = file_dir
            .join(ObjectFileName::new(object_no, new_version, new_timestamp, new_checksum).encode());
        debug!(path = %new_path.display(), "writing object");
        write_object_file(&new_path, data, sync)?;

        if delete_old_version
            && (new_version != old.version
                || new_timestamp != old.timestamp
                || new_checksum != old.checksum)
        {
            let old_path = file_dir
                .join(ObjectFileName::new(object_no, old.version, old.timestamp, old.checksum).encode());
            remove_predecessor(&old_path);
            md.versions_mut()
                .remove_object_version(object_no, old.version, old.timestamp);
        }

        md.versions_mut()
            .add_object_version(object_no, new_version, new_timestamp, new_checksum);
        Ok(())
    }

    /// Materialize the payload of an existing object version. Padding
    /// objects expand to a full stripe of zeroes; a missing predecessor
    /// yields an empty buffer.
    fn unwrap_object_data(
        &self,
        file_id: &str,
        md: &FileMetadata,
        object_no: u64,
        version: ObjectVersionInfo,
    ) -> Result<Vec<u8>> {
        let info = self.read_object(file_id, md, object_no, 0, None, version)?;
        Ok(match info.status {
            ObjectStatus::PaddingObject => vec![0u8; info.stripe_size],
            ObjectStatus::DoesNotExist => Vec::new(),
            ObjectStatus::Exists => info.data.map(|b| b.to_vec()).unwrap_or_default(),
        })
    }

    /// Set an object's length, growing with zeroes or shrinking.
    ///
    /// Truncating to the current length is a no-op. With copy-on-write or
    /// checksums the full payload is rematerialized into a fresh file;
    /// otherwise the predecessor is resized in place and renamed when the
    /// version changed.
    #[allow(clippy::too_many_arguments)]
    pub fn truncate_object(
        &self,
        file_id: &str,
        md: &mut FileMetadata,
        object_no: u64,
        new_length: usize,
        new_version: u64,
        new_timestamp: i64,
        cow: bool,
    ) -> Result<()> {
        debug_assert!(new_length <= md.striping().stripe_size_for_object(object_no));

        let old = md.versions().largest_object_version(object_no);
        let old_path = self.object_path(file_id, object_no, old.version, old.timestamp, old.checksum);
        let current_length = fs::metadata(&old_path).map(|m| m.len()).unwrap_or(0) as usize;

        if new_length == current_length {
            return Ok(());
        }

        if cow || self.checksums_enabled {
            let mut payload = self.unwrap_object_data(file_id, md, object_no, old)?;
            payload.resize(new_length, 0);
            let new_checksum = self.calc_checksum(&payload);

            if !cow {
                remove_predecessor(&old_path);
                debug!(
                    object_no,
                    version = old.version,
                    "truncate removed predecessor version"
                );
            }

            let new_path =
                self.object_path(file_id, object_no, new_version, new_timestamp, new_checksum);
            write_object_file(&new_path, &payload, false)?;
            debug!(object_no, version = new_version, "truncate wrote new version");

            md.versions_mut()
                .add_object_version(object_no, new_version, new_timestamp, new_checksum);
        } else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&old_path)?;
            file.set_len(new_length as u64)?;
            drop(file);

            if new_version != old.version || new_timestamp != old.timestamp {
                let new_path = self.object_path(file_id, object_no, new_version, new_timestamp, 0);
                fs::rename(&old_path, &new_path)?;
                debug!(
                    object_no,
                    version = new_version,
                    "truncate renamed object for new version"
                );

                md.versions_mut()
                    .remove_object_version(object_no, new_version, new_timestamp);
                md.versions_mut()
                    .add_object_version(object_no, new_version, new_timestamp, 0);
            }
        }
        Ok(())
    }

    /// Create an empty file of the given length standing in for object data
    pub fn create_padding_object(
        &self,
        file_id: &str,
        md: &mut FileMetadata,
        object_no: u64,
        version: u64,
        timestamp: i64,
        size: usize,
    ) -> Result<()> {
        let file_dir = self.absolute_file_dir(file_id);
        fs::create_dir_all(&file_dir)
            .map_err(|e| Error::storage(format!("unable to create file directory or object: {e}")))?;

        let checksum = if self.checksums_enabled {
            self.calc_checksum(&vec![0u8; size])
        } else {
            0
        };

        let path =
            file_dir.join(ObjectFileName::new(object_no, version, timestamp, checksum).encode());
        let file = OpenOptions::new().write(true).create(true).open(&path)?;
        file.set_len(size as u64)?;
        drop(file);

        md.versions_mut()
            .add_object_version(object_no, version, timestamp, checksum);
        Ok(())
    }

    /// Delete one object version.
    ///
    /// A version of 0 selects the largest local version; a timestamp of 0
    /// the largest version at or below the given one; otherwise the exact
    /// version. The index entry is left to the caller, matching the
    /// delete-then-deregister protocol.
    pub fn delete_object(
        &self,
        file_id: &str,
        md: &FileMetadata,
        object_no: u64,
        version: u64,
        timestamp: i64,
    ) -> Result<()> {
        let vm = md.versions();
        let to_delete = if version == 0 {
            vm.largest_object_version(object_no)
        } else if timestamp == 0 {
            vm.largest_object_version_before(object_no, version)
        } else {
            vm.get_object_version(object_no, version, timestamp)
                .unwrap_or(ObjectVersionInfo::MISSING)
        };
        if !to_delete.exists() {
            return Err(Error::VersionNotFound {
                object: object_no,
                version,
                timestamp,
            });
        }

        let path = self.object_path(
            file_id,
            object_no,
            to_delete.version,
            to_delete.timestamp,
            to_delete.checksum,
        );
        fs::remove_file(&path)?;
        Ok(())
    }

    /// Delete all of a file's objects. With `delete_metadata` the hidden
    /// metadata files go too and empty fan-out directories are removed up to
    /// the storage root.
    pub fn delete_file(&self, file_id: &str, delete_metadata: bool) -> Result<()> {
        let file_dir = self.absolute_file_dir(file_id);
        let entries = match fs::read_dir(&file_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden || delete_metadata {
                fs::remove_file(entry.path())?;
            }
        }

        if delete_metadata {
            self.remove_empty_ancestors(&file_dir)?;
        }
        Ok(())
    }

    /// Walk up from the leaf removing now-empty directories, stopping at the
    /// storage root
    fn remove_empty_ancestors(&self, leaf: &Path) -> Result<()> {
        let mut dir = leaf.to_path_buf();
        loop {
            if dir == self.object_dir {
                return Ok(());
            }
            let empty = match fs::read_dir(&dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            if !empty {
                return Ok(());
            }
            fs::remove_dir(&dir)?;
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => return Ok(()),
            }
        }
    }

    /// Whether the file has a directory on this device
    #[must_use]
    pub fn file_exists(&self, file_id: &str) -> bool {
        self.absolute_file_dir(file_id).exists()
    }

    /// Rebuild a file's metadata from its directory.
    ///
    /// Object files are indexed by parsing their names; hidden metadata
    /// files are skipped, unparseable names are logged and ignored. File
    /// size and last object number come from the version log when versioning
    /// is enabled, otherwise from the object with the largest number (a
    /// zero-length last object counts as a full stripe of padding).
    pub fn load_file_metadata(
        &self,
        file_id: &str,
        striping: Arc<dyn StripingPolicy>,
    ) -> Result<FileMetadata> {
        let file_dir = self.absolute_file_dir(file_id);

        let vlog_path = file_dir.join(VLOG_FILENAME);
        let versioning_enabled = vlog_path.exists();
        let mut vlog = FileVersionLog::new(&vlog_path);
        if versioning_enabled {
            vlog.load()?;
        }
        let mut md = FileMetadata::new(striping, VersionManager::new(vlog, versioning_enabled));

        if !file_dir.exists() {
            md.set_file_size(0);
            md.set_last_object_number(-1);
            md.set_global_last_object_number(-1);
            return Ok(md);
        }

        for entry in fs::read_dir(&file_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue; // metadata files
            }
            match ObjectFileName::parse(&name) {
                Ok(parsed) => md.versions_mut().add_object_version(
                    parsed.object_no,
                    parsed.version,
                    parsed.timestamp,
                    parsed.checksum,
                ),
                Err(_) => warn!(file = %name, "illegal file discovered and ignored"),
            }
        }

        let tepoch_path = file_dir.join(TEPOCH_FILENAME);
        if tepoch_path.exists() {
            let mut buf = [0u8; 8];
            File::open(&tepoch_path)?.read_exact(&mut buf)?;
            md.set_truncate_epoch(i64::from_be_bytes(buf));
        }

        if md.versions().is_versioning_enabled() {
            match md.versions().latest_file_version_before(i64::MAX) {
                Some(fv) => {
                    md.set_file_size(fv.file_size);
                    md.set_last_object_number(fv.num_objects as i64 - 1);
                }
                None => {
                    md.set_file_size(0);
                    md.set_last_object_number(-1);
                }
            }
        } else {
            let last_object_no = md.versions().last_object_id();
            if last_object_no >= 0 {
                let last_object_no = last_object_no as u64;
                let last = md.versions().largest_object_version(last_object_no);
                let last_path = self.object_path(
                    file_id,
                    last_object_no,
                    last.version,
                    last.timestamp,
                    last.checksum,
                );
                let mut last_size = fs::metadata(&last_path).map(|m| m.len()).unwrap_or(0);
                if last_size == 0 {
                    // an empty file is a padding object of full stripe length
                    last_size = md.striping().stripe_size_for_object(last_object_no) as u64;
                }
                let mut file_size = last_size;
                if last_object_no > 0 {
                    file_size += md.striping().object_end_offset(last_object_no - 1) + 1;
                }
                md.set_file_size(file_size);
                md.set_last_object_number(last_object_no as i64);
            } else {
                md.set_file_size(0);
                md.set_last_object_number(-1);
            }
        }

        md.set_global_last_object_number(-1);
        Ok(md)
    }

    /// Persist the truncate epoch, creating the file directory if needed
    pub fn set_truncate_epoch(&self, file_id: &str, epoch: i64) -> Result<()> {
        let file_dir = self.absolute_file_dir(file_id);
        fs::create_dir_all(&file_dir)?;
        fs::write(file_dir.join(TEPOCH_FILENAME), epoch.to_be_bytes())?;
        Ok(())
    }

    /// Read the master epoch; 0 when never written
    pub fn master_epoch(&self, file_id: &str) -> Result<i32> {
        let path = self.absolute_file_dir(file_id).join(MEPOCH_FILENAME);
        match File::open(&path) {
            Ok(mut file) => {
                let mut buf = [0u8; 4];
                file.read_exact(&mut buf)?;
                Ok(i32::from_be_bytes(buf))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the master epoch, creating the file directory if needed
    pub fn set_master_epoch(&self, file_id: &str, epoch: i32) -> Result<()> {
        let file_dir = self.absolute_file_dir(file_id);
        fs::create_dir_all(&file_dir)?;
        fs::write(file_dir.join(MEPOCH_FILENAME), epoch.to_be_bytes())?;
        Ok(())
    }

    /// Read the truncate log; the empty log when absent or unreadable
    pub fn truncate_log(&self, file_id: &str) -> Result<TruncateLog> {
        let path = self.absolute_file_dir(file_id).join(TLOG_FILENAME);
        match fs::read(&path) {
            Ok(buf) => match TruncateLog::decode_length_delimited(buf.as_slice()) {
                Ok(log) => Ok(log),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable truncate log");
                    Ok(TruncateLog::default())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(TruncateLog::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the truncate log, creating the file directory if needed
    pub fn set_truncate_log(&self, file_id: &str, log: &TruncateLog) -> Result<()> {
        let file_dir = self.absolute_file_dir(file_id);
        fs::create_dir_all(&file_dir)?;
        fs::write(
            file_dir.join(TLOG_FILENAME),
            log.encode_length_delimited_to_vec(),
        )?;
        Ok(())
    }

    /// Walk the whole tree and return the discovered leaf names.
    ///
    /// Directories whose names contain ':' are not descended into. On hosts
    /// where ':' survives in directory names this emits the file-id leaf
    /// directories themselves; elsewhere (where ':' is rewritten to '_') the
    /// walk descends into the leaves and emits object file basenames
    /// instead.
    pub fn file_id_list(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut directories = vec![self.object_dir.clone()];

        while let Some(dir) = directories.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type()?.is_dir() && !name.contains(':') {
                    directories.push(entry.path());
                } else if !name.contains('.') && !name.ends_with(".ser") {
                    out.push(name);
                }
            }
        }
        Ok(out)
    }

    /// Resumable paged walk over all files on the device.
    ///
    /// Pass `None` to start from the beginning, then the returned list to
    /// continue. Each page holds up to `max_entries` files; `has_more` turns
    /// false once the walk is complete. Per file the objects of the largest
    /// version determine an estimated size: head times stripe count plus the
    /// tail object's length.
    pub fn file_list(&self, list: Option<FileList>, max_entries: usize) -> FileList {
        let mut list = list.unwrap_or_else(|| FileList {
            status: vec![String::new()],
            files: HashMap::new(),
            has_more: false,
        });
        list.files.clear();

        loop {
            let Some(current) = list.status.pop() else {
                list.has_more = false;
                return list;
            };
            let dir = self.object_dir.join(&current);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => {
                    warn!(dir = %dir.display(), "not a valid directory");
                    continue;
                }
            };

            // head: smallest object number of the largest version,
            // tail: largest object number of the largest version
            let mut head: Option<(ObjectFileName, u64)> = None;
            let mut tail: Option<(ObjectFileName, u64)> = None;
            let mut object_size: u64 = 0;

            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    list.status.push(if current.is_empty() {
                        name
                    } else {
                        format!("{current}/{name}")
                    });
                } else if file_type.is_file() && !name.contains('.') && !name.ends_with(".ser") {
                    let length = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    let parsed = match ObjectFileName::parse(&name) {
                        Ok(parsed) => parsed,
                        Err(_) => {
                            warn!(dir = %dir.display(), file = %name, "illegal file discovered and ignored");
                            continue;
                        }
                    };
                    match (head, tail) {
                        (None, _) => {
                            head = Some((parsed, length));
                            tail = Some((parsed, length));
                            object_size = length;
                        }
                        (Some(h), Some(t)) => {
                            if parsed.version > h.0.version {
                                head = Some((parsed, length));
                                tail = Some((parsed, length));
                                object_size = object_size.max(length);
                            } else if parsed.version == h.0.version {
                                if parsed.object_no < h.0.object_no {
                                    head = Some((parsed, length));
                                } else if parsed.object_no > t.0.object_no {
                                    tail = Some((parsed, length));
                                }
                                object_size = object_size.max(length);
                            }
                        }
                        (Some(_), None) => unreachable!("head and tail are set together"),
                    }
                }
            }

            // the directory held objects, so it is a file leaf
            if let (Some(head), Some(tail)) = (head, tail) {
                let stripe_count = tail.0.object_no;
                let file_size = if stripe_count == 1 {
                    head.1
                } else {
                    object_size * stripe_count + tail.1
                };

                let dir_name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let file_id = if COLON_RESERVED {
                    dir_name.replace('_', ":")
                } else {
                    dir_name
                };
                list.files.insert(
                    file_id,
                    FileData {
                        size: file_size,
                        object_size_kb: (object_size / 1024) as u32,
                    },
                );
            }

            if list.files.len() >= max_entries {
                break;
            }
        }

        list.has_more = true;
        list
    }
}

/// Write a fresh object file, optionally forcing it to stable storage
fn write_object_file(path: &Path, data: &[u8], sync: bool) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

/// Best-effort predecessor removal: a failed delete during copy-on-write is
/// non-fatal and not retried
fn remove_predecessor(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not delete predecessor object"),
    }
}
