//! Per-open-file object version index.
//!
//! The manager is a derived, rebuildable view of the object files present in
//! the file's directory; the directory is the source of truth. Between a
//! file deletion and the corresponding [`VersionManager::remove_object_version`]
//! call the index may briefly reference a file that is already gone; the
//! per-file execution model serializes those windows.

use crate::vlog::{FileVersion, FileVersionLog};
use std::collections::BTreeMap;

/// Identity of one on-disk object version
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectVersionInfo {
    pub version: u64,
    pub timestamp: i64,
    pub checksum: u64,
}

impl ObjectVersionInfo {
    /// Sentinel for "no such object version". Version 0 is reserved for
    /// "does not exist"; timestamp -1 marks the pre-COW era.
    pub const MISSING: ObjectVersionInfo = ObjectVersionInfo {
        version: 0,
        timestamp: -1,
        checksum: 0,
    };

    #[must_use]
    pub fn new(version: u64, timestamp: i64, checksum: u64) -> Self {
        Self {
            version,
            timestamp,
            checksum,
        }
    }

    /// False for the does-not-exist sentinel
    #[must_use]
    pub fn exists(&self) -> bool {
        self.version > 0
    }
}

/// In-memory index of (object number, version, timestamp) -> checksum
pub struct VersionManager {
    versions: BTreeMap<u64, Vec<ObjectVersionInfo>>,
    vlog: FileVersionLog,
    versioning_enabled: bool,
}

impl VersionManager {
    #[must_use]
    pub fn new(vlog: FileVersionLog, versioning_enabled: bool) -> Self {
        Self {
            versions: BTreeMap::new(),
            vlog,
            versioning_enabled,
        }
    }

    /// Register an object version. Re-adding an existing
    /// (version, timestamp) pair replaces its checksum.
    pub fn add_object_version(&mut self, object_no: u64, version: u64, timestamp: i64, checksum: u64) {
        let entries = self.versions.entry(object_no).or_default();
        let info = ObjectVersionInfo::new(version, timestamp, checksum);
        match entries
            .iter_mut()
            .find(|e| e.version == version && e.timestamp == timestamp)
        {
            Some(existing) => *existing = info,
            None => {
                let at = entries
                    .iter()
                    .position(|e| (e.version, e.timestamp) > (version, timestamp))
                    .unwrap_or(entries.len());
                entries.insert(at, info);
            }
        }
    }

    /// Drop an object version from the index
    pub fn remove_object_version(&mut self, object_no: u64, version: u64, timestamp: i64) {
        if let Some(entries) = self.versions.get_mut(&object_no) {
            entries.retain(|e| !(e.version == version && e.timestamp == timestamp));
            if entries.is_empty() {
                self.versions.remove(&object_no);
            }
        }
    }

    /// Exact lookup
    #[must_use]
    pub fn get_object_version(
        &self,
        object_no: u64,
        version: u64,
        timestamp: i64,
    ) -> Option<ObjectVersionInfo> {
        self.versions.get(&object_no).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.version == version && e.timestamp == timestamp)
                .copied()
        })
    }

    /// Largest known version of an object, [`ObjectVersionInfo::MISSING`]
    /// when none is known
    #[must_use]
    pub fn largest_object_version(&self, object_no: u64) -> ObjectVersionInfo {
        self.versions
            .get(&object_no)
            .and_then(|entries| entries.last())
            .copied()
            .unwrap_or(ObjectVersionInfo::MISSING)
    }

    /// Largest known version at or below the given version bound
    #[must_use]
    pub fn largest_object_version_before(&self, object_no: u64, version: u64) -> ObjectVersionInfo {
        self.versions
            .get(&object_no)
            .and_then(|entries| entries.iter().rev().find(|e| e.version <= version))
            .copied()
            .unwrap_or(ObjectVersionInfo::MISSING)
    }

    /// Latest version of an object as of the given timestamp.
    ///
    /// With versioning enabled this is snapshot-aware: the file version log
    /// determines the object count at that point in time, and an object
    /// number at or beyond the count resolves to the does-not-exist sentinel
    /// (the object was truncated away). `object_count` is the fallback count
    /// when the log has no entry in range. Without versioning this degrades
    /// to the largest known version.
    #[must_use]
    pub fn latest_object_version_before(
        &self,
        object_no: u64,
        timestamp: i64,
        object_count: u64,
    ) -> ObjectVersionInfo {
        if !self.versioning_enabled {
            return self.largest_object_version(object_no);
        }

        let count = self
            .vlog
            .latest_before(timestamp)
            .map_or(object_count, |fv| fv.num_objects);
        if object_no >= count {
            return ObjectVersionInfo::MISSING;
        }

        self.versions
            .get(&object_no)
            .and_then(|entries| {
                entries
                    .iter()
                    .filter(|e| e.timestamp <= timestamp)
                    .max_by_key(|e| (e.timestamp, e.version))
            })
            .copied()
            .unwrap_or(ObjectVersionInfo::MISSING)
    }

    /// Largest object number in the index, -1 when empty
    #[must_use]
    pub fn last_object_id(&self) -> i64 {
        self.versions
            .keys()
            .next_back()
            .map_or(-1, |&n| n as i64)
    }

    #[must_use]
    pub fn is_versioning_enabled(&self) -> bool {
        self.versioning_enabled
    }

    /// Most recent whole-file snapshot at or before the timestamp
    #[must_use]
    pub fn latest_file_version_before(&self, timestamp: i64) -> Option<FileVersion> {
        self.vlog.latest_before(timestamp)
    }

    /// Record a whole-file snapshot; the file becomes versioning-enabled
    pub fn append_file_version(
        &mut self,
        file_size: u64,
        num_objects: u64,
        timestamp: i64,
    ) -> stripeio_common::Result<()> {
        self.vlog.append(file_size, num_objects, timestamp)?;
        self.versioning_enabled = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(versioning: bool) -> (tempfile::TempDir, VersionManager) {
        let dir = tempdir().unwrap();
        let vlog = FileVersionLog::new(dir.path().join(".vlog"));
        (dir, VersionManager::new(vlog, versioning))
    }

    #[test]
    fn test_largest_and_exact() {
        let (_dir, mut vm) = manager(false);
        vm.add_object_version(0, 1, 0, 11);
        vm.add_object_version(0, 3, 0, 33);
        vm.add_object_version(0, 2, 0, 22);

        assert_eq!(vm.largest_object_version(0).version, 3);
        assert_eq!(vm.get_object_version(0, 2, 0).unwrap().checksum, 22);
        assert_eq!(vm.get_object_version(0, 2, 1), None);
        assert!(!vm.largest_object_version(9).exists());
    }

    #[test]
    fn test_re_add_replaces_checksum() {
        let (_dir, mut vm) = manager(false);
        vm.add_object_version(4, 2, 0, 100);
        vm.add_object_version(4, 2, 0, 200);
        assert_eq!(vm.get_object_version(4, 2, 0).unwrap().checksum, 200);
        assert_eq!(vm.largest_object_version(4).checksum, 200);
    }

    #[test]
    fn test_remove() {
        let (_dir, mut vm) = manager(false);
        vm.add_object_version(1, 1, 0, 5);
        vm.add_object_version(1, 2, 0, 6);
        vm.remove_object_version(1, 2, 0);
        assert_eq!(vm.largest_object_version(1).version, 1);
        vm.remove_object_version(1, 1, 0);
        assert_eq!(vm.last_object_id(), -1);
    }

    #[test]
    fn test_largest_before() {
        let (_dir, mut vm) = manager(false);
        vm.add_object_version(0, 1, 0, 1);
        vm.add_object_version(0, 5, 0, 5);
        vm.add_object_version(0, 9, 0, 9);

        assert_eq!(vm.largest_object_version_before(0, 7).version, 5);
        assert_eq!(vm.largest_object_version_before(0, 9).version, 9);
        assert!(!vm.largest_object_version_before(0, 0).exists());
    }

    #[test]
    fn test_last_object_id() {
        let (_dir, mut vm) = manager(false);
        assert_eq!(vm.last_object_id(), -1);
        vm.add_object_version(7, 1, 0, 0);
        vm.add_object_version(2, 1, 0, 0);
        assert_eq!(vm.last_object_id(), 7);
    }

    #[test]
    fn test_latest_before_without_versioning_is_largest() {
        let (_dir, mut vm) = manager(false);
        vm.add_object_version(0, 1, 10, 1);
        vm.add_object_version(0, 2, 20, 2);
        let info = vm.latest_object_version_before(0, 15, 1);
        assert_eq!(info.version, 2);
    }

    #[test]
    fn test_latest_before_respects_snapshots() {
        let (_dir, mut vm) = manager(true);
        vm.add_object_version(0, 1, 10, 1);
        vm.add_object_version(0, 2, 20, 2);
        vm.add_object_version(1, 1, 20, 3);
        vm.append_file_version(8192, 1, 10).unwrap();
        vm.append_file_version(16384, 2, 20).unwrap();

        // at ts 10 the file had a single object: object 1 did not exist yet
        assert!(!vm.latest_object_version_before(1, 10, 2).exists());
        assert_eq!(vm.latest_object_version_before(0, 10, 2).version, 1);

        // at ts 20 both objects are visible
        assert_eq!(vm.latest_object_version_before(0, 20, 2).version, 2);
        assert_eq!(vm.latest_object_version_before(1, 20, 2).version, 1);
    }

    #[test]
    fn test_latest_before_truncated_away() {
        let (_dir, mut vm) = manager(true);
        vm.add_object_version(3, 1, 5, 0);
        // a later snapshot shrank the file to two objects
        vm.append_file_version(4096, 2, 30).unwrap();
        assert!(!vm.latest_object_version_before(3, i64::MAX, 4).exists());
    }

    #[test]
    fn test_latest_before_falls_back_to_caller_count() {
        let (_dir, mut vm) = manager(true);
        vm.add_object_version(0, 1, -1, 0);
        // no snapshot in range: the caller-provided count decides
        assert_eq!(vm.latest_object_version_before(0, i64::MAX, 1).version, 1);
        assert!(!vm.latest_object_version_before(2, i64::MAX, 1).exists());
    }

    #[test]
    fn test_legacy_timestamp_sorts_lowest() {
        let (_dir, mut vm) = manager(true);
        vm.add_object_version(0, 5, -1, 0);
        vm.add_object_version(0, 1, 10, 0);
        vm.append_file_version(100, 1, 10).unwrap();
        let info = vm.latest_object_version_before(0, 10, 1);
        assert_eq!((info.version, info.timestamp), (1, 10));
    }
}
