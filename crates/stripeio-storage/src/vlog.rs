//! Persistent whole-file version log.
//!
//! Append-only record of file snapshots, written on copy-on-write commits.
//! Its mere presence next to the object files marks the file as
//! versioning-enabled.
//!
//! Record format (big-endian, 24 bytes):
//! ```text
//! +-----------+-----------+-------------+
//! | timestamp | file size | num objects |
//! | 8B        | 8B        | 8B          |
//! +-----------+-----------+-------------+
//! ```
//! A torn trailing record is dropped on load.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use stripeio_common::Result;

const RECORD_SIZE: usize = 24;

/// One whole-file snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileVersion {
    pub timestamp: i64,
    pub file_size: u64,
    pub num_objects: u64,
}

/// Append log of [`FileVersion`] entries backed by a single file
pub struct FileVersionLog {
    path: PathBuf,
    entries: Vec<FileVersion>,
}

impl FileVersionLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Read the whole log from disk, replacing any in-memory entries.
    /// The remainder after the last complete record is discarded.
    pub fn load(&mut self) -> Result<()> {
        let data = std::fs::read(&self.path)?;
        self.entries.clear();
        for record in data.chunks_exact(RECORD_SIZE) {
            self.entries.push(FileVersion {
                timestamp: i64::from_be_bytes(record[0..8].try_into().unwrap()),
                file_size: u64::from_be_bytes(record[8..16].try_into().unwrap()),
                num_objects: u64::from_be_bytes(record[16..24].try_into().unwrap()),
            });
        }
        Ok(())
    }

    /// Append one snapshot, durably, and record it in memory
    pub fn append(&mut self, file_size: u64, num_objects: u64, timestamp: i64) -> Result<()> {
        let mut record = [0u8; RECORD_SIZE];
        record[0..8].copy_from_slice(&timestamp.to_be_bytes());
        record[8..16].copy_from_slice(&file_size.to_be_bytes());
        record[16..24].copy_from_slice(&num_objects.to_be_bytes());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&record)?;
        file.sync_data()?;

        self.entries.push(FileVersion {
            timestamp,
            file_size,
            num_objects,
        });
        Ok(())
    }

    /// Most recent entry with a timestamp at or before the given bound
    #[must_use]
    pub fn latest_before(&self, timestamp: i64) -> Option<FileVersion> {
        self.entries
            .iter()
            .filter(|fv| fv.timestamp <= timestamp)
            .max_by_key(|fv| fv.timestamp)
            .copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".vlog");

        {
            let mut log = FileVersionLog::new(&path);
            log.append(1000, 1, 10).unwrap();
            log.append(5000, 2, 20).unwrap();
            log.append(3000, 2, 30).unwrap();
        }

        let mut log = FileVersionLog::new(&path);
        log.load().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.latest_before(i64::MAX),
            Some(FileVersion {
                timestamp: 30,
                file_size: 3000,
                num_objects: 2
            })
        );
    }

    #[test]
    fn test_latest_before_bounds() {
        let dir = tempdir().unwrap();
        let mut log = FileVersionLog::new(dir.path().join(".vlog"));
        log.append(100, 1, 10).unwrap();
        log.append(200, 1, 20).unwrap();

        assert_eq!(log.latest_before(5), None);
        assert_eq!(log.latest_before(10).unwrap().file_size, 100);
        assert_eq!(log.latest_before(15).unwrap().file_size, 100);
        assert_eq!(log.latest_before(20).unwrap().file_size, 200);
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".vlog");

        {
            let mut log = FileVersionLog::new(&path);
            log.append(100, 1, 10).unwrap();
            log.append(200, 2, 20).unwrap();
        }

        // simulate a crash mid-append
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&[0xab; 7]);
        std::fs::write(&path, &data).unwrap();

        let mut log = FileVersionLog::new(&path);
        log.load().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest_before(i64::MAX).unwrap().timestamp, 20);
    }

    #[test]
    fn test_empty_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".vlog");
        std::fs::write(&path, b"").unwrap();

        let mut log = FileVersionLog::new(&path);
        log.load().unwrap();
        assert!(log.is_empty());
        assert_eq!(log.latest_before(i64::MAX), None);
    }
}
