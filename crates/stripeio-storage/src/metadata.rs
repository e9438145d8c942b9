//! Per-open-file metadata.

use crate::version::VersionManager;
use std::sync::Arc;
use stripeio_common::striping::StripingPolicy;

/// Everything the layout keeps in memory about an open file.
///
/// `last_object_number` and `global_last_object_number` use -1 for "no
/// objects"; the global number is a cluster-wide hint maintained upstream.
pub struct FileMetadata {
    striping: Arc<dyn StripingPolicy>,
    versions: VersionManager,
    file_size: u64,
    last_object_number: i64,
    global_last_object_number: i64,
    truncate_epoch: i64,
}

impl FileMetadata {
    #[must_use]
    pub fn new(striping: Arc<dyn StripingPolicy>, versions: VersionManager) -> Self {
        Self {
            striping,
            versions,
            file_size: 0,
            last_object_number: -1,
            global_last_object_number: -1,
            truncate_epoch: 0,
        }
    }

    #[must_use]
    pub fn striping(&self) -> &dyn StripingPolicy {
        self.striping.as_ref()
    }

    #[must_use]
    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn versions_mut(&mut self) -> &mut VersionManager {
        &mut self.versions
    }

    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn set_file_size(&mut self, size: u64) {
        self.file_size = size;
    }

    #[must_use]
    pub fn last_object_number(&self) -> i64 {
        self.last_object_number
    }

    pub fn set_last_object_number(&mut self, n: i64) {
        self.last_object_number = n;
    }

    #[must_use]
    pub fn global_last_object_number(&self) -> i64 {
        self.global_last_object_number
    }

    pub fn set_global_last_object_number(&mut self, n: i64) {
        self.global_last_object_number = n;
    }

    #[must_use]
    pub fn truncate_epoch(&self) -> i64 {
        self.truncate_epoch
    }

    pub fn set_truncate_epoch(&mut self, epoch: i64) {
        self.truncate_epoch = epoch;
    }
}
