//! Configuration types for the storage layout.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fan-out bound: at most 16 subdirectories per directory level.
pub const SUBDIRS_16: u32 = 15;
/// Fan-out bound: at most 256 subdirectories per directory level.
pub const SUBDIRS_256: u32 = 255;
/// Fan-out bound: at most 4096 subdirectories per directory level.
pub const SUBDIRS_4096: u32 = 4095;
/// Fan-out bound: at most 65535 subdirectories per directory level.
pub const SUBDIRS_65535: u32 = 65534;
/// Fan-out bound: at most 1M subdirectories per directory level.
pub const SUBDIRS_1048576: u32 = 1_048_575;
/// Fan-out bound: at most 16M subdirectories per directory level.
pub const SUBDIRS_16777216: u32 = 16_777_215;

/// Configuration for the on-disk object layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Root directory holding all object files
    pub object_dir: PathBuf,
    /// Compute and verify per-object checksums
    #[serde(default)]
    pub checksums_enabled: bool,
    /// Checksum algorithm name, resolved through the factory at startup
    #[serde(default = "default_checksum_algorithm")]
    pub checksum_algorithm: String,
    /// Maximum number of subdirectories per fan-out level
    #[serde(default = "default_max_subdirs_per_dir")]
    pub max_subdirs_per_dir: u32,
    /// Maximum number of fan-out levels
    #[serde(default = "default_max_dir_depth")]
    pub max_dir_depth: u32,
}

impl LayoutConfig {
    /// Create a config with defaults for the given storage root
    pub fn new(object_dir: impl Into<PathBuf>) -> Self {
        Self {
            object_dir: object_dir.into(),
            checksums_enabled: false,
            checksum_algorithm: default_checksum_algorithm(),
            max_subdirs_per_dir: default_max_subdirs_per_dir(),
            max_dir_depth: default_max_dir_depth(),
        }
    }
}

fn default_checksum_algorithm() -> String {
    "crc32c".to_string()
}

fn default_max_subdirs_per_dir() -> u32 {
    SUBDIRS_256
}

fn default_max_dir_depth() -> u32 {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LayoutConfig::new("/var/lib/stripeio/objs");
        assert!(!config.checksums_enabled);
        assert_eq!(config.checksum_algorithm, "crc32c");
        assert_eq!(config.max_subdirs_per_dir, SUBDIRS_256);
        assert_eq!(config.max_dir_depth, 4);
    }
}
