//! stripeio Storage - On-disk object layout
//!
//! This crate implements the object storage layout of the stripeio OSD:
//! - file-id to directory mapping with a bounded hash fan-out (`path`)
//! - the object file-name codec across three historical formats
//!   (`object_name`)
//! - per-open-file version index and whole-file version log (`version`,
//!   `vlog`)
//! - copy-on-write write policy (`cow`)
//! - per-file metadata files and their wire types (`proto`)
//! - the layout engine: read, write, truncate, delete, padding and
//!   enumeration (`layout`)
//!
//! Operations on the same file id are serialized by the calling stage;
//! different files may be worked on in parallel.

pub mod cow;
pub mod layout;
pub mod metadata;
pub mod object_name;
pub mod path;
pub mod proto;
pub mod version;
pub mod vlog;

pub use cow::{CowMode, CowPolicy};
pub use layout::{
    is_compatible_version, FileData, FileList, HashLayout, ObjectInformation, ObjectStatus,
    LAYOUT_VERSION_TAG, MEPOCH_FILENAME, TEPOCH_FILENAME, TLOG_FILENAME, VLOG_FILENAME,
};
pub use metadata::FileMetadata;
pub use object_name::ObjectFileName;
pub use path::PathMapper;
pub use proto::{TruncateLog, TruncateRecord};
pub use version::{ObjectVersionInfo, VersionManager};
pub use vlog::{FileVersion, FileVersionLog};
