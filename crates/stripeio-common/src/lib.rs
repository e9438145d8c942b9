//! stripeio Common - Shared types and utilities
//!
//! This crate provides the error type, configuration structures, the
//! pluggable checksum registry and the striping-policy seam used by the
//! stripeio storage components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod striping;

pub use checksum::{ChecksumAlgorithm, ChecksumEngine, ChecksumFactory};
pub use config::LayoutConfig;
pub use error::{Error, Result};
pub use striping::{Raid0, StripingPolicy};
