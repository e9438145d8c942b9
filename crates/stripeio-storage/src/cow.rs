//! Copy-on-write decision oracle for one open file.

use std::collections::HashSet;

/// When writes copy their predecessor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CowMode {
    /// Writes always go in place
    Never,
    /// The first write to each object in this open-file lifetime copies;
    /// later writes go in place
    OnFirstWrite,
}

/// Tracks which objects have already been overwritten since the file was
/// opened
pub struct CowPolicy {
    mode: CowMode,
    changed: HashSet<u64>,
}

impl CowPolicy {
    #[must_use]
    pub fn new(mode: CowMode) -> Self {
        Self {
            mode,
            changed: HashSet::new(),
        }
    }

    /// Policy with copy-on-write switched off
    #[must_use]
    pub fn no_cow() -> Self {
        Self::new(CowMode::Never)
    }

    #[must_use]
    pub fn cow_enabled(&self) -> bool {
        self.mode == CowMode::OnFirstWrite
    }

    /// True when the next write to this object must preserve its predecessor
    #[must_use]
    pub fn is_cow(&self, object_no: u64) -> bool {
        self.cow_enabled() && !self.changed.contains(&object_no)
    }

    /// Mark the object overwritten; later writes in this lifetime skip the
    /// copy
    pub fn object_changed(&mut self, object_no: u64) {
        self.changed.insert(object_no);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_mode() {
        let policy = CowPolicy::no_cow();
        assert!(!policy.cow_enabled());
        assert!(!policy.is_cow(0));
    }

    #[test]
    fn test_only_first_write_copies() {
        let mut policy = CowPolicy::new(CowMode::OnFirstWrite);
        assert!(policy.is_cow(3));
        policy.object_changed(3);
        assert!(!policy.is_cow(3));
        // other objects are unaffected
        assert!(policy.is_cow(4));
    }
}
