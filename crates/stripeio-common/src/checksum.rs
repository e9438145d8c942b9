//! Pluggable object checksums.
//!
//! Algorithms are resolved by name through [`ChecksumFactory`] at startup,
//! never hardcoded at call sites. The [`ChecksumEngine`] wraps the resolved
//! algorithm together with the enable switch: when disabled it returns 0 and
//! performs no verification.

use tracing::error;

/// A 64-bit rolling checksum over an object payload.
///
/// Implementations are single-instance and not thread-safe; callers reset
/// before each update/value cycle and serialize access.
pub trait ChecksumAlgorithm: Send {
    /// Registry name of the algorithm
    fn name(&self) -> &'static str;

    /// Reset internal state for a fresh computation
    fn reset(&mut self);

    /// Feed more payload bytes
    fn update(&mut self, data: &[u8]);

    /// Finalized checksum of the bytes fed since the last reset
    fn value(&self) -> u64;
}

/// CRC32C (Castagnoli), widened to 64 bits
pub struct Crc32c {
    state: u32,
}

impl Crc32c {
    #[must_use]
    pub fn new() -> Self {
        Self { state: 0 }
    }
}

impl Default for Crc32c {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumAlgorithm for Crc32c {
    fn name(&self) -> &'static str {
        "crc32c"
    }

    fn reset(&mut self) {
        self.state = 0;
    }

    fn update(&mut self, data: &[u8]) {
        self.state = crc32c::crc32c_append(self.state, data);
    }

    fn value(&self) -> u64 {
        u64::from(self.state)
    }
}

/// xxHash64 with a zero seed
pub struct Xxhash64 {
    state: xxhash_rust::xxh64::Xxh64,
}

impl Xxhash64 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: xxhash_rust::xxh64::Xxh64::new(0),
        }
    }
}

impl Default for Xxhash64 {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumAlgorithm for Xxhash64 {
    fn name(&self) -> &'static str {
        "xxhash64"
    }

    fn reset(&mut self) {
        self.state.reset(0);
    }

    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn value(&self) -> u64 {
        self.state.digest()
    }
}

/// Name-keyed algorithm registry
pub struct ChecksumFactory;

impl ChecksumFactory {
    /// Look up an algorithm by name; `None` when unknown
    #[must_use]
    pub fn create(name: &str) -> Option<Box<dyn ChecksumAlgorithm>> {
        match name {
            "crc32c" => Some(Box::new(Crc32c::new())),
            "xxhash64" => Some(Box::new(Xxhash64::new())),
            _ => None,
        }
    }
}

/// Checksum computation front-end for the storage layout.
///
/// Constructed once per layout instance. A failed algorithm lookup disables
/// checksumming for the process lifetime.
pub struct ChecksumEngine {
    algo: Option<Box<dyn ChecksumAlgorithm>>,
}

impl ChecksumEngine {
    /// Create an engine; resolves the algorithm when `enabled`
    #[must_use]
    pub fn new(enabled: bool, algorithm: &str) -> Self {
        if !enabled {
            return Self { algo: None };
        }
        match ChecksumFactory::create(algorithm) {
            Some(algo) => Self { algo: Some(algo) },
            None => {
                error!("could not instantiate checksum algorithm '{algorithm}'");
                error!("object checksums will be switched off");
                Self { algo: None }
            }
        }
    }

    /// Whether checksums are effectively enabled
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.algo.is_some()
    }

    /// Checksum of the payload; 0 when disabled
    pub fn calc(&mut self, data: &[u8]) -> u64 {
        match &mut self.algo {
            None => 0,
            Some(algo) => {
                algo.reset();
                algo.update(data);
                algo.value()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_lookup() {
        assert!(ChecksumFactory::create("crc32c").is_some());
        assert!(ChecksumFactory::create("xxhash64").is_some());
        assert!(ChecksumFactory::create("adler99").is_none());
    }

    #[test]
    fn test_disabled_engine_returns_zero() {
        let mut engine = ChecksumEngine::new(false, "crc32c");
        assert!(!engine.enabled());
        assert_eq!(engine.calc(b"anything"), 0);
    }

    #[test]
    fn test_unknown_algorithm_disables_engine() {
        let mut engine = ChecksumEngine::new(true, "no-such-algo");
        assert!(!engine.enabled());
        assert_eq!(engine.calc(b"anything"), 0);
    }

    #[test]
    fn test_engine_resets_between_calls() {
        let mut engine = ChecksumEngine::new(true, "crc32c");
        let first = engine.calc(b"hello, world!");
        let second = engine.calc(b"hello, world!");
        assert_eq!(first, second);
        assert_ne!(first, 0);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut algo = Crc32c::new();
        algo.update(b"hello, ");
        algo.update(b"world!");
        let incremental = algo.value();

        let mut one_shot = Crc32c::new();
        one_shot.update(b"hello, world!");
        assert_eq!(incremental, one_shot.value());
    }

    #[test]
    fn test_algorithms_differ() {
        let mut crc = ChecksumEngine::new(true, "crc32c");
        let mut xx = ChecksumEngine::new(true, "xxhash64");
        assert_ne!(crc.calc(b"payload"), xx.calc(b"payload"));
    }
}
