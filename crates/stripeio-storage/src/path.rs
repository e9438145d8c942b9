//! File-id to directory-path mapping.
//!
//! Every file gets a dedicated leaf directory reached through a bounded hash
//! fan-out: the file id is hashed, the hash rendered as fixed-width lowercase
//! hex and split into fixed-size chunks, each chunk becoming one directory
//! level. The leaf directory is the (filesystem-safe) file id itself:
//!
//! ```text
//! <hash-chunk-1>/<hash-chunk-2>/.../<file-id>/
//! ```
//!
//! Mappings are memoized in a bounded cache keyed by the original file id.

use parking_lot::Mutex;
use std::collections::HashMap;

/// On hosts where ':' cannot appear in file names, file ids containing ':'
/// are stored with '_' and reversed at enumeration time.
pub(crate) const COLON_RESERVED: bool = cfg!(windows);

const PATH_CACHE_CAPACITY: usize = 2048;

const DEFAULT_MAX_SUBDIRS: u32 = 255;
const DEFAULT_MAX_DIR_DEPTH: u32 = 4;

/// 31-multiplier rolling hash over UTF-16 code units.
///
/// Existing on-disk trees were produced with exactly this function; changing
/// it would make them unresolvable without a migration.
#[must_use]
pub fn string_hash(s: &str) -> i32 {
    let mut h: i32 = 0;
    for unit in s.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    h
}

struct PathCache {
    entries: HashMap<String, (String, u64)>,
    clock: u64,
    capacity: usize,
}

impl PathCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            clock: 0,
            capacity,
        }
    }

    fn get(&mut self, key: &str) -> Option<String> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|(path, stamp)| {
            *stamp = clock;
            path.clone()
        })
    }

    fn put(&mut self, key: String, path: String) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.clock += 1;
        self.entries.insert(key, (path, self.clock));
    }
}

/// Renders relative per-file directory paths
pub struct PathMapper {
    prefix_length: usize,
    hash_cut_length: usize,
    cache: Mutex<PathCache>,
}

impl PathMapper {
    /// Create a mapper for the given fan-out parameters.
    /// A zero parameter falls back to the default.
    #[must_use]
    pub fn new(max_subdirs_per_dir: u32, max_dir_depth: u32) -> Self {
        let max_subdirs = if max_subdirs_per_dir != 0 {
            max_subdirs_per_dir
        } else {
            DEFAULT_MAX_SUBDIRS
        };
        let prefix_length = format!("{max_subdirs:x}").len();

        let depth = if max_dir_depth != 0 {
            max_dir_depth
        } else {
            DEFAULT_MAX_DIR_DEPTH
        };
        let hash_cut_length = depth as usize * prefix_length;

        Self {
            prefix_length,
            hash_cut_length,
            cache: Mutex::new(PathCache::new(PATH_CACHE_CAPACITY)),
        }
    }

    /// Relative path of the per-file directory, with a trailing '/'
    pub fn relative_file_path(&self, file_id: &str) -> String {
        if let Some(hit) = self.cache.lock().get(file_id) {
            return hit;
        }

        let safe_id = if COLON_RESERVED {
            file_id.replace(':', "_")
        } else {
            file_id.to_string()
        };
        let mut path = self.hash_path(&safe_id);
        path.push_str(&safe_id);
        path.push('/');

        self.cache.lock().put(file_id.to_string(), path.clone());
        path
    }

    /// Fan-out directory components for the file id, each followed by '/'
    fn hash_path(&self, file_id: &str) -> String {
        let hash = self.hash_hex(file_id);
        let mut out = String::with_capacity(hash.len() * 2);

        let mut i = 0;
        let mut j = self.prefix_length;
        while j < hash.len() {
            out.push_str(&hash[i..j]);
            out.push('/');
            i += self.prefix_length;
            j += self.prefix_length;
        }
        if j < hash.len() + self.prefix_length {
            out.push_str(&hash[i..]);
            out.push('/');
        }
        out
    }

    /// Lowercase hex render of the sign-extended hash, cut to the configured
    /// length
    fn hash_hex(&self, s: &str) -> String {
        let hash = i64::from(string_hash(s));
        let hex = format!("{:016x}", hash as u64);
        if hex.len() > self.hash_cut_length {
            hex[..self.hash_cut_length].to_string()
        } else {
            hex
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_known_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("abc"), 96354);
        assert_eq!(string_hash("hello"), 99_162_322);
    }

    #[test]
    fn test_negative_hash_sign_extends() {
        // find an id whose 32-bit hash is negative and check the hex render
        let id = (0..100)
            .map(|i| format!("file:{i}"))
            .find(|s| string_hash(s) < 0)
            .expect("some id must hash negative");
        let mapper = PathMapper::new(255, 4);
        let hex = mapper.hash_hex(&id);
        assert!(hex.starts_with('f'), "sign extension lost in {hex}");
    }

    #[test]
    fn test_relative_path_is_deterministic_and_slash_terminated() {
        let mapper = PathMapper::new(255, 4);
        let a = mapper.relative_file_path("vol:17");
        let b = mapper.relative_file_path("vol:17");
        assert_eq!(a, b);
        assert!(a.ends_with('/'));
    }

    #[test]
    fn test_depth_bound() {
        for (subdirs, depth) in [(15u32, 2u32), (255, 4), (4095, 3), (65534, 1)] {
            let mapper = PathMapper::new(subdirs, depth);
            let rel = mapper.relative_file_path("some:file:id");
            // drop the trailing leaf component; the rest are hash chunks
            let chunks = rel.split('/').filter(|c| !c.is_empty()).count() - 1;
            assert!(
                chunks <= depth as usize,
                "{chunks} chunks for depth {depth}: {rel}"
            );
        }
    }

    #[test]
    fn test_chunk_width_follows_fanout() {
        let mapper = PathMapper::new(4095, 4);
        let rel = mapper.relative_file_path("abc");
        let first = rel.split('/').next().unwrap();
        assert_eq!(first.len(), 3); // fff -> 3 hex digits
        assert!(first.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_zero_parameters_fall_back_to_defaults() {
        let explicit = PathMapper::new(255, 4);
        let defaulted = PathMapper::new(0, 0);
        assert_eq!(
            explicit.relative_file_path("x:1"),
            defaulted.relative_file_path("x:1")
        );
    }

    #[test]
    fn test_path_depends_only_on_hash() {
        // two different ids happening to share a hash must share a hash path
        let mapper = PathMapper::new(255, 4);
        // Aa and BB collide under the 31-multiplier hash
        assert_eq!(string_hash("Aa"), string_hash("BB"));
        assert_eq!(mapper.hash_path("Aa"), mapper.hash_path("BB"));
    }

    #[test]
    fn test_cache_eviction_keeps_results_correct() {
        let mapper = PathMapper::new(255, 4);
        let expected = mapper.relative_file_path("probe");
        for i in 0..(PATH_CACHE_CAPACITY + 16) {
            mapper.relative_file_path(&format!("filler:{i}"));
        }
        assert_eq!(mapper.relative_file_path("probe"), expected);
    }
}
