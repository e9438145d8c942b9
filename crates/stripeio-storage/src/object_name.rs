//! Object file-name codec.
//!
//! The name of an object file carries the object's full identity. Three
//! historical widths are still decoded (all fields big-endian hex,
//! zero-padded, lowercase):
//!
//! | Length | Layout                                                   |
//! |--------|----------------------------------------------------------|
//! | 32     | objNo(16) version(8) checksum(8), timestamp := -1        |
//! | 48     | objNo(16) version(16) checksum(16), timestamp := -1      |
//! | 64     | objNo(16) version(16) checksum(16) timestamp(16)         |
//!
//! Encoding always emits the 48-character form and appends the timestamp
//! field when the timestamp is not -1.

use std::fmt;
use std::fmt::Write as _;
use stripeio_common::{Error, Result};

/// Identity encoded in an object file name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectFileName {
    pub object_no: u64,
    pub version: u64,
    pub timestamp: i64,
    pub checksum: u64,
}

impl ObjectFileName {
    #[must_use]
    pub fn new(object_no: u64, version: u64, timestamp: i64, checksum: u64) -> Self {
        Self {
            object_no,
            version,
            timestamp,
            checksum,
        }
    }

    /// Render the on-disk file name
    #[must_use]
    pub fn encode(&self) -> String {
        let mut name = String::with_capacity(64);
        write_hex_u64(&mut name, self.object_no);
        write_hex_u64(&mut name, self.version);
        write_hex_u64(&mut name, self.checksum);
        if self.timestamp != -1 {
            write_hex_u64(&mut name, self.timestamp as u64);
        }
        name
    }

    /// Parse an on-disk file name in any of the three historical widths
    pub fn parse(name: &str) -> Result<Self> {
        match name.len() {
            32 => Ok(Self {
                object_no: read_hex(name, 0, 16)?,
                version: read_hex(name, 16, 8)?,
                checksum: read_hex(name, 24, 8)?,
                timestamp: -1,
            }),
            48 => Ok(Self {
                object_no: read_hex(name, 0, 16)?,
                version: read_hex(name, 16, 16)?,
                checksum: read_hex(name, 32, 16)?,
                timestamp: -1,
            }),
            64 => Ok(Self {
                object_no: read_hex(name, 0, 16)?,
                version: read_hex(name, 16, 16)?,
                checksum: read_hex(name, 32, 16)?,
                timestamp: read_hex(name, 48, 16)? as i64,
            }),
            _ => Err(Error::InvalidObjectName(name.to_string())),
        }
    }
}

impl fmt::Display for ObjectFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn write_hex_u64(out: &mut String, value: u64) {
    let _ = write!(out, "{value:016x}");
}

fn read_hex(name: &str, start: usize, len: usize) -> Result<u64> {
    // get() instead of indexing: the name may be arbitrary directory content
    let field = name
        .get(start..start + len)
        .ok_or_else(|| Error::InvalidObjectName(name.to_string()))?;
    if !field
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return Err(Error::InvalidObjectName(name.to_string()));
    }
    u64::from_str_radix(field, 16).map_err(|_| Error::InvalidObjectName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_encode_without_timestamp_is_48_chars() {
        let name = ObjectFileName::new(0, 1, -1, 0).encode();
        assert_eq!(name.len(), 48);
        assert_eq!(
            name,
            "000000000000000000000000000000010000000000000000"
        );
    }

    #[test]
    fn test_encode_with_timestamp_is_64_chars() {
        let name = ObjectFileName::new(3, 2, 5, 0xdead_beef).encode();
        assert_eq!(name.len(), 64);
        assert_eq!(
            name,
            "0000000000000003000000000000000200000000deadbeef0000000000000005"
        );
    }

    #[test]
    fn test_roundtrip_boundaries() {
        let cases = [
            ObjectFileName::new(0, 1, -1, 0),
            ObjectFileName::new(0, 1, 0, 0),
            ObjectFileName::new(u64::MAX, u64::MAX, i64::MAX, u64::MAX),
            ObjectFileName::new(1, u64::MAX, -1, u64::MAX),
            ObjectFileName::new(42, 7, 0, 0xcafe),
        ];
        for case in cases {
            assert_eq!(ObjectFileName::parse(&case.encode()).unwrap(), case);
        }
    }

    #[test]
    fn test_roundtrip_random() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let ts = if rng.gen_bool(0.5) {
                -1
            } else {
                rng.gen_range(0..i64::MAX)
            };
            let name = ObjectFileName::new(rng.gen(), rng.gen(), ts, rng.gen());
            assert_eq!(ObjectFileName::parse(&name.encode()).unwrap(), name);
        }
    }

    #[test]
    fn test_parse_legacy_32() {
        // objNo(16) version(8) checksum(8)
        let parsed = ObjectFileName::parse("000000000000002a00000003000000ff").unwrap();
        assert_eq!(parsed.object_no, 42);
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.checksum, 255);
        assert_eq!(parsed.timestamp, -1);
    }

    #[test]
    fn test_parse_48_has_legacy_timestamp() {
        let parsed = ObjectFileName::parse(
            "000000000000002a000000000000000300000000000000ff",
        )
        .unwrap();
        assert_eq!(parsed.object_no, 42);
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.checksum, 255);
        assert_eq!(parsed.timestamp, -1);
    }

    #[test]
    fn test_parse_rejects_bad_lengths() {
        assert!(ObjectFileName::parse("").is_err());
        assert!(ObjectFileName::parse("abcd").is_err());
        assert!(ObjectFileName::parse(&"0".repeat(47)).is_err());
        assert!(ObjectFileName::parse(&"0".repeat(63)).is_err());
        assert!(ObjectFileName::parse(&"0".repeat(65)).is_err());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(ObjectFileName::parse(&"g".repeat(48)).is_err());
        assert!(ObjectFileName::parse(&"A".repeat(48)).is_err());
        assert!(ObjectFileName::parse(&"+".repeat(32)).is_err());
    }
}
