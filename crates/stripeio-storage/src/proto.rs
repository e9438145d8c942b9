//! Wire types persisted alongside object files.
//!
//! The truncate log is stored length-delimited in the per-file `.tlog`
//! metadata file; the schema is shared with the consensus layer.

/// One truncate operation
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TruncateRecord {
    /// Truncate generation the record belongs to
    #[prost(uint64, tag = "1")]
    pub version: u64,
    /// Last object number after the truncate
    #[prost(uint64, tag = "2")]
    pub last_object_number: u64,
}

/// History of truncate operations for one file
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TruncateLog {
    #[prost(message, repeated, tag = "1")]
    pub records: ::prost::alloc::vec::Vec<TruncateRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_length_delimited_roundtrip() {
        let log = TruncateLog {
            records: vec![
                TruncateRecord {
                    version: 1,
                    last_object_number: 9,
                },
                TruncateRecord {
                    version: 2,
                    last_object_number: 4,
                },
            ],
        };

        let buf = log.encode_length_delimited_to_vec();
        let decoded = TruncateLog::decode_length_delimited(buf.as_slice()).unwrap();
        assert_eq!(decoded, log);
    }

    #[test]
    fn test_empty_log_encodes() {
        let log = TruncateLog::default();
        let buf = log.encode_length_delimited_to_vec();
        let decoded = TruncateLog::decode_length_delimited(buf.as_slice()).unwrap();
        assert!(decoded.records.is_empty());
    }
}
