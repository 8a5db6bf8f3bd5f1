//! On-disk manifest format
//!
//! Each record is `path NUL secs.nanos NUL hash NUL NUL`. There is no header,
//! count or checksum; records simply follow each other until EOF. Older
//! manifests end records with a newline instead of the final NUL, which is
//! still accepted when decoding.

use super::{FileRecord, Manifest, Timestamp};
use crate::hash::ContentHash;
use std::io::{self, Write};
use thiserror::Error;

const NUL: u8 = 0;
const LEGACY_TERMINATOR: u8 = b'\n';

/// Malformed or truncated manifest data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("truncated manifest: no terminator after {field} starting at byte {offset}")]
    Truncated { offset: usize, field: &'static str },

    #[error("path at byte {offset} is not valid UTF-8")]
    InvalidPath { offset: usize },

    #[error("malformed timestamp {text:?} at byte {offset}: {reason}")]
    InvalidTimestamp {
        offset: usize,
        text: String,
        reason: &'static str,
    },

    #[error("malformed content hash {text:?} at byte {offset}")]
    InvalidHash { offset: usize, text: String },

    #[error("expected NUL or newline at byte {offset}, found {found:#04x}")]
    MissingRecordEnd { offset: usize, found: u8 },
}

/// Write every record of `manifest` to `out`
pub fn encode<W: Write>(manifest: &Manifest, out: &mut W) -> io::Result<()> {
    for (path, record) in manifest.iter() {
        out.write_all(path.as_bytes())?;
        out.write_all(&[NUL])?;
        write!(out, "{}", record.modified)?;
        out.write_all(&[NUL])?;
        out.write_all(record.content_hash.to_hex().as_bytes())?;
        out.write_all(&[NUL, NUL])?;
    }
    Ok(())
}

/// Encode into a fresh buffer
pub fn encode_to_vec(manifest: &Manifest) -> Vec<u8> {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail
    let _ = encode(manifest, &mut buf);
    buf
}

/// Parse a complete manifest
///
/// Any deviation from the format is an error; nothing is skipped or repaired.
/// When a path appears twice the later record wins.
pub fn decode(data: &[u8]) -> Result<Manifest, FormatError> {
    let mut reader = RecordReader { data, pos: 0 };
    let mut manifest = Manifest::new();

    while !reader.at_end() {
        let (path, record) = reader.next_record()?;
        manifest.insert(path, record);
    }

    Ok(manifest)
}

struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn next_record(&mut self) -> Result<(String, FileRecord), FormatError> {
        let path_offset = self.pos;
        let path = self.field("path")?;
        let path = std::str::from_utf8(path)
            .map_err(|_| FormatError::InvalidPath {
                offset: path_offset,
            })?
            .to_string();

        let time_offset = self.pos;
        let modified = parse_timestamp(self.field("timestamp")?, time_offset)?;

        let hash_offset = self.pos;
        let hash = self.field("hash")?;
        let content_hash = std::str::from_utf8(hash)
            .ok()
            .and_then(|text| text.parse::<ContentHash>().ok())
            .ok_or_else(|| FormatError::InvalidHash {
                offset: hash_offset,
                text: String::from_utf8_lossy(hash).into_owned(),
            })?;

        match self.data.get(self.pos) {
            Some(&NUL) | Some(&LEGACY_TERMINATOR) => self.pos += 1,
            Some(&found) => {
                return Err(FormatError::MissingRecordEnd {
                    offset: self.pos,
                    found,
                })
            }
            None => {
                return Err(FormatError::Truncated {
                    offset: hash_offset,
                    field: "record",
                })
            }
        }

        Ok((path, FileRecord::new(content_hash, modified)))
    }

    /// Read up to the next NUL and step past it
    fn field(&mut self, name: &'static str) -> Result<&'a [u8], FormatError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == NUL)
            .ok_or(FormatError::Truncated {
                offset: self.pos,
                field: name,
            })?;
        self.pos += len + 1;
        Ok(&rest[..len])
    }
}

fn parse_timestamp(raw: &[u8], offset: usize) -> Result<Timestamp, FormatError> {
    let invalid = |reason| FormatError::InvalidTimestamp {
        offset,
        text: String::from_utf8_lossy(raw).into_owned(),
        reason,
    };

    let dot = raw
        .iter()
        .position(|&b| b == b'.')
        .ok_or_else(|| invalid("expected '.'"))?;
    let (secs, nanos) = (&raw[..dot], &raw[dot + 1..]);

    let secs = parse_decimal(secs).ok_or_else(|| invalid("seconds are not a decimal number"))?;
    let nanos = parse_decimal(nanos)
        .ok_or_else(|| invalid("nanoseconds are not a decimal number"))?;
    u32::try_from(nanos)
        .ok()
        .and_then(|nanos| Timestamp::new(secs, nanos))
        .ok_or_else(|| invalid("nanoseconds out of range"))
}

/// Unsigned decimal with at least one digit and nothing else
fn parse_decimal(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    const ABC: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    fn record(content: &[u8], secs: u64, nanos: u32) -> FileRecord {
        FileRecord::new(hash_bytes(content), Timestamp::new(secs, nanos).unwrap())
    }

    fn sample_manifest() -> Manifest {
        let mut manifest = Manifest::new();
        manifest.insert("./a.txt", record(b"abc", 1_700_000_000, 123_456_789));
        manifest.insert("./dir/b with spaces", record(b"", 0, 0));
        manifest.insert("./dir/ünïcode\nname", record(b"x", 42, 999_999_999));
        manifest
    }

    #[test]
    fn test_encode_layout() {
        let mut manifest = Manifest::new();
        manifest.insert("./a", record(b"abc", 12, 34));

        let bytes = encode_to_vec(&manifest);
        let expected = format!("./a\0{}\0{}\0\0", "12.34", ABC);
        assert_eq!(bytes, expected.as_bytes());
    }

    #[test]
    fn test_round_trip() {
        let manifest = sample_manifest();
        let decoded = decode(&encode_to_vec(&manifest)).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode(b"").unwrap(), Manifest::new());
    }

    #[test]
    fn test_newline_terminator_accepted() {
        let data = format!("./a\0{}\0{}\0\n./b\0{}\0{}\0\0", "1.2", ABC, "3.4", ABC);
        let manifest = decode(data.as_bytes()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("./b").unwrap().modified, Timestamp::new(3, 4).unwrap());
    }

    #[test]
    fn test_later_duplicate_wins() {
        let data = format!("./a\0{}\0{}\0\0./a\0{}\0{}\0\0", "1.0", ABC, "2.0", ABC);
        let manifest = decode(data.as_bytes()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("./a").unwrap().modified.secs, 2);
    }

    #[test]
    fn test_truncation_is_error_everywhere() {
        let full = encode_to_vec(&sample_manifest());
        // Every strict prefix that ends inside a record must fail
        let record_ends: Vec<usize> = {
            let mut ends = Vec::new();
            let mut nuls = 0;
            for (i, &b) in full.iter().enumerate() {
                if b == NUL {
                    nuls += 1;
                    if nuls % 4 == 0 {
                        ends.push(i + 1);
                    }
                }
            }
            ends
        };

        for len in 1..full.len() {
            let result = decode(&full[..len]);
            if record_ends.contains(&len) {
                assert!(result.is_ok(), "prefix {} ends on a record boundary", len);
            } else {
                assert!(result.is_err(), "prefix {} should be rejected", len);
            }
        }
    }

    #[test]
    fn test_missing_final_terminator() {
        let data = format!("./a\0{}\0{}\0", "1.2", ABC);
        assert!(matches!(
            decode(data.as_bytes()),
            Err(FormatError::Truncated { field: "record", .. })
        ));
    }

    #[test]
    fn test_trailing_garbage() {
        let data = format!("./a\0{}\0{}\0X", "1.2", ABC);
        assert!(matches!(
            decode(data.as_bytes()),
            Err(FormatError::MissingRecordEnd { found: b'X', .. })
        ));
    }

    #[test]
    fn test_malformed_timestamps() {
        for bad in ["12", "12.", ".5", "12.5x", "-1.5", "+1.5", "1.-5", "1.2.3", "1.1000000000"] {
            let data = format!("./a\0{}\0{}\0\0", bad, ABC);
            assert!(
                matches!(
                    decode(data.as_bytes()),
                    Err(FormatError::InvalidTimestamp { .. })
                ),
                "timestamp {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_malformed_hash() {
        let data = format!("./a\0{}\0{}\0\0", "1.2", &ABC[..39]);
        assert!(matches!(
            decode(data.as_bytes()),
            Err(FormatError::InvalidHash { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_path() {
        let mut data = vec![b'.', b'/', 0xff, 0];
        data.extend_from_slice(format!("1.2\0{}\0\0", ABC).as_bytes());
        assert_eq!(decode(&data), Err(FormatError::InvalidPath { offset: 0 }));
    }
}
