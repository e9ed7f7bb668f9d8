//! Archive file format.
//!
//! An archive is a single append-only file:
//!
//! ```text
//! +--------------------+
//! | Magic (4 bytes)    |
//! | Version (u32 BE)   |
//! +--------------------+
//! | Record             |  key_len: u32 BE | key | payload_len: u32 BE
//! | Record             |  | checksum: u64 BE | payload
//! | ...                |
//! +--------------------+
//! ```
//!
//! Records are keyed byte blobs. Duplicate keys are allowed; the last
//! record for a key wins, which is what makes create-or-append writes and
//! the resume-time sidecar rewrite well defined. The checksum is XXHash64
//! over the payload and is verified on every read.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::io::{self, Read};
use std::path::Path;

use twox_hash::XxHash64;

use crate::error::{CacheError, Result};

/// Magic bytes identifying an archive file.
pub const MAGIC: [u8; 4] = *b"HCAR";

/// Current format version.
pub const VERSION: u32 = 1;

/// Size of the file header in bytes.
pub const HEADER_LEN: u64 = 8;

// Keys follow the `example_{index}.p` scheme; anything near this bound is
// not a record boundary but a mis-parse.
const MAX_KEY_LEN: u32 = 4096;

/// Calculates the XXHash64 checksum of a payload.
pub fn checksum(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

/// Encodes the file header.
pub fn encode_header() -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[..4].copy_from_slice(&MAGIC);
    header[4..].copy_from_slice(&VERSION.to_be_bytes());
    header
}

/// Encodes one record, checksum included.
pub fn encode_record(key: &str, payload: &[u8]) -> Vec<u8> {
    let key_bytes = key.as_bytes();
    let mut record = Vec::with_capacity(4 + key_bytes.len() + 4 + 8 + payload.len());
    record.extend_from_slice(&(key_bytes.len() as u32).to_be_bytes());
    record.extend_from_slice(key_bytes);
    record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    record.extend_from_slice(&checksum(payload).to_be_bytes());
    record.extend_from_slice(payload);
    record
}

/// Location of a record payload inside the archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    /// Byte offset of the payload.
    pub offset: u64,
    /// Payload length in bytes.
    pub len: u32,
    /// Expected XXHash64 checksum of the payload.
    pub checksum: u64,
}

/// Result of scanning an archive file.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Key index. Later records shadow earlier ones with the same key.
    pub entries: BTreeMap<String, EntryLocation>,
    /// Length of the valid prefix of the file (header plus complete
    /// records). Anything past this is a torn tail record.
    pub valid_len: u64,
    /// Whether a torn tail record was found.
    pub truncated: bool,
}

/// Validates the header and indexes every complete record.
///
/// A record cut short by an interrupted writer terminates the scan: the
/// entries before it are kept and `valid_len` marks where the tail starts.
/// A structurally invalid record (oversized key length) is corruption, not
/// truncation, and fails the scan.
pub fn scan<R: Read>(reader: &mut R, path: &Path) -> Result<ScanOutcome> {
    let mut header = [0u8; HEADER_LEN as usize];
    reader
        .read_exact(&mut header)
        .map_err(|e| CacheError::archive_with_source(path, "failed to read archive header", e))?;
    if header[..4] != MAGIC {
        return Err(CacheError::archive(path, "bad magic bytes"));
    }
    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version != VERSION {
        return Err(CacheError::archive(
            path,
            format!("unsupported archive version {version}"),
        ));
    }

    let mut entries = BTreeMap::new();
    let mut pos = HEADER_LEN;

    loop {
        let record_start = pos;

        let mut len_buf = [0u8; 4];
        match fill(reader, &mut len_buf, path)? {
            0 => break, // clean end of file
            4 => {}
            _ => return Ok(truncated(entries, record_start)),
        }
        let key_len = u32::from_be_bytes(len_buf);
        if key_len == 0 || key_len > MAX_KEY_LEN {
            return Err(CacheError::archive(
                path,
                format!("invalid record key length {key_len} at offset {record_start}"),
            ));
        }

        let mut key_buf = vec![0u8; key_len as usize];
        if fill(reader, &mut key_buf, path)? != key_buf.len() {
            return Ok(truncated(entries, record_start));
        }
        let key = String::from_utf8(key_buf).map_err(|_| {
            CacheError::archive(path, format!("non-utf8 record key at offset {record_start}"))
        })?;

        let mut payload_len_buf = [0u8; 4];
        if fill(reader, &mut payload_len_buf, path)? != 4 {
            return Ok(truncated(entries, record_start));
        }
        let payload_len = u32::from_be_bytes(payload_len_buf);

        let mut checksum_buf = [0u8; 8];
        if fill(reader, &mut checksum_buf, path)? != 8 {
            return Ok(truncated(entries, record_start));
        }
        let expected_checksum = u64::from_be_bytes(checksum_buf);

        let payload_offset = record_start + 4 + u64::from(key_len) + 4 + 8;
        let mut payload = reader.by_ref().take(u64::from(payload_len));
        let skipped = io::copy(&mut payload, &mut io::sink())
            .map_err(|e| CacheError::archive_with_source(path, "failed to scan record", e))?;
        if skipped != u64::from(payload_len) {
            return Ok(truncated(entries, record_start));
        }

        entries.insert(
            key,
            EntryLocation {
                offset: payload_offset,
                len: payload_len,
                checksum: expected_checksum,
            },
        );
        pos = payload_offset + u64::from(payload_len);
    }

    Ok(ScanOutcome {
        entries,
        valid_len: pos,
        truncated: false,
    })
}

fn truncated(entries: BTreeMap<String, EntryLocation>, valid_len: u64) -> ScanOutcome {
    ScanOutcome {
        entries,
        valid_len,
        truncated: true,
    }
}

/// Reads into `buf` until full or end of stream, returning the byte count.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                return Err(CacheError::archive_with_source(
                    path,
                    "failed to read archive record",
                    e,
                ))
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn archive_bytes(records: &[(&str, &[u8])]) -> Vec<u8> {
        let mut data = encode_header().to_vec();
        for (key, payload) in records {
            data.extend_from_slice(&encode_record(key, payload));
        }
        data
    }

    #[test]
    fn test_scan_empty_archive() {
        let data = archive_bytes(&[]);
        let outcome = scan(&mut Cursor::new(&data), &PathBuf::from("t")).unwrap();
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.valid_len, HEADER_LEN);
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_scan_indexes_records() {
        let data = archive_bytes(&[("a.p", b"alpha"), ("b.p", b"beta")]);
        let outcome = scan(&mut Cursor::new(&data), &PathBuf::from("t")).unwrap();

        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.valid_len, data.len() as u64);

        let a = outcome.entries["a.p"];
        assert_eq!(a.len, 5);
        assert_eq!(a.checksum, checksum(b"alpha"));
        assert_eq!(
            &data[a.offset as usize..(a.offset + u64::from(a.len)) as usize],
            b"alpha"
        );
    }

    #[test]
    fn test_scan_duplicate_key_last_wins() {
        let data = archive_bytes(&[("k.p", b"old"), ("k.p", b"newer")]);
        let outcome = scan(&mut Cursor::new(&data), &PathBuf::from("t")).unwrap();

        assert_eq!(outcome.entries.len(), 1);
        let loc = outcome.entries["k.p"];
        assert_eq!(
            &data[loc.offset as usize..(loc.offset + u64::from(loc.len)) as usize],
            b"newer"
        );
    }

    #[test]
    fn test_scan_torn_tail() {
        let mut data = archive_bytes(&[("a.p", b"alpha")]);
        let complete_len = data.len() as u64;

        // Simulate an interrupted write: half a record at the tail.
        let tail = encode_record("b.p", b"beta");
        data.extend_from_slice(&tail[..tail.len() / 2]);

        let outcome = scan(&mut Cursor::new(&data), &PathBuf::from("t")).unwrap();
        assert!(outcome.truncated);
        assert_eq!(outcome.valid_len, complete_len);
        assert_eq!(outcome.entries.len(), 1);
        assert!(outcome.entries.contains_key("a.p"));
    }

    #[test]
    fn test_scan_bad_magic() {
        let mut data = archive_bytes(&[]);
        data[0] = b'X';
        assert!(scan(&mut Cursor::new(&data), &PathBuf::from("t")).is_err());
    }

    #[test]
    fn test_scan_bad_version() {
        let mut data = archive_bytes(&[]);
        data[4..8].copy_from_slice(&99u32.to_be_bytes());
        assert!(scan(&mut Cursor::new(&data), &PathBuf::from("t")).is_err());
    }

    #[test]
    fn test_scan_oversized_key_is_corruption() {
        let mut data = encode_header().to_vec();
        data.extend_from_slice(&(MAX_KEY_LEN + 1).to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        assert!(scan(&mut Cursor::new(&data), &PathBuf::from("t")).is_err());
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b"payload"), checksum(b"payload"));
        assert_ne!(checksum(b"payload"), checksum(b"payloae"));
    }
}
