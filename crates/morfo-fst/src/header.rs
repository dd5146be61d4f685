// Binary dictionary header: magic and feature flags.
//
// The header is optional on read; files predating it start directly with the
// letter section and carry no weights.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::FstError;

/// Magic bytes opening a feature-flagged dictionary.
pub const MAGIC: &[u8; 4] = b"LTTB";

/// Feature flag: weights are stored for finals and arcs.
pub const FEATURE_WEIGHTS: u64 = 1 << 0;

/// First flag bit this version does not understand.
pub const FEATURE_UNKNOWN: u64 = 1 << 1;

/// Feature flags read from (or destined for) a dictionary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features(pub u64);

impl Features {
    pub fn weighted(self) -> bool {
        self.0 & FEATURE_WEIGHTS != 0
    }
}

/// Write the magic and flags.
pub fn write_header<W: Write>(features: Features, output: &mut W) -> Result<(), FstError> {
    output.write_all(MAGIC)?;
    output.write_all(&features.0.to_le_bytes())?;
    Ok(())
}

/// Read the optional header.
///
/// If the magic is present, the flags are validated and returned. If not,
/// the stream is rewound to where it started and legacy flags (no weights)
/// are returned. Unknown flag bits are fatal: the file was written by a
/// newer version and cannot be interpreted safely.
pub fn read_header<R: Read + Seek>(input: &mut R) -> Result<Features, FstError> {
    let start = input.stream_position()?;
    let mut magic = [0u8; 4];
    match input.read_exact(&mut magic) {
        Ok(()) if &magic == MAGIC => {
            let mut flag_bytes = [0u8; 8];
            input.read_exact(&mut flag_bytes)?;
            let flags = u64::from_le_bytes(flag_bytes);
            if flags >= FEATURE_UNKNOWN {
                return Err(FstError::UnknownFeatures(flags));
            }
            Ok(Features(flags))
        }
        Ok(()) => {
            input.seek(SeekFrom::Start(start))?;
            Ok(Features(0))
        }
        Err(_) => {
            // Shorter than four bytes: legacy (and almost certainly invalid,
            // but that is for the section readers to diagnose).
            input.seek(SeekFrom::Start(start))?;
            Ok(Features(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_roundtrip() {
        let mut buf = Vec::new();
        write_header(Features(FEATURE_WEIGHTS), &mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let features = read_header(&mut cursor).unwrap();
        assert!(features.weighted());
        assert_eq!(cursor.position(), 12);
    }

    #[test]
    fn legacy_file_without_magic_rewinds() {
        let data = vec![0x03u8, 0x61, 0x62, 0x63];
        let mut cursor = Cursor::new(data);
        let features = read_header(&mut cursor).unwrap();
        assert!(!features.weighted());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn unknown_features_are_fatal() {
        let mut buf = Vec::new();
        write_header(Features(FEATURE_UNKNOWN | FEATURE_WEIGHTS), &mut buf).unwrap();
        let err = read_header(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FstError::UnknownFeatures(_)));
    }

    #[test]
    fn tiny_file_is_treated_as_legacy() {
        let mut cursor = Cursor::new(vec![0x01u8]);
        let features = read_header(&mut cursor).unwrap();
        assert_eq!(features, Features(0));
        assert_eq!(cursor.position(), 0);
    }
}
