//! Artifact compression: gzip via `flate2`, compressed before inserting
//! into either cache tier.
//!
//! Algorithm selection is "by intent" (speed, size, balanced); `flate2`
//! is the only compression codec in use, so the three intents map to its
//! three compression levels rather than three distinct codecs. The
//! chosen intent is recorded alongside the bytes so decompression stays
//! unambiguous.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::errors::CacheError;

/// Artifacts at or below this size are stored verbatim.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionIntent {
    Speed,
    Size,
    Balanced,
}

impl CompressionIntent {
    fn level(self) -> Compression {
        match self {
            CompressionIntent::Speed => Compression::fast(),
            CompressionIntent::Size => Compression::best(),
            CompressionIntent::Balanced => Compression::new(6),
        }
    }

    #[must_use]
    pub fn algorithm_name(self) -> &'static str {
        match self {
            CompressionIntent::Speed => "gzip-fast",
            CompressionIntent::Size => "gzip-best",
            CompressionIntent::Balanced => "gzip-balanced",
        }
    }
}

/// Compress `data` if it exceeds `threshold`, returning `(bytes,
/// algorithm)`. `algorithm` is `None` when stored verbatim.
pub fn compress(data: &[u8], intent: CompressionIntent, threshold: usize) -> Result<(Vec<u8>, Option<&'static str>), CacheError> {
    if data.len() <= threshold {
        return Ok((data.to_vec(), None));
    }

    let mut encoder = GzEncoder::new(Vec::new(), intent.level());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CacheError::Compression(e.to_string()))?;

    Ok((compressed, Some(intent.algorithm_name())))
}

/// Decompress `data` according to `algorithm`. `None` means the bytes were
/// stored verbatim.
pub fn decompress(data: &[u8], algorithm: Option<&str>) -> Result<Vec<u8>, CacheError> {
    match algorithm {
        None => Ok(data.to_vec()),
        Some(alg) if alg.starts_with("gzip") => {
            let mut decoder = GzDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CacheError::Decompression(e.to_string()))?;
            Ok(out)
        }
        Some(other) => Err(CacheError::Decompression(format!(
            "unknown compression algorithm: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_artifact_stored_verbatim() {
        let data = b"short";
        let (bytes, algo) = compress(data, CompressionIntent::Balanced, COMPRESSION_THRESHOLD_BYTES).unwrap();
        assert_eq!(bytes, data);
        assert!(algo.is_none());
    }

    #[test]
    fn large_artifact_round_trips_for_every_intent() {
        let data = "x".repeat(4096).into_bytes();
        for intent in [CompressionIntent::Speed, CompressionIntent::Size, CompressionIntent::Balanced] {
            let (compressed, algo) = compress(&data, intent, COMPRESSION_THRESHOLD_BYTES).unwrap();
            assert!(algo.is_some());
            assert!(compressed.len() < data.len());
            let restored = decompress(&compressed, algo).unwrap();
            assert_eq!(restored, data);
        }
    }

    #[test]
    fn unknown_algorithm_fails_to_decompress() {
        let err = decompress(b"whatever", Some("lz9000")).unwrap_err();
        assert!(matches!(err, CacheError::Decompression(_)));
    }
}
