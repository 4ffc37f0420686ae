use std::io::Read;

use flate2::read::GzDecoder;
use node_config::{COMPRESSION_GZIP, COMPRESSION_NONE};
use sha2::{Digest, Sha256};
use types::Bundle;

use crate::error::ArchiveError;

/// Turns untrusted storage bytes into a decoded bundle.
///
/// Each step is a gate: nothing is decompressed before the checksum matches,
/// and nothing is returned unless every step succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct BundleCodec;

impl BundleCodec {
    /// Hex SHA-256 of `raw`.
    pub fn checksum(raw: &[u8]) -> String {
        hex::encode(Sha256::digest(raw))
    }

    pub fn verify_checksum(raw: &[u8], expected_hex: &str) -> Result<(), ArchiveError> {
        let actual = Self::checksum(raw);
        if !actual.eq_ignore_ascii_case(expected_hex.trim()) {
            return Err(ArchiveError::ChecksumMismatch {
                expected: expected_hex.to_string(),
                actual,
            });
        }
        Ok(())
    }

    pub fn decompress(raw: &[u8], compression_id: u32) -> Result<Vec<u8>, ArchiveError> {
        match compression_id {
            COMPRESSION_NONE => Ok(raw.to_vec()),
            COMPRESSION_GZIP => {
                let mut decoder = GzDecoder::new(raw);
                let mut decompressed = Vec::new();
                decoder
                    .read_to_end(&mut decompressed)
                    .map_err(ArchiveError::DecompressionFailed)?;
                Ok(decompressed)
            }
            other => Err(ArchiveError::UnsupportedCompression(other)),
        }
    }

    pub fn decode_items(payload: &[u8]) -> Result<Bundle, ArchiveError> {
        serde_json::from_slice(payload).map_err(|err| ArchiveError::DecodeFailed(err.to_string()))
    }

    /// Verify, decompress and decode one bundle.
    pub fn decode(raw: &[u8], compression_id: u32, expected_hex: &str) -> Result<Bundle, ArchiveError> {
        Self::verify_checksum(raw, expected_hex)?;
        let payload = Self::decompress(raw, compression_id)?;
        Self::decode_items(&payload)
    }
}
