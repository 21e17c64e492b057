//! Block integrity checks.
//!
//! The stream header picks one check for all blocks: none, CRC-32, CRC-64,
//! or SHA-256. All three checksummers share the incremental
//! `update`/`finalize` shape; CRCs are stored little-endian.

use oxz_core::crc::{Crc32, Crc64};
use oxz_core::error::{OxzError, Result};
use sha2::{Digest, Sha256};

/// Check type from the stream flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckKind {
    /// No integrity check (0x00).
    None,
    /// CRC-32 (0x01).
    Crc32,
    /// CRC-64/ECMA-182 (0x04).
    #[default]
    Crc64,
    /// SHA-256 (0x0A).
    Sha256,
}

impl CheckKind {
    /// Parse the check byte of the stream flags.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Crc32),
            0x04 => Ok(Self::Crc64),
            0x0A => Ok(Self::Sha256),
            other => Err(OxzError::unsupported_check(other)),
        }
    }

    /// The stream-flags byte for this check.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Crc32 => 0x01,
            Self::Crc64 => 0x04,
            Self::Sha256 => 0x0A,
        }
    }

    /// Stored size of the check in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Crc32 => 4,
            Self::Crc64 => 8,
            Self::Sha256 => 32,
        }
    }

    /// Human-readable name, used in error reports and listings.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Crc32 => "CRC32",
            Self::Crc64 => "CRC64",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Incremental checksummer for one block.
pub enum Checksummer {
    /// No check: zero-length result.
    None,
    /// CRC-32 state.
    Crc32(Crc32),
    /// CRC-64 state.
    Crc64(Crc64),
    /// SHA-256 state.
    Sha256(Box<Sha256>),
}

impl Checksummer {
    /// Start a checksummer of the given kind.
    pub fn new(kind: CheckKind) -> Self {
        match kind {
            CheckKind::None => Self::None,
            CheckKind::Crc32 => Self::Crc32(Crc32::new()),
            CheckKind::Crc64 => Self::Crc64(Crc64::new()),
            CheckKind::Sha256 => Self::Sha256(Box::new(Sha256::new())),
        }
    }

    /// Absorb more data.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::None => {}
            Self::Crc32(crc) => crc.update(data),
            Self::Crc64(crc) => crc.update(data),
            Self::Sha256(sha) => sha.update(data),
        }
    }

    /// Finish and return the stored form of the check (CRCs little-endian).
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::Crc32(crc) => crc.finalize().to_le_bytes().to_vec(),
            Self::Crc64(crc) => crc.finalize().to_le_bytes().to_vec(),
            Self::Sha256(sha) => sha.finalize().to_vec(),
        }
    }

    /// The check kind this summer computes.
    pub fn kind(&self) -> CheckKind {
        match self {
            Self::None => CheckKind::None,
            Self::Crc32(_) => CheckKind::Crc32,
            Self::Crc64(_) => CheckKind::Crc64,
            Self::Sha256(_) => CheckKind::Sha256,
        }
    }

    /// Compare against the stored check bytes.
    pub fn verify(self, expected: &[u8]) -> Result<()> {
        let kind = self.kind();
        let actual = self.finalize();
        if actual != expected {
            return Err(OxzError::checksum_failed(
                kind.name(),
                expected.to_vec(),
                actual,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_byte_roundtrip() {
        for kind in [
            CheckKind::None,
            CheckKind::Crc32,
            CheckKind::Crc64,
            CheckKind::Sha256,
        ] {
            assert_eq!(CheckKind::from_byte(kind.to_byte()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_check_rejected() {
        for byte in [0x02u8, 0x03, 0x05, 0x0B, 0x0F] {
            assert!(matches!(
                CheckKind::from_byte(byte),
                Err(OxzError::UnsupportedCheck { kind }) if kind == byte
            ));
        }
    }

    #[test]
    fn test_crc32_stored_form() {
        let mut summer = Checksummer::new(CheckKind::Crc32);
        summer.update(b"123456789");
        // 0xCBF43926 little-endian.
        assert_eq!(summer.finalize(), vec![0x26, 0x39, 0xF4, 0xCB]);
    }

    #[test]
    fn test_crc64_stored_form() {
        let mut summer = Checksummer::new(CheckKind::Crc64);
        summer.update(b"123456789");
        // 0x995DC9BBDF1939FA little-endian.
        assert_eq!(
            summer.finalize(),
            vec![250, 57, 25, 223, 187, 201, 93, 153]
        );
    }

    #[test]
    fn test_sha256_stored_form() {
        let mut summer = Checksummer::new(CheckKind::Sha256);
        summer.update(b"123456789");
        let expected = [
            21, 226, 176, 211, 195, 56, 145, 235, 176, 241, 239, 96, 158, 196, 25, 66, 12, 32,
            227, 32, 206, 148, 198, 95, 188, 140, 51, 18, 68, 142, 178, 37,
        ];
        assert_eq!(summer.finalize(), expected.to_vec());
    }

    #[test]
    fn test_verify_reports_kind() {
        let mut summer = Checksummer::new(CheckKind::Crc64);
        summer.update(b"payload");
        let err = summer.verify(&[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            OxzError::ChecksumFailed { kind: "CRC64", .. }
        ));
    }

    #[test]
    fn test_none_always_verifies() {
        let summer = Checksummer::new(CheckKind::None);
        summer.verify(&[]).unwrap();
    }
}
