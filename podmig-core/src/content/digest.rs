// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Content digests and descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::IntegrityError;

const SHA256_PREFIX: &str = "sha256:";
const SHA256_HEX_LEN: usize = 64;

/// `sha256:<hex>` address of an immutable blob.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Digest of exactly `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(format!("{}{}", SHA256_PREFIX, hex::encode(Sha256::digest(data))))
    }

    /// Parse a digest string, accepting only lowercase sha256.
    pub fn parse(value: impl Into<String>) -> Result<Self, IntegrityError> {
        let value = value.into();

        let Some(encoded) = value.strip_prefix(SHA256_PREFIX) else {
            return Err(IntegrityError::MalformedDigest {
                value,
                reason: "unsupported algorithm, expected sha256".to_string(),
            });
        };

        if encoded.len() != SHA256_HEX_LEN {
            return Err(IntegrityError::MalformedDigest {
                reason: format!(
                    "expected {} hex characters, got {}",
                    SHA256_HEX_LEN,
                    encoded.len()
                ),
                value,
            });
        }

        if !encoded
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(IntegrityError::MalformedDigest {
                value,
                reason: "expected lowercase hex".to_string(),
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex-encoded hash without the algorithm prefix.
    pub fn encoded(&self) -> &str {
        &self.0[SHA256_PREFIX.len()..]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = IntegrityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

/// Address of one blob: `{mediaType, digest, size}`.
///
/// Fields beyond the three addressing ones (annotations, platform, ...) are
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Descriptor {
    /// Descriptor addressing exactly `data`.
    pub fn for_bytes(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: Digest::of(data),
            size: data.len() as u64,
            extra: serde_json::Map::new(),
        }
    }

    /// Check that `data` is exactly the content this descriptor addresses.
    pub fn verify(&self, data: &[u8]) -> Result<(), IntegrityError> {
        let actual_size = data.len() as u64;
        if actual_size != self.size {
            return Err(IntegrityError::SizeMismatch {
                digest: self.digest.to_string(),
                expected: self.size,
                actual: actual_size,
            });
        }

        let actual = Digest::of(data);
        if actual != self.digest {
            return Err(IntegrityError::DigestMismatch {
                expected: self.digest.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(())
    }
}
