// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Content-addressing helpers shared by the file-resolver cache and the allocation store.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub const FINGERPRINT_SIZE: usize = 32;

/// A SHA-256 digest of some byte content, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(#[serde(with = "fingerprint_hex")] pub [u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut fingerprint = [0_u8; FINGERPRINT_SIZE];
        fingerprint.copy_from_slice(&digest);
        Fingerprint(fingerprint)
    }

    pub fn from_hex_string(hex_string: &str) -> Result<Fingerprint, String> {
        let bytes =
            hex::decode(hex_string).map_err(|e| format!("invalid hex fingerprint: {e}"))?;
        if bytes.len() != FINGERPRINT_SIZE {
            return Err(format!(
                "fingerprint must be {FINGERPRINT_SIZE} bytes, got {}",
                bytes.len()
            ));
        }
        let mut fingerprint = [0_u8; FINGERPRINT_SIZE];
        fingerprint.copy_from_slice(&bytes);
        Ok(Fingerprint(fingerprint))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// The digest of a piece of content: its fingerprint plus its length, mirroring the teacher's
/// `Digest` shape used to key the content-addressable store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Digest {
    pub hash: Fingerprint,
    pub size_bytes: usize,
}

impl Digest {
    pub fn of_bytes(bytes: &[u8]) -> Digest {
        Digest {
            hash: Fingerprint::from_bytes(bytes),
            size_bytes: bytes.len(),
        }
    }
}

mod fingerprint_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let hex_string = String::deserialize(d)?;
        let bytes = hex::decode(&hex_string).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("wrong fingerprint length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_roundtrips_through_hex() {
        let digest = Digest::of_bytes(b"hello world");
        let hex = digest.hash.to_hex();
        let parsed = Fingerprint::from_hex_string(&hex).unwrap();
        assert_eq!(digest.hash, parsed);
    }

    #[test]
    fn same_content_same_fingerprint() {
        assert_eq!(
            Fingerprint::from_bytes(b"abc"),
            Fingerprint::from_bytes(b"abc")
        );
        assert_ne!(
            Fingerprint::from_bytes(b"abc"),
            Fingerprint::from_bytes(b"abd")
        );
    }
}
