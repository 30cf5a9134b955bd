// Copyright 2020 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SHA-1 content checksums used by the history tree and by tracked-file
//! directory hashing. Collision-resistance for change detection only; see
//! the crate's Non-goals for why SHA-1 is acceptable here.

use sha1::Digest as _;
use sha1::Sha1;
use thiserror::Error;

pub const CHECKSUM_LEN: usize = 20;

/// A SHA-1 digest of some content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(content.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Checksum").field(&self.hex()).finish()
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex())
    }
}

#[derive(Debug, Error)]
#[error("invalid checksum {hex:?}: expected {CHECKSUM_LEN} bytes, got {actual}")]
pub struct InvalidChecksum {
    pub hex: String,
    pub actual: usize,
}

impl std::str::FromStr for Checksum {
    type Err = InvalidChecksum;

    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(hex).map_err(|_| InvalidChecksum {
            hex: hex.to_owned(),
            actual: hex.len() / 2,
        })?;
        let array: [u8; CHECKSUM_LEN] = bytes.as_slice().try_into().map_err(|_| InvalidChecksum {
            hex: hex.to_owned(),
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // sha1("hello")
        let checksum = Checksum::of("hello");
        assert_eq!(checksum.hex(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn roundtrip_through_hex() {
        let checksum = Checksum::of("some dotfile content\n");
        let parsed: Checksum = checksum.hex().parse().unwrap();
        assert_eq!(checksum, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abcd".parse::<Checksum>().is_err());
    }
}
