//! Content keys: stable, filesystem-safe names derived from a digest.
//!
//! A key has the form `<algorithm>$<digest>` where `<digest>` is the raw digest encoded with
//! the URL-safe base64 alphabet (`A-Z a-z 0-9 - _`, `=` padding). Neither part can contain a
//! path separator, so a key is always usable as a single path component.

use crate::constants::{KEY_DELIMITER, SHA256_ALGORITHM};
use crate::FilesError;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use std::{fmt, str::FromStr};

/// Identifier of stored content, a pure function of the content's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    /// Renders a raw digest as a content key.
    ///
    /// # Panics
    ///
    /// Panics if `algorithm` is not a plain token (ASCII alphanumerics and `-`), or if a
    /// `SHA-256` digest is not 32 bytes long. Both indicate a bug in the caller.
    pub fn encode(algorithm: &str, digest: &[u8]) -> Self {
        assert!(
            is_algorithm_token(algorithm),
            "invalid digest algorithm name: {:?}",
            algorithm
        );
        if let Some(expected) = expected_digest_len(algorithm) {
            assert_eq!(
                digest.len(),
                expected,
                "{} digest must be {} bytes",
                algorithm,
                expected
            );
        }

        Self(format!(
            "{}{}{}",
            algorithm,
            KEY_DELIMITER,
            URL_SAFE.encode(digest)
        ))
    }

    /// Renders a finished SHA-256 digest.
    pub fn from_sha256(digest: [u8; 32]) -> Self {
        Self::encode(SHA256_ALGORITHM, &digest)
    }

    /// Validates an externally supplied key string.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidKey`] if the input is not `<algorithm>$<base64url>`, if the
    /// digest does not decode, or if a known algorithm's digest has the wrong length.
    pub fn parse(input: &str) -> Result<Self, FilesError> {
        let invalid = |reason: &str| FilesError::InvalidKey(format!("{:?}: {}", input, reason));

        let (algorithm, encoded) = input
            .split_once(KEY_DELIMITER)
            .ok_or_else(|| invalid("missing '$' delimiter"))?;

        if !is_algorithm_token(algorithm) {
            return Err(invalid("algorithm must be ASCII alphanumerics or '-'"));
        }
        if encoded.is_empty() {
            return Err(invalid("digest is empty"));
        }

        let digest = URL_SAFE
            .decode(encoded)
            .map_err(|e| invalid(&format!("digest is not base64url: {}", e)))?;

        if let Some(expected) = expected_digest_len(algorithm) {
            if digest.len() != expected {
                return Err(invalid(&format!(
                    "{} digest must be {} bytes, got {}",
                    algorithm,
                    expected,
                    digest.len()
                )));
            }
        }

        Ok(Self(input.to_owned()))
    }

    /// Builds a key without any validation. Only for exercising the path checks in tests.
    #[cfg(test)]
    pub(crate) fn from_raw_unchecked(raw: &str) -> Self {
        Self(raw.to_owned())
    }

    /// Returns the algorithm part, e.g. `SHA-256`.
    pub fn algorithm(&self) -> &str {
        self.0
            .split_once(KEY_DELIMITER)
            .map_or(self.0.as_str(), |(algorithm, _)| algorithm)
    }

    /// Returns the encoded digest part.
    pub fn encoded_digest(&self) -> &str {
        self.0
            .split_once(KEY_DELIMITER)
            .map_or("", |(_, digest)| digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_algorithm_token(algorithm: &str) -> bool {
    !algorithm.is_empty()
        && algorithm
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn expected_digest_len(algorithm: &str) -> Option<usize> {
    (algorithm == SHA256_ALGORITHM).then_some(32)
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentKey {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentKey::parse(s)
    }
}

impl AsRef<str> for ContentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for ContentKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ContentKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentKey::parse(&s).map_err(serde::de::Error::custom)
    }
}
