//! Logical-to-physical key translation.
//!
//! A [`KeyCodec`] turns the caller-visible name of a record into the exact
//! key string sent to the backend: an optional one-way 32-bit hash for
//! opacity, then a namespace prefix. The same codec configuration must be
//! shared by every writer and reader of a keyspace or lookups silently miss.

/// Deterministic logical-key to physical-key translation.
///
/// Encoding is pure and never touches the network. Hashing is one-way, so
/// [`decode`](Self::decode) only strips the prefix; hashed names come back
/// as hex digests.
///
/// # Example
///
/// ```
/// use gatehouse_storage::KeyCodec;
///
/// let codec = KeyCodec::new("gatehouse-", false);
/// assert_eq!(codec.encode("session:42"), "gatehouse-session:42");
/// assert_eq!(codec.decode("gatehouse-session:42"), "session:42");
/// ```
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
    hash_keys: bool,
}

impl KeyCodec {
    /// Creates a codec with the given namespace prefix and hashing policy.
    #[must_use]
    pub fn new(prefix: impl Into<String>, hash_keys: bool) -> Self {
        Self { prefix: prefix.into(), hash_keys }
    }

    /// Returns the namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether key hashing is enabled.
    #[must_use]
    pub fn hashes_keys(&self) -> bool {
        self.hash_keys
    }

    /// Applies the hash step alone: a CRC-32 digest rendered as 8 lowercase
    /// hex digits, or the input unchanged when hashing is disabled.
    ///
    /// Exposed separately because glob patterns are built from
    /// `prefix + hash(filter) + "*"`, not from a full encode.
    #[must_use]
    pub fn hash(&self, logical: &str) -> String {
        if !self.hash_keys {
            return logical.to_owned();
        }
        format!("{:08x}", crc32fast::hash(logical.as_bytes()))
    }

    /// Encodes a logical key to the physical form sent to the backend.
    #[must_use]
    pub fn encode(&self, logical: &str) -> String {
        format!("{}{}", self.prefix, self.hash(logical))
    }

    /// Strips the namespace prefix from a physical key for display.
    ///
    /// The hash is not invertible; with hashing enabled the result is the
    /// hex digest, which is what listings return to callers.
    #[must_use]
    pub fn decode(&self, physical: &str) -> String {
        physical.replacen(&self.prefix, "", 1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_without_hashing_is_prefix_plus_key() {
        let codec = KeyCodec::new("apikey-", false);
        assert_eq!(codec.encode("abc123"), "apikey-abc123");
    }

    #[test]
    fn hash_digest_is_fixed_width_lowercase_hex() {
        let codec = KeyCodec::new("", true);
        let digest = codec.hash("session:user@example.com");
        assert_eq!(digest.len(), 8);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn decode_strips_only_the_first_prefix_occurrence() {
        let codec = KeyCodec::new("ns-", false);
        assert_eq!(codec.decode("ns-ns-key"), "ns-key");
    }

    proptest! {
        /// Encoding any logical key twice must yield identical physical keys,
        /// with hashing on or off.
        #[test]
        fn encode_is_deterministic(key in ".{0,64}", hashed in any::<bool>()) {
            let codec = KeyCodec::new("gh-", hashed);
            prop_assert_eq!(codec.encode(&key), codec.encode(&key));
        }

        /// With hashing disabled, decode inverts encode for any key that does
        /// not itself start with the prefix.
        #[test]
        fn decode_inverts_encode_when_not_hashing(key in "[a-z0-9:._@-]{0,64}") {
            let codec = KeyCodec::new("gh-", false);
            prop_assume!(!key.starts_with("gh-"));
            prop_assert_eq!(codec.decode(&codec.encode(&key)), key);
        }

        /// Hashed output shape holds for arbitrary input.
        #[test]
        fn hashed_encode_is_prefix_plus_8_hex(key in ".{0,64}") {
            let codec = KeyCodec::new("gh-", true);
            let physical = codec.encode(&key);
            let digest = physical.strip_prefix("gh-").expect("prefix must be present");
            prop_assert_eq!(digest.len(), 8);
            prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
