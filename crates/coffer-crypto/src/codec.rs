//! Wire codecs and serde adapters.
//!
//! The stash and protocol types carry binary fields as text: base64 for key
//! material and box payloads, hex for IVs and salts, base58 for filenames,
//! base32 for OTP secrets. The serde adapter modules here plug into
//! `#[serde(with = "...")]` attributes on those types.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Standard base64 (with padding), as used for all binary JSON fields.
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64.
pub fn base64_decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

/// Base32 (RFC 4648, no padding), used for OTP secrets.
pub fn base32_encode(data: &[u8]) -> String {
    data_encoding::BASE32_NOPAD.encode(data)
}

/// Decode an unpadded base32 string.
pub fn base32_decode(text: &str) -> Result<Vec<u8>, data_encoding::DecodeError> {
    data_encoding::BASE32_NOPAD.decode(text.as_bytes())
}

/// Base58 (Bitcoin alphabet), used for stash filenames.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decode a base58 string.
pub fn base58_decode(text: &str) -> Result<Vec<u8>, bs58::decode::Error> {
    bs58::decode(text).into_vec()
}

/// Serde adapter for required `Vec<u8>` fields encoded as base64 strings.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a base64 string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize a base64 string into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(&text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional base64 byte fields.
pub mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize optional bytes as a base64 string or `null`.
    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional base64 string.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        match text {
            Some(text) => STANDARD
                .decode(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Serde adapter for `Vec<u8>` fields encoded as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize a hex string into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let data = b"coffer wire data";
        assert_eq!(base64_decode(&base64_encode(data)).unwrap(), data);
    }

    #[test]
    fn test_base58_roundtrip() {
        let data = [7u8; 32];
        let encoded = base58_encode(&data);
        assert!(!encoded.contains('0'), "base58 excludes ambiguous chars");
        assert_eq!(base58_decode(&encoded).unwrap(), data);
    }
}
