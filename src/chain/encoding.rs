//! Base64 helpers for the wire format.
//!
//! Every binary field on the wire is standard-alphabet base64. Invite links
//! travel in URLs, so decoding also accepts the URL-safe alphabet (`-_`) and
//! missing padding.

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE},
        DecodePaddingMode,
    },
    Engine as _,
};

const INDIFFERENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Standard alphabet, padding optional on decode.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, INDIFFERENT);

/// URL-safe alphabet, padding optional on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, INDIFFERENT);

/// Encode bytes as standard, padded base64.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Encode bytes as URL-safe, padded base64.
pub fn to_base64_url(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

/// Decode standard or URL-safe base64, with or without padding.
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let s = s.trim();
    if s.contains(['-', '_']) {
        URL_SAFE_LENIENT.decode(s)
    } else {
        STANDARD_LENIENT.decode(s)
    }
}

/// Serde adapter for `Vec<u8>` fields carried as base64 strings.
pub mod base64_bytes {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::from_base64(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_safe_and_standard_decode_agree() {
        let bytes = [0xFBu8, 0xFF, 0xBF, 0x3E, 0x00];
        let standard = to_base64(&bytes);
        let url = to_base64_url(&bytes);
        assert!(standard.contains('+') || standard.contains('/'));
        assert!(!url.contains('+') && !url.contains('/'));

        assert_eq!(from_base64(&standard).unwrap(), bytes);
        assert_eq!(from_base64(&url).unwrap(), bytes);
    }

    #[test]
    fn test_missing_padding_accepted() {
        let encoded = to_base64(b"ab");
        assert!(encoded.ends_with('='));
        let trimmed = encoded.trim_end_matches('=');
        assert_eq!(from_base64(trimmed).unwrap(), b"ab");
    }

    #[test]
    fn test_unpadded_url_safe_accepted() {
        let bytes = [0xFBu8, 0xFF, 0xBF, 0x3E];
        let url = to_base64_url(&bytes);
        assert!(url.ends_with('='));
        assert_eq!(from_base64(url.trim_end_matches('=')).unwrap(), bytes);
    }

    #[test]
    fn test_mixed_alphabets_rejected() {
        assert!(from_base64("+-//").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(from_base64("!!not base64!!").is_err());
    }
}
