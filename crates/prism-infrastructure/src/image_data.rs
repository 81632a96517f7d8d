//! Image payload decoding.
//!
//! The remote API hands images back either as `data:` URLs or as bare
//! base64. Both decode to raw PNG bytes here.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use prism_core::error::{PrismError, Result};

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Decodes a `data:<mime>;base64,<payload>` URL or a raw base64 string.
pub fn decode_image_payload(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| PrismError::validation("Malformed data URL: missing ','"))?;
            if !header.ends_with(";base64") {
                return Err(PrismError::validation(
                    "Unsupported data URL: payload is not base64",
                ));
            }
            payload
        }
        None => trimmed,
    };

    if encoded.is_empty() {
        return Err(PrismError::validation("Empty image payload"));
    }

    STANDARD
        .decode(encoded)
        .or_else(|_| STANDARD_NO_PAD.decode(encoded))
        .map_err(|e| PrismError::Serialization {
            format: "base64".to_string(),
            message: e.to_string(),
        })
}

/// Encodes PNG bytes as a `data:image/png;base64,` URL.
pub fn to_png_data_url(bytes: &[u8]) -> String {
    format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url_and_raw_base64() {
        assert_eq!(
            decode_image_payload("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert_eq!(decode_image_payload("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_image_payload("aGVsbG8").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_image_payload("").is_err());
        assert!(decode_image_payload("data:image/png;base64,").is_err());
        assert!(decode_image_payload("data:image/png,aGVsbG8=").is_err());
        assert!(decode_image_payload("data:image/png;base64").is_err());
        assert!(decode_image_payload("not base64 at all!").is_err());
    }

    #[test]
    fn test_data_url_round_trip() {
        let url = to_png_data_url(&[0x89, b'P', b'N', b'G']);
        assert!(url.starts_with(PNG_DATA_URL_PREFIX));
        assert_eq!(decode_image_payload(&url).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }
}
