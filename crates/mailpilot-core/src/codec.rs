//! Content-Transfer-Encoding decoding for fetched body parts.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};
use crate::model::TransferEncoding;

/// Decodes part bytes as stored on the server into their payload.
///
/// Identity encodings and unknown encodings pass through untouched.
///
/// # Errors
///
/// Returns an error if base64 or quoted-printable data is corrupt.
pub fn decode_transfer(raw: &[u8], encoding: &TransferEncoding) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::Base64 => decode_base64(raw),
        TransferEncoding::QuotedPrintable => decode_quoted_printable(raw),
        TransferEncoding::SevenBit
        | TransferEncoding::EightBit
        | TransferEncoding::Binary
        | TransferEncoding::Other(_) => Ok(raw.to_vec()),
    }
}

fn decode_base64(raw: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| Error::MalformedResponse(format!("invalid base64 part: {e}")))
}

fn decode_quoted_printable(raw: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().copied().peekable();

    while let Some(byte) = bytes.next() {
        if byte != b'=' {
            result.push(byte);
            continue;
        }

        // Soft line break
        match bytes.peek() {
            Some(b'\r') => {
                bytes.next();
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                }
                continue;
            }
            Some(b'\n') => {
                bytes.next();
                continue;
            }
            _ => {}
        }

        let (Some(high), Some(low)) = (bytes.next(), bytes.next()) else {
            return Err(Error::MalformedResponse(
                "incomplete quoted-printable escape".to_string(),
            ));
        };
        let hex = [high, low];
        let value = std::str::from_utf8(&hex)
            .ok()
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .ok_or_else(|| {
                Error::MalformedResponse(format!(
                    "invalid quoted-printable escape ={}{}",
                    char::from(high),
                    char::from(low)
                ))
            })?;
        result.push(value);
    }

    Ok(result)
}
