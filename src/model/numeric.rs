//! Conversions between 128-bit buckets and their byte or text encodings.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NumericError {
    #[error("byte array too long: must be 16 bytes or shorter, got {0}")]
    TooLong(usize),

    #[error("decimal bucket {0:?} does not fit in 128 bits")]
    Overflow(String),

    #[error("character {0:?} is not Latin-1")]
    NotLatin1(char),
}

/// Reads an unsigned big-endian integer of at most 16 bytes.
pub fn u128_from_be_bytes(bytes: &[u8]) -> Result<u128, NumericError> {
    if bytes.len() > 16 {
        return Err(NumericError::TooLong(bytes.len()));
    }
    let mut padded = [0u8; 16];
    padded[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(u128::from_be_bytes(padded))
}

/// Minimal big-endian encoding, no leading zero bytes. Zero encodes to `[0]`.
pub fn to_unsigned_be_bytes(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(15);
    bytes[first..].to_vec()
}

/// Maps a string to a bucket by reading its Latin-1 bytes as a big-endian
/// unsigned integer. Keys longer than 16 bytes or with characters above
/// U+00FF have no bucket.
pub fn bucket_from_string(key: &str) -> Result<u128, NumericError> {
    let bytes = key
        .chars()
        .map(|c| u8::try_from(c).map_err(|_| NumericError::NotLatin1(c)))
        .collect::<Result<Vec<u8>, _>>()?;
    u128_from_be_bytes(&bytes)
}

/// Parses one raw output-domain text line. Decimal digits are taken
/// literally, any other line goes through the Latin-1 byte conversion of
/// [`bucket_from_string`].
pub fn bucket_from_text_key(key: &[u8]) -> Result<u128, NumericError> {
    if !key.is_empty() && key.iter().all(u8::is_ascii_digit) {
        return key
            .iter()
            .try_fold(0u128, |acc, digit| {
                acc.checked_mul(10)?.checked_add(u128::from(digit - b'0'))
            })
            .ok_or_else(|| {
                let digits = String::from_utf8_lossy(key).into_owned();
                NumericError::Overflow(digits)
            });
    }
    u128_from_be_bytes(key)
}
