//! Output domain shard encodings.
//!
//! Binary shards are Avro object container files holding one record per
//! bucket, with the bucket as a big-endian unsigned `bytes` field (see
//! [`OUTPUT_DOMAIN_SCHEMA`]).
//!
//! Text shards hold one key per line, split on `\n`, `\r\n` or `\r`. Lines
//! of decimal digits are read as the bucket itself. Any other line,
//! including an empty one, is read byte for byte as a big-endian unsigned
//! integer of at most 16 bytes. Bytes are never decoded as UTF-8, so every
//! Latin-1 line is a candidate key.

use std::io::{self, Read, Write};

use apache_avro::{types::Value, Reader, Schema, Writer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::numeric::{
    bucket_from_text_key, to_unsigned_be_bytes, u128_from_be_bytes,
    NumericError,
};

pub const BUCKET_FIELD: &str = "bucket";

pub const OUTPUT_DOMAIN_SCHEMA: &str = r#"{
  "type": "record",
  "name": "AggregationBucket",
  "fields": [
    {
      "name": "bucket",
      "type": "bytes",
      "doc": "128-bit unsigned integer as a big-endian byte string."
    }
  ]
}"#;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DomainFileFormat {
    #[default]
    #[serde(alias = "avro")]
    Binary,
    Text,
}

#[derive(Debug, Error)]
pub enum DomainFormatError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid avro output domain: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("record {record}: {reason}")]
    BadRecord { record: usize, reason: &'static str },

    #[error("record {record}: {source}")]
    InvalidBucket {
        record: usize,
        #[source]
        source: NumericError,
    },

    #[error("line {line}: {source}")]
    InvalidKey {
        line: usize,
        #[source]
        source: NumericError,
    },
}

/// Writes `buckets` as an Avro output domain shard.
pub fn write_binary_shard(
    writer: impl Write,
    buckets: &[u128],
) -> Result<(), DomainFormatError> {
    let schema = Schema::parse_str(OUTPUT_DOMAIN_SCHEMA)?;
    let mut avro = Writer::new(&schema, writer);
    for bucket in buckets {
        avro.append(Value::Record(vec![(
            BUCKET_FIELD.to_string(),
            Value::Bytes(to_unsigned_be_bytes(*bucket)),
        )]))?;
    }
    avro.into_inner()?.flush()?;
    Ok(())
}

fn bucket_of(record: usize, value: Value) -> Result<u128, DomainFormatError> {
    let Value::Record(fields) = value else {
        return Err(DomainFormatError::BadRecord {
            record,
            reason: "not a record",
        });
    };
    let bytes = fields
        .into_iter()
        .find_map(|(name, value)| match (name.as_str(), value) {
            (BUCKET_FIELD, Value::Bytes(bytes)) => Some(bytes),
            _ => None,
        })
        .ok_or(DomainFormatError::BadRecord {
            record,
            reason: "no bytes field named bucket",
        })?;
    u128_from_be_bytes(&bytes)
        .map_err(|source| DomainFormatError::InvalidBucket { record, source })
}

/// Reads every bucket of an Avro shard, duplicates included.
pub fn read_binary_shard(
    reader: impl Read,
) -> Result<Vec<u128>, DomainFormatError> {
    Reader::new(io::BufReader::new(reader))?
        .enumerate()
        .map(|(record, value)| bucket_of(record, value?))
        .collect()
}

/// Splits on `\n`, `\r\n` and `\r`. A final terminator does not start an
/// extra empty line.
fn text_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&bytes[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&bytes[start..i]);
                i += 1;
                if bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(&bytes[start..]);
    }
    lines
}

/// Reads every bucket of a text shard, duplicates included.
pub fn read_text_shard(
    mut reader: impl Read,
) -> Result<Vec<u128>, DomainFormatError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    text_lines(&bytes)
        .into_iter()
        .enumerate()
        .map(|(index, key)| {
            bucket_from_text_key(key).map_err(|source| {
                DomainFormatError::InvalidKey {
                    line: index + 1,
                    source,
                }
            })
        })
        .collect()
}

/// Decodes a shard in `format`.
pub fn read_shard(
    format: DomainFileFormat,
    reader: impl Read,
) -> Result<Vec<u128>, DomainFormatError> {
    match format {
        DomainFileFormat::Binary => read_binary_shard(reader),
        DomainFileFormat::Text => read_text_shard(reader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(buckets: &[u128]) -> Vec<u8> {
        let mut out = Vec::new();
        write_binary_shard(&mut out, buckets).unwrap();
        out
    }

    #[test]
    fn test_binary_shard() -> Result<(), anyhow::Error> {
        let buckets = [11, 0, 256, u128::MAX, 11];
        assert_eq!(read_binary_shard(&binary(&buckets)[..])?, buckets);
        Ok(())
    }

    #[test]
    fn test_binary_shard_is_avro_container() -> Result<(), anyhow::Error> {
        let bytes = binary(&[0x0102]);
        assert_eq!(&bytes[..4], b"Obj\x01");

        let records: Vec<Value> =
            Reader::new(&bytes[..])?.collect::<Result<_, _>>()?;
        assert_eq!(
            records,
            vec![Value::Record(vec![(
                "bucket".to_string(),
                Value::Bytes(vec![0x01, 0x02])
            )])]
        );
        Ok(())
    }

    #[test]
    fn test_foreign_schema_is_rejected() -> Result<(), anyhow::Error> {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "Other",
                "fields": [{"name": "key", "type": "long"}]}"#,
        )?;
        let mut writer = Writer::new(&schema, Vec::new());
        writer.append(Value::Record(vec![(
            "key".to_string(),
            Value::Long(7),
        )]))?;
        let bytes = writer.into_inner()?;

        assert!(matches!(
            read_binary_shard(&bytes[..]),
            Err(DomainFormatError::BadRecord { record: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_malformed_binary_shards() -> Result<(), anyhow::Error> {
        assert!(matches!(
            read_binary_shard(&b"11\n22\n"[..]),
            Err(DomainFormatError::Avro(_))
        ));

        let schema = Schema::parse_str(OUTPUT_DOMAIN_SCHEMA)?;
        let mut writer = Writer::new(&schema, Vec::new());
        writer.append(Value::Record(vec![(
            BUCKET_FIELD.to_string(),
            Value::Bytes(vec![1; 17]),
        )]))?;
        let too_long = writer.into_inner()?;
        assert!(matches!(
            read_binary_shard(&too_long[..]),
            Err(DomainFormatError::InvalidBucket {
                record: 0,
                source: NumericError::TooLong(17)
            })
        ));
        Ok(())
    }

    #[test]
    fn test_text_lines() {
        assert!(text_lines(b"").is_empty());
        assert_eq!(text_lines(b"a\n"), vec![&b"a"[..]]);
        assert_eq!(
            text_lines(b"a\r\n\rb\nc"),
            vec![&b"a"[..], &b""[..], &b"b"[..], &b"c"[..]]
        );
    }

    #[test]
    fn test_text_shard() -> Result<(), anyhow::Error> {
        let text = b"11\n\n22\r\nfoo\n\xff\xfe\n";
        assert_eq!(
            read_text_shard(&text[..])?,
            vec![11, 0, 22, 0x666f6f, 0xfffe]
        );

        let overflow = "1\n999999999999999999999999999999999999999999\n";
        assert!(matches!(
            read_text_shard(overflow.as_bytes()),
            Err(DomainFormatError::InvalidKey { line: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_text_key_longer_than_16_bytes() {
        let text = "abcd".repeat(8);
        assert!(matches!(
            read_text_shard(text.as_bytes()),
            Err(DomainFormatError::InvalidKey {
                line: 1,
                source: NumericError::TooLong(32)
            })
        ));
        // Whitespace is part of the key.
        assert!(matches!(
            read_text_shard(&b" 11 \n"[..]),
            Ok(buckets) if buckets == vec![0x2031_3120]
        ));
    }
}
