//! Plugin state. Besides its parameters, a plugin can store a fixed set of string key/value pairs
//! that the host saves and restores with the project. The keys and their default values are
//! declared once through [`Plugin::init_state()`][crate::plugin::Plugin::init_state()].
//!
//! Formats that store state as an opaque binary chunk use [`encode_chunk()`] and
//! [`decode_chunk()`].

use thiserror::Error;

/// A single piece of state. The key never changes after initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateEntry {
    pub key: String,
    pub value: String,
}

impl StateEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("the state chunk contains a key without a value")]
    MissingValue,
    #[error("the state chunk is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("the state object could not be (de)serialized: {0}")]
    Json(String),
}

/// Encode key/value pairs as `key\0value\0key\0value\0...`. An empty iterator results in a single
/// NUL byte, since some hosts treat zero-length chunks as missing.
pub fn encode_chunk<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<u8> {
    let mut chunk = Vec::new();
    for (key, value) in entries {
        chunk.extend_from_slice(key.as_bytes());
        chunk.push(0);
        chunk.extend_from_slice(value.as_bytes());
        chunk.push(0);
    }

    if chunk.is_empty() {
        chunk.push(0);
    }

    chunk
}

/// Decode a chunk written by [`encode_chunk()`]. A missing final NUL terminator is tolerated. Both
/// an empty slice and a single NUL byte decode to an empty list.
pub fn decode_chunk(chunk: &[u8]) -> Result<Vec<(String, String)>, StateError> {
    let chunk = match chunk {
        [] | [0] => return Ok(Vec::new()),
        [rest @ .., 0] => rest,
        chunk => chunk,
    };

    let mut fields = chunk.split(|&b| b == 0);
    let mut entries = Vec::new();
    while let Some(key) = fields.next() {
        let value = fields.next().ok_or(StateError::MissingValue)?;
        entries.push((
            std::str::from_utf8(key)?.to_owned(),
            std::str::from_utf8(value)?.to_owned(),
        ));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chunk_is_single_nul() {
        assert_eq!(encode_chunk([]), [0]);
        assert_eq!(decode_chunk(&[0]).unwrap(), []);
        assert_eq!(decode_chunk(&[]).unwrap(), []);
    }

    #[test]
    fn chunk_layout() {
        let chunk = encode_chunk([("file", "/tmp/a.wav"), ("mode", "fast")]);
        assert_eq!(chunk, b"file\0/tmp/a.wav\0mode\0fast\0");
    }

    #[test]
    fn chunk_roundtrip_with_empty_fields() {
        let entries = [("a", ""), ("", "b"), ("unicode", "größe")];
        let decoded = decode_chunk(&encode_chunk(entries)).unwrap();
        assert_eq!(
            decoded,
            entries
                .iter()
                .map(|&(k, v)| (k.to_owned(), v.to_owned()))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn missing_terminator_is_tolerated() {
        assert_eq!(
            decode_chunk(b"key\0value").unwrap(),
            [("key".to_owned(), "value".to_owned())]
        );
    }

    #[test]
    fn odd_field_count() {
        assert_eq!(decode_chunk(b"a\0b\0c\0"), Err(StateError::MissingValue));
    }

    #[test]
    fn invalid_utf8() {
        assert!(matches!(
            decode_chunk(b"a\0\xff\xfe\0"),
            Err(StateError::InvalidUtf8(_))
        ));
    }
}
