//! Record payload codec.
//!
//! Payloads are a one-byte envelope version followed by a JSON document. The
//! target type is supplied by the caller on decode, so the payload carries no
//! type tag of its own.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::record::Projection;
use crate::error::{Result, StoreError};

/// Current envelope version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Packs records into byte payloads and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer;

impl Serializer {
    pub fn new() -> Self {
        Self
    }

    /// Encode a record.
    pub fn serialize<R: Serialize>(&self, record: &R) -> Result<Vec<u8>> {
        let mut out = vec![ENVELOPE_VERSION];
        serde_json::to_writer(&mut out, record)
            .map_err(|e| StoreError::Serialization(format!("encoding record: {}", e)))?;
        Ok(out)
    }

    /// Decode a record, optionally keeping only the projected top-level fields.
    ///
    /// Fields dropped by the projection decode as if absent, so the target
    /// type needs serde defaults for them.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` for an empty payload, an unknown
    /// envelope version, malformed JSON, or a document that does not match
    /// `R`.
    pub fn deserialize<R: DeserializeOwned>(
        &self,
        bytes: &[u8],
        projection: Option<&Projection>,
    ) -> Result<R> {
        let (version, body) = bytes
            .split_first()
            .ok_or_else(|| StoreError::Serialization("empty payload".to_string()))?;
        if *version != ENVELOPE_VERSION {
            return Err(StoreError::Serialization(format!(
                "unknown envelope version {} (expected {})",
                version, ENVELOPE_VERSION
            )));
        }

        let mut document: Value = serde_json::from_slice(body)
            .map_err(|e| StoreError::Serialization(format!("malformed payload: {}", e)))?;

        if let Some(projection) = projection {
            match &mut document {
                Value::Object(fields) => fields.retain(|name, _| projection.contains(name)),
                _ => {
                    return Err(StoreError::Serialization(
                        "projection requires a record with named fields".to_string(),
                    ))
                }
            }
        }

        serde_json::from_value(document)
            .map_err(|e| StoreError::Serialization(format!("decoding record: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Document {
        title: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        pages: u32,
    }

    fn sample() -> Document {
        Document {
            title: "Q3 report".to_string(),
            tags: vec!["finance".to_string()],
            pages: 12,
        }
    }

    #[test]
    fn test_roundtrip() {
        let s = Serializer::new();
        let bytes = s.serialize(&sample()).unwrap();
        assert_eq!(bytes[0], ENVELOPE_VERSION);
        let back: Document = s.deserialize(&bytes, None).unwrap();
        assert_eq!(back, sample());

        let unit_bytes = s.serialize(&()).unwrap();
        s.deserialize::<()>(&unit_bytes, None).unwrap();
    }

    #[test]
    fn test_projection_keeps_selected_fields() {
        let s = Serializer::new();
        let bytes = s.serialize(&sample()).unwrap();
        let projection = Projection::new(["title"]);
        let back: Document = s.deserialize(&bytes, Some(&projection)).unwrap();
        assert_eq!(back.title, "Q3 report");
        assert!(back.tags.is_empty());
        assert_eq!(back.pages, 0);
    }

    #[test]
    fn test_malformed_payloads_fail() {
        let s = Serializer::new();
        assert!(matches!(
            s.deserialize::<Document>(&[], None),
            Err(StoreError::Serialization(_))
        ));
        assert!(s.deserialize::<Document>(&[9, b'{', b'}'], None).is_err());
        assert!(s.deserialize::<Document>(&[ENVELOPE_VERSION, b'{'], None).is_err());

        let wrong_shape = s.serialize(&vec![1, 2, 3]).unwrap();
        assert!(s.deserialize::<Document>(&wrong_shape, None).is_err());
        assert!(s
            .deserialize::<Vec<i32>>(&wrong_shape, Some(&Projection::new(["x"])))
            .is_err());
    }
}
