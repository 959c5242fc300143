//! The gateway's wire-level `Message`: an immutable property bag plus an
//! opaque content buffer (SPEC_FULL.md ยง3).

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::error::MessageError;

/// Immutable envelope carried between modules by the broker.
///
/// Cloning is cheap: both the property map and the content buffer are held
/// behind `Arc`, so `clone()` never copies the underlying bytes (SPEC_FULL.md
/// ยง3, "clonable; may share underlying buffers").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    properties: Arc<BTreeMap<String, String>>,
    content: Arc<[u8]>,
}

/// On-the-wire representation used only for serialization; `Message` itself
/// keeps its fields behind `Arc` so this shape exists solely at the
/// serde boundary.
#[derive(Serialize)]
struct WireMessage<'a> {
    properties: &'a BTreeMap<String, String>,
    #[serde(with = "serde_bytes_compat")]
    content: &'a [u8],
}

#[derive(Deserialize)]
struct OwnedWireMessage {
    properties: BTreeMap<String, String>,
    #[serde(with = "serde_bytes_compat")]
    content: Vec<u8>,
}

/// `serde_json` has no special-cased byte-array support, so a plain `Vec<u8>`
/// round-trips as a JSON array of numbers. That is wasteful but correct and
/// dependency-free; it is an internal wire detail, never observed by callers.
mod serde_bytes_compat {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &&[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(bytes.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(deserializer)
    }
}

impl Message {
    /// Build a message with no properties.
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            properties: Arc::new(BTreeMap::new()),
            content: Arc::from(content.into()),
        }
    }

    /// Build a message from an explicit property map and content buffer.
    pub fn with_properties(
        properties: BTreeMap<String, String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            properties: Arc::new(properties),
            content: Arc::from(content.into()),
        }
    }

    /// Look up a single property by name.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Iterate over all properties.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Borrow the opaque content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Serialize to a self-contained byte array (SPEC_FULL.md ยง3, "round-trip
    /// byte-array serialization"). The format is opaque to the broker and
    /// carried unchanged over every transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let wire = WireMessage {
            properties: &self.properties,
            content: &self.content,
        };
        // A `BTreeMap`/`&[u8]` pair serializes infallibly under serde_json.
        serde_json::to_vec(&wire).unwrap_or_default()
    }

    /// Deserialize a byte array produced by [`Message::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let owned: OwnedWireMessage =
            serde_json::from_slice(bytes).map_err(|e| MessageError::Decode(e.to_string()))?;
        Ok(Self {
            properties: Arc::new(owned.properties),
            content: Arc::from(owned.content),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_properties_and_content() {
        let mut props = BTreeMap::new();
        props.insert("k".to_string(), "v".to_string());
        let msg = Message::with_properties(props, vec![0x01, 0x02]);

        let bytes = msg.to_bytes();
        let decoded = Message::from_bytes(&bytes).expect("decodes");

        assert_eq!(decoded, msg);
        assert_eq!(decoded.property("k"), Some("v"));
        assert_eq!(decoded.content(), &[0x01, 0x02]);
    }

    #[test]
    fn clone_is_cheap_and_shares_content() {
        let msg = Message::new(vec![1, 2, 3]);
        let clone = msg.clone();
        assert_eq!(Arc::as_ptr(&msg.content), Arc::as_ptr(&clone.content));
    }

    #[test]
    fn empty_message_round_trips() {
        let msg = Message::new(Vec::new());
        let bytes = msg.to_bytes();
        let decoded = Message::from_bytes(&bytes).expect("decodes");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        assert!(Message::from_bytes(b"not json").is_err());
    }
}
