// Message Domain Model

use bytes::Bytes;

/// Opaque message payload
///
/// The engine never looks inside a message. Cloning is a reference-count bump,
/// so fanning one message out to many subscribers does not copy the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message(Bytes);

impl Message {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    /// Encode a JSON value as a compact message payload
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Message {
    fn from(payload: Bytes) -> Self {
        Self(payload)
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Self(Bytes::from(payload))
    }
}

impl From<String> for Message {
    fn from(payload: String) -> Self {
        Self(Bytes::from(payload))
    }
}

impl From<&'static str> for Message {
    fn from(payload: &'static str) -> Self {
        Self(Bytes::from_static(payload.as_bytes()))
    }
}
