//! Frames exchanged with the transport and the payloads exposed to applications.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::traits::BinaryType;
use crate::Result;

/// A single data frame as carried by the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// Number of bytes this frame puts on the wire (excluding framing overhead).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An inbound message as delivered to `message` listeners.
///
/// Text frames are parsed as JSON when possible. Anything that is not valid JSON is handed
/// over unchanged as [`Payload::Text`], so `abc{` arrives as the string `abc{`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A text frame holding a JSON document
    Json(Value),
    /// A text frame that is not valid JSON
    Text(String),
    /// A binary frame
    Binary(Bytes),
}

impl Payload {
    /// Parse a text frame, falling back to the raw text.
    #[must_use]
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    pub(crate) fn from_frame(frame: Frame, binary_type: BinaryType) -> Self {
        match frame {
            Frame::Text(text) => Self::parse(text),
            Frame::Binary(bytes) => match binary_type {
                BinaryType::Utf8 => match std::str::from_utf8(&bytes) {
                    Ok(text) => Self::parse(text.to_owned()),
                    Err(_) => Self::Binary(bytes),
                },
                BinaryType::Bytes => Self::Binary(bytes),
            },
        }
    }

    /// The string content of this payload.
    ///
    /// Returns the raw text of a non-JSON frame, or the value of a JSON document that is a
    /// bare string (`"pong"` with quotes). Every other payload has no string form.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Json(Value::String(text)) => Some(text.as_str()),
            Self::Json(_) | Self::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Data handed to [`ResilientSocket::send`](super::ResilientSocket::send).
///
/// Text and binary data are sent verbatim. JSON values are serialized to a text frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Binary(Bytes),
    Json(Value),
}

impl Outgoing {
    /// Serialize any value to a JSON message.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub(crate) fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::Text(text),
            Self::Binary(bytes) => Frame::Binary(bytes),
            Self::Json(value) => Frame::Text(value.to_string()),
        }
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for Outgoing {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Vec<u8>> for Outgoing {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes.into())
    }
}

impl From<&[u8]> for Outgoing {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(bytes))
    }
}

impl<const N: usize> From<[u8; N]> for Outgoing {
    fn from(bytes: [u8; N]) -> Self {
        Self::Binary(Bytes::copy_from_slice(&bytes))
    }
}

impl From<Value> for Outgoing {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}
