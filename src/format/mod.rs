//! # Formats
//!
//! A [`Format`] is a codec that may implement any subset of four operations:
//!
//! | operation         | direction                         |
//! |-------------------|-----------------------------------|
//! | `decode_envelope` | structured content -> event(s)    |
//! | `encode_envelope` | event(s) -> structured content    |
//! | `decode_payload`  | binary-mode body -> data value    |
//! | `encode_payload`  | data value -> binary-mode body    |
//!
//! Every operation returns an [`Outcome`]. `NotApplicable` means "not mine,
//! ask the next codec"; `Failed` means the codec recognized the input and it
//! was broken. The two are never conflated: a failure stops dispatch.
//!
//! [`MultiFormat`] chains codecs so bindings and codecs can ask "does anyone
//! understand this content type" without knowing who is registered.

/// Returns early from a codec operation with `Outcome::Failed` on error.
macro_rules! attempt {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => return $crate::format::Outcome::Failed(e.into()),
        }
    };
}

mod json;
mod multi;
mod registry;
mod text;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    event::{EncodedData, EventEnvelope},
    media_type::MediaType,
    CloudEventsError,
};

pub use json::JsonCodec;
pub use multi::MultiFormat;
pub use registry::FormatRegistry;
pub use text::TextCodec;

/// Three-way result of a codec operation.
#[derive(Debug)]
pub enum Outcome<T> {
    NotApplicable,
    Handled(T),
    Failed(CloudEventsError),
}

impl<T> Outcome<T> {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Self::NotApplicable)
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::NotApplicable => Outcome::NotApplicable,
            Self::Handled(value) => Outcome::Handled(f(value)),
            Self::Failed(e) => Outcome::Failed(e),
        }
    }

    /// `Ok(None)` for a decline, `Ok(Some(_))` when handled.
    pub fn into_result(self) -> Result<Option<T>, CloudEventsError> {
        match self {
            Self::NotApplicable => Ok(None),
            Self::Handled(value) => Ok(Some(value)),
            Self::Failed(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, CloudEventsError>> for Outcome<T> {
    fn from(result: Result<T, CloudEventsError>) -> Self {
        match result {
            Ok(value) => Self::Handled(value),
            Err(e) => Self::Failed(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum FormatCapability {
    DecodeEnvelope,
    EncodeEnvelope,
    DecodePayload,
    EncodePayload,
}

impl FormatCapability {
    pub const ALL: [FormatCapability; 4] = [
        Self::DecodeEnvelope,
        Self::EncodeEnvelope,
        Self::DecodePayload,
        Self::EncodePayload,
    ];
}

/// The operations a codec takes part in. Fixed when the codec is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatCapabilities {
    capabilities: HashSet<FormatCapability>,
}

impl FormatCapabilities {
    pub fn all() -> Self {
        Self::from(FormatCapability::ALL.to_vec())
    }

    pub fn push(&mut self, capability: FormatCapability) {
        self.capabilities.insert(capability);
    }

    pub fn supports(&self, capability: FormatCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn supports_any(&self, capabilities: &[FormatCapability]) -> bool {
        capabilities.iter().any(|c| self.capabilities.contains(c))
    }

    /// Capabilities present in both sets.
    pub fn intersect(&self, other: &FormatCapabilities) -> Self {
        Self {
            capabilities: self
                .capabilities
                .intersection(&other.capabilities)
                .copied()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl From<FormatCapability> for FormatCapabilities {
    fn from(capability: FormatCapability) -> Self {
        Self::from(vec![capability])
    }
}

impl From<Vec<FormatCapability>> for FormatCapabilities {
    fn from(capabilities: Vec<FormatCapability>) -> Self {
        Self {
            capabilities: HashSet::from_iter(capabilities),
        }
    }
}

/// Options passed through to every codec operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Recursively sort object keys before serializing.
    #[serde(default)]
    pub sort: bool,
}

impl FormatOptions {
    pub fn sorted() -> Self {
        Self { sort: true }
    }
}

/// Serialized output of an encode operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedContent {
    pub content: EncodedData,
    pub content_type: Option<MediaType>,
}

/// Result of decoding a binary-mode payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub data: Value,
    pub content_type: Option<MediaType>,
}

/// A codec. Every operation defaults to declining, so an implementation only
/// overrides what it supports and reports it in [`Format::capabilities`].
pub trait Format: Send + Sync {
    /// Registration name, used by `unregister`.
    fn name(&self) -> &str;

    fn capabilities(&self) -> FormatCapabilities;

    fn decode_envelope(
        &self,
        _content: &EncodedData,
        _content_type: &MediaType,
        _data_decoder: &MultiFormat,
        _options: &FormatOptions,
    ) -> Outcome<EventEnvelope> {
        Outcome::NotApplicable
    }

    fn encode_envelope(
        &self,
        _envelope: &EventEnvelope,
        _data_encoder: &MultiFormat,
        _options: &FormatOptions,
    ) -> Outcome<EncodedContent> {
        Outcome::NotApplicable
    }

    fn decode_payload(
        &self,
        _spec_version: &str,
        _content: &EncodedData,
        _content_type: Option<&MediaType>,
        _options: &FormatOptions,
    ) -> Outcome<DecodedPayload> {
        Outcome::NotApplicable
    }

    fn encode_payload(
        &self,
        _spec_version: &str,
        _data: &Value,
        _content_type: Option<&MediaType>,
        _options: &FormatOptions,
    ) -> Outcome<EncodedContent> {
        Outcome::NotApplicable
    }
}

/// Recursively sorts object keys. Arrays keep their order.
pub(crate) fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
