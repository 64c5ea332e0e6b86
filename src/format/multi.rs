use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{
    DecodedPayload, EncodedContent, Format, FormatCapabilities, FormatCapability, FormatOptions,
    Outcome,
};
use crate::{
    event::{EncodedData, EventEnvelope},
    media_type::MediaType,
};

/// Decides whether a handled result is a real answer or dispatch should keep
/// going.
type Acceptance<T> = fn(&T) -> bool;

fn envelope_accepted(envelope: &EventEnvelope) -> bool {
    !matches!(envelope, EventEnvelope::Opaque(_))
}

fn encoded_accepted(encoded: &EncodedContent) -> bool {
    encoded.content_type.is_some()
}

fn payload_accepted(_: &DecodedPayload) -> bool {
    true
}

#[derive(Clone)]
struct Registered {
    format: Arc<dyn Format>,
    capabilities: FormatCapabilities,
}

/// An ordered chain of codecs. The most recently registered codec is tried
/// first, so later registrations override earlier defaults.
#[derive(Clone, Default)]
pub struct MultiFormat {
    formats: Vec<Registered>,
}

impl MultiFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, format: Arc<dyn Format>) {
        let capabilities = format.capabilities();
        self.register_with(format, capabilities);
    }

    /// Registers `format` for the subset of `capabilities` it actually
    /// implements.
    pub fn register_with(&mut self, format: Arc<dyn Format>, capabilities: FormatCapabilities) {
        let capabilities = format.capabilities().intersect(&capabilities);
        if capabilities.is_empty() {
            debug!(format = format.name(), "nothing to register");
            return;
        }
        self.formats.insert(
            0,
            Registered {
                format,
                capabilities,
            },
        );
    }

    /// Removes every codec registered under `name`. Returns whether any was
    /// removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.formats.len();
        self.formats.retain(|r| r.format.name() != name);
        before != self.formats.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.formats.iter().map(|r| r.format.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    fn dispatch<T, F>(&self, capability: FormatCapability, accept: Acceptance<T>, mut op: F) -> Outcome<T>
    where
        F: FnMut(&dyn Format) -> Outcome<T>,
    {
        for registered in self
            .formats
            .iter()
            .filter(|r| r.capabilities.supports(capability))
        {
            let name = registered.format.name();
            match op(registered.format.as_ref()) {
                Outcome::Handled(value) if accept(&value) => {
                    debug!(format = name, %capability, "handled");
                    return Outcome::Handled(value);
                }
                Outcome::Handled(_) => {
                    debug!(format = name, %capability, "result not accepted");
                }
                Outcome::Failed(e) => {
                    debug!(format = name, %capability, error = %e, "failed");
                    return Outcome::Failed(e);
                }
                Outcome::NotApplicable => {
                    debug!(format = name, %capability, "declined");
                }
            }
        }
        Outcome::NotApplicable
    }
}

impl std::fmt::Debug for MultiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiFormat")
            .field("formats", &self.names())
            .finish()
    }
}

impl Format for MultiFormat {
    fn name(&self) -> &str {
        "multi"
    }

    fn capabilities(&self) -> FormatCapabilities {
        let mut capabilities = FormatCapabilities::default();
        for capability in FormatCapability::ALL {
            if self.formats.iter().any(|r| r.capabilities.supports(capability)) {
                capabilities.push(capability);
            }
        }
        capabilities
    }

    fn decode_envelope(
        &self,
        content: &EncodedData,
        content_type: &MediaType,
        data_decoder: &MultiFormat,
        options: &FormatOptions,
    ) -> Outcome<EventEnvelope> {
        self.dispatch(FormatCapability::DecodeEnvelope, envelope_accepted, |f| {
            f.decode_envelope(content, content_type, data_decoder, options)
        })
    }

    fn encode_envelope(
        &self,
        envelope: &EventEnvelope,
        data_encoder: &MultiFormat,
        options: &FormatOptions,
    ) -> Outcome<EncodedContent> {
        self.dispatch(FormatCapability::EncodeEnvelope, encoded_accepted, |f| {
            f.encode_envelope(envelope, data_encoder, options)
        })
    }

    fn decode_payload(
        &self,
        spec_version: &str,
        content: &EncodedData,
        content_type: Option<&MediaType>,
        options: &FormatOptions,
    ) -> Outcome<DecodedPayload> {
        self.dispatch(FormatCapability::DecodePayload, payload_accepted, |f| {
            f.decode_payload(spec_version, content, content_type, options)
        })
    }

    fn encode_payload(
        &self,
        spec_version: &str,
        data: &Value,
        content_type: Option<&MediaType>,
        options: &FormatOptions,
    ) -> Outcome<EncodedContent> {
        self.dispatch(FormatCapability::EncodePayload, encoded_accepted, |f| {
            f.encode_payload(spec_version, data, content_type, options)
        })
    }
}
