use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    EncodedContent, Format, FormatCapabilities, FormatCapability, FormatOptions, JsonCodec,
    MultiFormat, Outcome, TextCodec,
};
use crate::{
    event::{AttributeValue, EncodedData, Event, EventEnvelope, OpaqueEvent, V0_SPEC_VERSION},
    media_type::MediaType,
    CloudEventsError, CloudEventsResult,
};

/// The codec chains a protocol binding dispatches through: one envelope
/// decoder chain, named envelope encoder chains, and payload chains.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    event_decoders: MultiFormat,
    event_encoders: HashMap<String, MultiFormat>,
    data_decoders: MultiFormat,
    data_encoders: MultiFormat,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`JsonCodec`] and [`TextCodec`], both under `name`.
    pub fn with_defaults(name: &str) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec), name);
        registry.register(Arc::new(TextCodec), name);
        registry
    }

    pub fn register(&mut self, format: Arc<dyn Format>, name: &str) {
        self.register_with(format, name, FormatCapabilities::all());
    }

    /// Registers the operations in `capabilities` that `format` implements.
    /// Envelope encoding goes into the chain called `name`.
    pub fn register_with(
        &mut self,
        format: Arc<dyn Format>,
        name: &str,
        capabilities: FormatCapabilities,
    ) {
        let capabilities = format.capabilities().intersect(&capabilities);
        debug!(format = format.name(), name, ?capabilities, "registering format");
        if capabilities.supports(FormatCapability::DecodeEnvelope) {
            self.event_decoders
                .register_with(format.clone(), FormatCapability::DecodeEnvelope.into());
        }
        if capabilities.supports(FormatCapability::EncodeEnvelope) {
            self.event_encoders
                .entry(name.to_string())
                .or_default()
                .register_with(format.clone(), FormatCapability::EncodeEnvelope.into());
        }
        if capabilities.supports(FormatCapability::DecodePayload) {
            self.data_decoders
                .register_with(format.clone(), FormatCapability::DecodePayload.into());
        }
        if capabilities.supports(FormatCapability::EncodePayload) {
            self.data_encoders
                .register_with(format, FormatCapability::EncodePayload.into());
        }
    }

    /// Removes the codec called `name` from every chain.
    pub fn unregister(&mut self, name: &str) -> bool {
        let mut removed = self.event_decoders.unregister(name);
        removed |= self.data_decoders.unregister(name);
        removed |= self.data_encoders.unregister(name);
        for encoders in self.event_encoders.values_mut() {
            removed |= encoders.unregister(name);
        }
        self.event_encoders.retain(|_, encoders| !encoders.is_empty());
        removed
    }

    /// Names of the envelope encoder chains, sorted.
    pub fn encoder_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.event_encoders.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn data_decoders(&self) -> &MultiFormat {
        &self.data_decoders
    }

    pub fn data_encoders(&self) -> &MultiFormat {
        &self.data_encoders
    }

    /// Runs the envelope decoder chain, falling back to an opaque event when
    /// allowed.
    #[instrument(level = "debug", skip(self, content, options), fields(content_type = %content_type.canonical_string()))]
    pub fn decode_envelope(
        &self,
        content: EncodedData,
        content_type: &MediaType,
        allow_opaque: bool,
        options: &FormatOptions,
    ) -> CloudEventsResult<EventEnvelope> {
        match self
            .event_decoders
            .decode_envelope(&content, content_type, &self.data_decoders, options)
        {
            Outcome::Handled(envelope) => Ok(envelope),
            Outcome::Failed(e) => Err(e),
            Outcome::NotApplicable if allow_opaque => {
                debug!("keeping opaque event");
                Ok(EventEnvelope::Opaque(OpaqueEvent::new(
                    content,
                    Some(content_type.clone()),
                    None,
                )))
            }
            Outcome::NotApplicable => Err(CloudEventsError::UnsupportedFormat(format!(
                "Unknown cloudevents content type: {}",
                content_type
            ))),
        }
    }

    /// Runs the envelope encoder chain called `name`.
    pub fn encode_envelope(
        &self,
        name: &str,
        envelope: &EventEnvelope,
        options: &FormatOptions,
    ) -> CloudEventsResult<EncodedContent> {
        let encoders = self.event_encoders.get(name).ok_or_else(|| {
            CloudEventsError::InvalidArgument(format!("Unknown encoder format: {}", name))
        })?;
        encoders
            .encode_envelope(envelope, &self.data_encoders, options)
            .into_result()?
            .ok_or_else(|| {
                CloudEventsError::UnsupportedFormat(format!(
                    "Format {} could not encode event",
                    name
                ))
            })
    }

    /// Payload attributes for a binary-mode decode: the raw content as
    /// `data_encoded`, the decoded value as `data` when a payload codec
    /// accepts it, and the content type.
    pub fn payload_attributes(
        &self,
        spec_version: &str,
        content: Option<EncodedData>,
        content_type: Option<&MediaType>,
        options: &FormatOptions,
    ) -> CloudEventsResult<Vec<(String, AttributeValue)>> {
        let mut args = Vec::new();
        let mut content_type = content_type.cloned();
        if let Some(content) = content {
            let decoded = self
                .data_decoders
                .decode_payload(spec_version, &content, content_type.as_ref(), options)
                .into_result()?;
            if let Some(payload) = decoded {
                args.push(("data".to_string(), AttributeValue::Data(payload.data)));
                if payload.content_type.is_some() {
                    content_type = payload.content_type;
                }
            }
            args.push(("data_encoded".to_string(), AttributeValue::Encoded(content)));
        }
        // A blank header names no content type.
        if let Some(ct) = content_type.filter(|ct| !ct.original_string().trim().is_empty()) {
            args.push(("datacontenttype".to_string(), AttributeValue::MediaType(ct)));
        }
        Ok(args)
    }

    /// The binary-mode payload of `event`, or `None` when it carries no data.
    pub fn encode_payload(
        &self,
        event: &Event,
        options: &FormatOptions,
    ) -> CloudEventsResult<Option<EncodedContent>> {
        let content_type = event.data_content_type();
        if let Some(encoded) = event.data_encoded() {
            return Ok(Some(EncodedContent {
                content: encoded.clone(),
                content_type: content_type.cloned(),
            }));
        }
        let data = match event.data() {
            Some(data) => data,
            None => return Ok(None),
        };
        let legacy = V0_SPEC_VERSION.is_match(event.spec_version());
        if let (true, Value::String(text)) = (legacy, data) {
            return Ok(Some(EncodedContent {
                content: EncodedData::Text(text.clone()),
                content_type: Some(
                    content_type
                        .cloned()
                        .unwrap_or_else(|| MediaType::from("text/plain; charset=utf-8")),
                ),
            }));
        }
        let fallback;
        let content_type = match content_type {
            Some(ct) => ct,
            None if legacy => {
                fallback = MediaType::from("application/json");
                &fallback
            }
            None => {
                return Err(CloudEventsError::UnsupportedFormat(
                    "Could not encode data without a content type".to_string(),
                ))
            }
        };
        self.data_encoders
            .encode_payload(event.spec_version(), data, Some(content_type), options)
            .into_result()?
            .map(Some)
            .ok_or_else(|| {
                CloudEventsError::UnsupportedFormat(format!(
                    "Could not encode data content-type: {}",
                    content_type
                ))
            })
    }
}
