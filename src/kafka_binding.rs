//! # Kafka Protocol Binding
//!
//! Translates between events and Kafka-shaped records (`key`, `value`,
//! `headers`). The record client itself is out of scope: records are plain
//! values handed in and out by the caller.
//!
//! Differences from the HTTP binding:
//!
//! - Binary-mode attributes travel as `ce_<name>` headers without percent
//!   encoding.
//! - Batch content mode is never supported.
//! - A `None` value is a tombstone: an event that deliberately carries no
//!   payload.
//! - The record key is mapped to and from an event attribute, by default the
//!   `partitionkey` extension.

use std::{collections::BTreeMap, sync::Arc};

use lazy_static::lazy_static;
use tracing::debug;

use crate::{
    config::BindingConfig,
    event::{AttributeValue, EncodedData, Event, EventEnvelope, SUPPORTED_SPEC_VERSION},
    format::{Format, FormatCapabilities, FormatOptions, FormatRegistry},
    media_type::MediaType,
    CloudEventsError, CloudEventsResult,
};

lazy_static! {
    static ref DEFAULT_KAFKA_BINDING: KafkaBinding = KafkaBinding::with_defaults();
}

const CE_HEADER_PREFIX: &str = "ce_";
const CONTENT_TYPE_HEADER: &str = "content-type";
const NON_HEADER_ATTRIBUTES: &[&str] = &["specversion", "data", "data_encoded", "datacontenttype"];

/// Computes the record key for an event.
pub type KeyMapper = Arc<dyn Fn(&Event) -> Option<String> + Send + Sync>;

/// Turns a record key into attributes merged into the decoded event.
pub type ReverseKeyMapper = Arc<dyn Fn(Option<&str>) -> Vec<(String, AttributeValue)> + Send + Sync>;

/// Per-call choice of key mapper.
#[derive(Clone, Default)]
pub enum KeyMapping<T> {
    /// Use the binding's mapper.
    #[default]
    Inherit,
    /// Do not map the key at all.
    Disabled,
    Custom(T),
}

impl<T> KeyMapping<T> {
    fn resolve<'a>(&'a self, inherited: Option<&'a T>) -> Option<&'a T> {
        match self {
            Self::Inherit => inherited,
            Self::Disabled => None,
            Self::Custom(mapper) => Some(mapper),
        }
    }
}

/// Maps the record key to the `attribute` extension.
pub fn attribute_key_mapper(attribute: &str) -> KeyMapper {
    let attribute = attribute.to_string();
    Arc::new(move |event: &Event| event.attribute(&attribute).map(str::to_string))
}

/// Restores the `attribute` extension from the record key. A missing key
/// adds nothing.
pub fn attribute_reverse_key_mapper(attribute: &str) -> ReverseKeyMapper {
    let attribute = attribute.to_string();
    Arc::new(move |key: Option<&str>| {
        key.map(|k| vec![(attribute.clone(), AttributeValue::from(k))])
            .unwrap_or_default()
    })
}

/// A Kafka record as seen by the binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KafkaMessage {
    pub key: Option<String>,
    /// `None` marks a tombstone.
    pub value: Option<EncodedData>,
    pub headers: BTreeMap<String, String>,
}

impl KafkaMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_value(mut self, value: impl Into<EncodedData>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE_HEADER)
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Decodes and encodes events carried in Kafka records.
#[derive(Clone)]
pub struct KafkaBinding {
    registry: FormatRegistry,
    config: BindingConfig,
    key_mapper: Option<KeyMapper>,
    reverse_key_mapper: Option<ReverseKeyMapper>,
}

impl std::fmt::Debug for KafkaBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBinding")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("key_mapper", &self.key_mapper.is_some())
            .field("reverse_key_mapper", &self.reverse_key_mapper.is_some())
            .finish()
    }
}

impl Default for KafkaBinding {
    fn default() -> Self {
        Self::new(BindingConfig::default())
    }
}

impl KafkaBinding {
    /// A binding with no codecs and the attribute key mappers for
    /// `config.partition_key_attribute`.
    pub fn new(config: BindingConfig) -> Self {
        Self {
            registry: FormatRegistry::new(),
            key_mapper: Some(attribute_key_mapper(&config.partition_key_attribute)),
            reverse_key_mapper: Some(attribute_reverse_key_mapper(
                &config.partition_key_attribute,
            )),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::from_config(BindingConfig::default())
    }

    /// Default codecs, registered under the configured default encoder name.
    pub fn from_config(config: BindingConfig) -> Self {
        let mut binding = Self::new(config);
        binding.registry = FormatRegistry::with_defaults(&binding.config.default_encoder_name);
        binding
    }

    /// The process-wide binding with the default codecs, built on first use.
    pub fn default_binding() -> &'static KafkaBinding {
        &DEFAULT_KAFKA_BINDING
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn default_encoder_name(&self) -> &str {
        &self.config.default_encoder_name
    }

    pub fn set_default_encoder_name(&mut self, name: &str) {
        self.config.default_encoder_name = name.to_string();
    }

    /// `None` disables key mapping on encode.
    pub fn set_key_mapper(&mut self, mapper: Option<KeyMapper>) {
        self.key_mapper = mapper;
    }

    /// `None` disables key mapping on decode.
    pub fn set_reverse_key_mapper(&mut self, mapper: Option<ReverseKeyMapper>) {
        self.reverse_key_mapper = mapper;
    }

    pub fn register(&mut self, format: Arc<dyn Format>, name: Option<&str>) {
        self.register_with(format, name, FormatCapabilities::all());
    }

    pub fn register_with(
        &mut self,
        format: Arc<dyn Format>,
        name: Option<&str>,
        capabilities: FormatCapabilities,
    ) {
        let name = name.unwrap_or(&self.config.default_encoder_name).to_string();
        self.registry.register_with(format, &name, capabilities);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// Cheap check that looks at headers only.
    pub fn probable_event(&self, message: &KafkaMessage) -> bool {
        if message.header("ce_specversion").is_some() {
            return true;
        }
        message
            .content_type()
            .map(|ct| MediaType::parse(Some(ct)).is_cloudevents())
            .unwrap_or(false)
    }

    /// Decodes with the configured `allow_opaque` setting.
    pub fn decode_default(&self, message: &KafkaMessage) -> CloudEventsResult<EventEnvelope> {
        self.decode(message, self.config.allow_opaque)
    }

    pub fn decode(
        &self,
        message: &KafkaMessage,
        allow_opaque: bool,
    ) -> CloudEventsResult<EventEnvelope> {
        self.decode_with(message, allow_opaque, &KeyMapping::Inherit)
    }

    /// Decodes a binary-mode or structured record, then merges the attributes
    /// produced by the reverse key mapper.
    #[tracing::instrument(level = "debug", skip(self, message, reverse_key_mapper), fields(key = ?message.key))]
    pub fn decode_with(
        &self,
        message: &KafkaMessage,
        allow_opaque: bool,
        reverse_key_mapper: &KeyMapping<ReverseKeyMapper>,
    ) -> CloudEventsResult<EventEnvelope> {
        let content_type = message.content_type().map(|ct| MediaType::parse(Some(ct)));
        if let Some(ct) = content_type.as_ref().filter(|ct| ct.is_cloudevents_batch()) {
            return Err(CloudEventsError::BatchNotSupported(format!(
                "Kafka protocol binding does not support batch content mode ({})",
                ct
            )));
        }
        let envelope = if let Some(event) = self.decode_binary(message, content_type.as_ref())? {
            EventEnvelope::Event(event)
        } else if let Some(ct) = content_type.as_ref().filter(|ct| ct.is_cloudevents()) {
            let content = message
                .value
                .clone()
                .unwrap_or_else(|| EncodedData::Binary(Vec::new()));
            self.registry
                .decode_envelope(content, ct, allow_opaque, &self.config.format)?
        } else {
            return Err(CloudEventsError::NotCloudEvent(format!(
                "Content-Type is {}, and ce_specversion header is not present",
                message.content_type().unwrap_or("missing")
            )));
        };
        match envelope {
            EventEnvelope::Event(event) => {
                let mapper = reverse_key_mapper.resolve(self.reverse_key_mapper.as_ref());
                let changes = mapper.map(|m| m(message.key.as_deref())).unwrap_or_default();
                if changes.is_empty() {
                    return Ok(EventEnvelope::Event(event));
                }
                debug!(attributes = changes.len(), "applying reverse key mapping");
                event.with(changes).map(EventEnvelope::Event)
            }
            EventEnvelope::Batch(_) => Err(CloudEventsError::BatchNotSupported(
                "Kafka protocol binding does not support batch content mode".to_string(),
            )),
            opaque => Ok(opaque),
        }
    }

    fn decode_binary(
        &self,
        message: &KafkaMessage,
        content_type: Option<&MediaType>,
    ) -> CloudEventsResult<Option<Event>> {
        let spec_version = match message.header("ce_specversion") {
            Some(version) => version.to_string(),
            None => return Ok(None),
        };
        if !SUPPORTED_SPEC_VERSION.is_match(&spec_version) {
            return Err(CloudEventsError::spec_version(format!(
                "Unrecognized specversion: {}",
                spec_version
            )));
        }
        if message.is_tombstone() {
            debug!(%spec_version, "decoding tombstone");
        }
        let mut args = self.registry.payload_attributes(
            &spec_version,
            message.value.clone(),
            content_type,
            &self.config.format,
        )?;
        args.push((
            "specversion".to_string(),
            AttributeValue::String(spec_version),
        ));
        for (name, value) in &message.headers {
            let name = name.to_ascii_lowercase();
            if let Some(attribute) = name.strip_prefix(CE_HEADER_PREFIX) {
                if !NON_HEADER_ATTRIBUTES.contains(&attribute) {
                    args.push((attribute.to_string(), AttributeValue::from(value)));
                }
            }
        }
        Event::from_attributes(args.into_iter().collect()).map(Some)
    }

    /// Encodes in the configured default mode.
    pub fn encode_default(&self, envelope: &EventEnvelope) -> CloudEventsResult<KafkaMessage> {
        self.encode(envelope, self.config.structured)
    }

    /// Encodes in structured mode with the default encoder, or in binary mode.
    pub fn encode(
        &self,
        envelope: &EventEnvelope,
        structured: bool,
    ) -> CloudEventsResult<KafkaMessage> {
        let format_name = structured.then_some(self.config.default_encoder_name.as_str());
        self.encode_with(envelope, format_name, &KeyMapping::Inherit, &self.config.format)
    }

    /// Encodes in structured mode with the named encoder, or in binary mode
    /// when `format_name` is `None`. The key is computed before anything
    /// else.
    #[tracing::instrument(level = "debug", skip(self, envelope, key_mapper, options))]
    pub fn encode_with(
        &self,
        envelope: &EventEnvelope,
        format_name: Option<&str>,
        key_mapper: &KeyMapping<KeyMapper>,
        options: &FormatOptions,
    ) -> CloudEventsResult<KafkaMessage> {
        let event = match envelope {
            EventEnvelope::Event(event) => event,
            EventEnvelope::Opaque(opaque) if !opaque.is_batch() => {
                let mut message = KafkaMessage::new().with_value(opaque.content().clone());
                if let Some(ct) = opaque.content_type() {
                    message = message.with_header(CONTENT_TYPE_HEADER, &ct.to_string());
                }
                return Ok(message);
            }
            _ => {
                return Err(CloudEventsError::BatchNotSupported(
                    "Kafka protocol binding does not support batch content mode".to_string(),
                ))
            }
        };
        let key = key_mapper
            .resolve(self.key_mapper.as_ref())
            .and_then(|m| m(event));
        let mut message = match format_name {
            Some(name) => {
                let encoded = self.registry.encode_envelope(name, envelope, options)?;
                let mut message = KafkaMessage::new().with_value(encoded.content);
                if let Some(ct) = encoded.content_type {
                    message = message.with_header(CONTENT_TYPE_HEADER, &ct.to_string());
                }
                message
            }
            None => self.encode_binary(event, options)?,
        };
        message.key = key;
        Ok(message)
    }

    fn encode_binary(
        &self,
        event: &Event,
        options: &FormatOptions,
    ) -> CloudEventsResult<KafkaMessage> {
        let mut message =
            KafkaMessage::new().with_header("ce_specversion", event.spec_version());
        for (name, value) in event.to_map() {
            if !NON_HEADER_ATTRIBUTES.contains(&name.as_str()) {
                message = message.with_header(&format!("{}{}", CE_HEADER_PREFIX, name), value);
            }
        }
        match self.registry.encode_payload(event, options)? {
            Some(payload) => {
                message.value = Some(payload.content);
                if let Some(ct) = payload.content_type {
                    message = message.with_header(CONTENT_TYPE_HEADER, &ct.to_string());
                }
            }
            None => debug!("encoding tombstone"),
        }
        Ok(message)
    }
}
