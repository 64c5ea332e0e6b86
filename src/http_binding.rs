//! # HTTP Protocol Binding
//!
//! Translates between [`EventEnvelope`]s and HTTP-shaped messages (method,
//! headers, body) in the three content modes:
//!
//! - **binary**: attributes travel as percent-encoded `CE-<name>` headers,
//!   the body is the bare payload described by `Content-Type`.
//! - **structured**: the whole event is serialized by a named format, e.g.
//!   `application/cloudevents+json`.
//! - **batch**: several events in one structured body,
//!   e.g. `application/cloudevents-batch+json`.
//!
//! Codecs are plugged in through [`HttpBinding::register`]; the binding itself
//! knows nothing about JSON or text.

use std::{collections::BTreeMap, io::Read, sync::Arc};

use lazy_static::lazy_static;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::{Captures, Regex};
use tracing::debug;

use crate::{
    config::BindingConfig,
    event::{AttributeValue, EncodedData, Event, EventEnvelope, SUPPORTED_SPEC_VERSION},
    format::{Format, FormatCapabilities, FormatOptions, FormatRegistry},
    media_type::MediaType,
    CloudEventsError, CloudEventsResult,
};

/// Bytes outside `!`..=`~`, plus `"` and `%`.
const HEADER_VALUE: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'%');

lazy_static! {
    static ref QUOTED_SEGMENT: Regex = Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap();
    static ref QUOTED_ESCAPE: Regex = Regex::new(r"\\(.)").unwrap();
    static ref DEFAULT_HTTP_BINDING: HttpBinding = HttpBinding::with_defaults();
}

const CE_HEADER_PREFIX: &str = "ce-";
const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Attributes that never travel as `CE-` headers of their own.
const NON_HEADER_ATTRIBUTES: &[&str] = &["specversion", "data", "data_encoded", "datacontenttype"];

/// Percent-encodes a header value as UTF-8.
///
/// ```
/// # use cloudevents_bindings::http_binding::percent_encode;
/// assert_eq!(percent_encode("Hi! 😀"), "Hi!%20%F0%9F%98%80");
/// ```
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, HEADER_VALUE).to_string()
}

/// Reverses [`percent_encode`], first stripping one layer of double-quote
/// quoting that an intermediary may have added.
pub fn percent_decode(value: &str) -> String {
    let unquoted = QUOTED_SEGMENT.replace_all(value, |caps: &Captures| {
        QUOTED_ESCAPE.replace_all(&caps[1], "$1").into_owned()
    });
    percent_decode_str(&unquoted).decode_utf8_lossy().into_owned()
}

/// A transport-neutral HTTP request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMessage {
    pub method: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// `None` when there is no body at all, as opposed to an empty one.
    pub body: Option<Vec<u8>>,
}

impl HttpMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a message, reading `body` to completion.
    pub fn from_reader<R: Read>(
        method: Option<&str>,
        headers: impl IntoIterator<Item = (String, String)>,
        mut body: R,
    ) -> CloudEventsResult<Self> {
        let mut content = Vec::new();
        body.read_to_end(&mut content).map_err(|e| {
            CloudEventsError::InvalidArgument(format!("Failed to read body: {}", e))
        })?;
        Ok(Self {
            method: method.map(str::to_string),
            headers: headers.into_iter().collect(),
            body: Some(content),
        })
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
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

    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Decodes and encodes events carried over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBinding {
    registry: FormatRegistry,
    config: BindingConfig,
}

impl Default for HttpBinding {
    fn default() -> Self {
        Self::new(BindingConfig::default())
    }
}

impl HttpBinding {
    /// A binding with no codecs registered.
    pub fn new(config: BindingConfig) -> Self {
        Self {
            registry: FormatRegistry::new(),
            config,
        }
    }

    /// A binding with the JSON and text codecs registered as `json`.
    pub fn with_defaults() -> Self {
        Self::from_config(BindingConfig::default())
    }

    /// Default codecs, registered under the configured default encoder name.
    pub fn from_config(config: BindingConfig) -> Self {
        Self {
            registry: FormatRegistry::with_defaults(&config.default_encoder_name),
            config,
        }
    }

    /// The process-wide binding with the default codecs, built on first use.
    pub fn default_binding() -> &'static HttpBinding {
        &DEFAULT_HTTP_BINDING
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

    /// Registers every operation `format` implements. Envelope encoding is
    /// registered under `name`, or the default encoder name.
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
    pub fn probable_event(&self, message: &HttpMessage) -> bool {
        if message.header("ce-specversion").is_some() {
            return true;
        }
        message
            .content_type()
            .map(|ct| MediaType::parse(Some(ct)).is_cloudevents())
            .unwrap_or(false)
    }

    /// Decodes with the configured `allow_opaque` setting.
    pub fn decode_default(&self, message: &HttpMessage) -> CloudEventsResult<EventEnvelope> {
        self.decode(message, self.config.allow_opaque)
    }

    /// Decodes a binary-mode event, or a structured event or batch. With
    /// `allow_opaque`, structured content no codec understands comes back as
    /// [`EventEnvelope::Opaque`].
    #[tracing::instrument(level = "debug", skip(self, message), fields(method = ?message.method))]
    pub fn decode(
        &self,
        message: &HttpMessage,
        allow_opaque: bool,
    ) -> CloudEventsResult<EventEnvelope> {
        if let Some(method) = &message.method {
            if method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD") {
                return Err(CloudEventsError::NotCloudEvent(format!(
                    "{} requests do not carry CloudEvents",
                    method.to_ascii_uppercase()
                )));
            }
        }
        let content_type = message.content_type().map(|ct| MediaType::parse(Some(ct)));
        if let Some(event) = self.decode_binary(message, content_type.as_ref())? {
            return Ok(EventEnvelope::Event(event));
        }
        if let Some(ct) = content_type.as_ref().filter(|ct| ct.is_cloudevents()) {
            let content =
                EncodedData::from_bytes(message.body.clone().unwrap_or_default(), ct.charset());
            return self
                .registry
                .decode_envelope(content, ct, allow_opaque, &self.config.format);
        }
        Err(CloudEventsError::NotCloudEvent(format!(
            "Content-Type is {}, and CE-SpecVersion is not present",
            message.content_type().unwrap_or("missing")
        )))
    }

    fn decode_binary(
        &self,
        message: &HttpMessage,
        content_type: Option<&MediaType>,
    ) -> CloudEventsResult<Option<Event>> {
        let spec_version = match message.header("ce-specversion") {
            Some(version) => percent_decode(version),
            None => return Ok(None),
        };
        if !SUPPORTED_SPEC_VERSION.is_match(&spec_version) {
            return Err(CloudEventsError::spec_version(format!(
                "Unrecognized specversion: {}",
                spec_version
            )));
        }
        debug!(%spec_version, "decoding binary mode");
        let content = message.body.as_ref().map(|body| {
            EncodedData::from_bytes(body.clone(), content_type.and_then(MediaType::charset))
        });
        let mut args = self.registry.payload_attributes(
            &spec_version,
            content,
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
                    args.push((attribute.to_string(), percent_decode(value).into()));
                }
            }
        }
        Event::from_attributes(args.into_iter().collect()).map(Some)
    }

    /// Encodes in the configured default mode.
    pub fn encode_default(&self, envelope: &EventEnvelope) -> CloudEventsResult<HttpMessage> {
        self.encode(envelope, self.config.structured)
    }

    /// Encodes in structured mode with the default encoder, or in binary mode.
    pub fn encode(
        &self,
        envelope: &EventEnvelope,
        structured: bool,
    ) -> CloudEventsResult<HttpMessage> {
        let format_name = structured.then_some(self.config.default_encoder_name.as_str());
        self.encode_with(envelope, format_name, &self.config.format)
    }

    /// Encodes in structured mode with the named encoder, or in binary mode
    /// when `format_name` is `None`. Opaque events pass through unchanged.
    #[tracing::instrument(level = "debug", skip(self, envelope, options))]
    pub fn encode_with(
        &self,
        envelope: &EventEnvelope,
        format_name: Option<&str>,
        options: &FormatOptions,
    ) -> CloudEventsResult<HttpMessage> {
        if let EventEnvelope::Opaque(opaque) = envelope {
            let mut message = HttpMessage::new().with_body(opaque.content().as_bytes());
            if let Some(ct) = opaque.content_type() {
                message = message.with_header(CONTENT_TYPE_HEADER, &ct.to_string());
            }
            return Ok(message);
        }
        match (format_name, envelope) {
            (Some(name), _) => {
                let encoded = self.registry.encode_envelope(name, envelope, options)?;
                let mut message = HttpMessage::new().with_body(encoded.content.into_bytes());
                if let Some(ct) = encoded.content_type {
                    message = message.with_header(CONTENT_TYPE_HEADER, &ct.to_string());
                }
                Ok(message)
            }
            (None, EventEnvelope::Event(event)) => self.encode_binary(event, options),
            (None, _) => Err(CloudEventsError::InvalidArgument(
                "Batch events must be encoded in structured mode".to_string(),
            )),
        }
    }

    fn encode_binary(
        &self,
        event: &Event,
        options: &FormatOptions,
    ) -> CloudEventsResult<HttpMessage> {
        let mut message = HttpMessage::new()
            .with_header("CE-specversion", &percent_encode(event.spec_version()));
        for (name, value) in event.to_map() {
            if !NON_HEADER_ATTRIBUTES.contains(&name.as_str()) {
                message = message.with_header(&format!("CE-{}", name), &percent_encode(value));
            }
        }
        if let Some(payload) = self.registry.encode_payload(event, options)? {
            message.body = Some(payload.content.into_bytes());
            if let Some(ct) = payload.content_type {
                message = message.with_header(CONTENT_TYPE_HEADER, &ct.to_string());
            }
        }
        Ok(message)
    }
}
