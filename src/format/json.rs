//! JSON event format: structured envelopes (`application/cloudevents+json`,
//! `application/cloudevents-batch+json`) and JSON payloads in binary mode.

use base64::Engine as _;
use lazy_static::lazy_static;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    sort_keys, DecodedPayload, EncodedContent, Format, FormatCapabilities, FormatOptions,
    MultiFormat, Outcome,
};
use crate::{
    event::{
        AttributeValue, EncodedData, Event, EventEnvelope, EventV0, EventV1,
        SUPPORTED_SPEC_VERSION, V0_SPEC_VERSION, V1_SPEC_VERSION,
    },
    media_type::MediaType,
    CloudEventsError, CloudEventsResult,
};

const OCTET_STREAM: &str = "application/octet-stream";
const BASE64_KEY: &str = "data_base64";

/// Attributes are emitted in this order, extensions after them.
const V1_KEY_ORDER: &[&str] = &[
    "specversion",
    "id",
    "source",
    "type",
    "datacontenttype",
    "dataschema",
    "subject",
    "time",
];
const V0_KEY_ORDER: &[&str] = &[
    "specversion",
    "id",
    "source",
    "type",
    "datacontenttype",
    "datacontentencoding",
    "schemaurl",
    "subject",
    "time",
];

lazy_static! {
    static ref SINGLE_CONTENT_TYPE: MediaType =
        MediaType::from("application/cloudevents+json; charset=utf-8");
    static ref BATCH_CONTENT_TYPE: MediaType =
        MediaType::from("application/cloudevents-batch+json; charset=utf-8");
}

fn is_json(content_type: Option<&MediaType>) -> bool {
    content_type.map(MediaType::is_json).unwrap_or(false)
}

fn check_spec_version(spec_version: &str) -> CloudEventsResult<()> {
    if SUPPORTED_SPEC_VERSION.is_match(spec_version) {
        Ok(())
    } else {
        Err(CloudEventsError::spec_version(format!(
            "Unrecognized specversion: {}",
            spec_version
        )))
    }
}

fn to_json_string(value: Value, options: &FormatOptions) -> String {
    let value = if options.sort { sort_keys(value) } else { value };
    value.to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Converts one envelope object into an event.
    pub fn decode_object(
        &self,
        object: Map<String, Value>,
        data_decoder: &MultiFormat,
        options: &FormatOptions,
    ) -> CloudEventsResult<Event> {
        let spec_version = match object.get("specversion") {
            Some(Value::String(version)) => version.clone(),
            Some(other) => {
                return Err(CloudEventsError::spec_version(format!(
                    "Unrecognized specversion: {}",
                    other
                )))
            }
            None => return Err(CloudEventsError::spec_version("Unrecognized specversion: none")),
        };
        if V1_SPEC_VERSION.is_match(&spec_version) {
            self.decode_v1(object, &spec_version, data_decoder, options)
                .map(Event::V1)
        } else if V0_SPEC_VERSION.is_match(&spec_version) {
            self.decode_v0(object).map(Event::V0)
        } else {
            Err(CloudEventsError::spec_version(format!(
                "Unrecognized specversion: {}",
                spec_version
            )))
        }
    }

    fn decode_v1(
        &self,
        mut object: Map<String, Value>,
        spec_version: &str,
        data_decoder: &MultiFormat,
        options: &FormatOptions,
    ) -> CloudEventsResult<EventV1> {
        let mut args = Vec::new();
        if let Some(encoded) = object.remove(BASE64_KEY) {
            object.remove("data");
            let encoded = match encoded {
                Value::String(s) => s,
                other => {
                    return Err(CloudEventsError::attribute(format!(
                        "Illegal type for {}: String expected but {} found",
                        BASE64_KEY, other
                    )))
                }
            };
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| CloudEventsError::format_syntax("Failed to decode data_base64", e))?;
            if !object.contains_key("datacontenttype") {
                object.insert("datacontenttype".to_string(), Value::from(OCTET_STREAM));
            }
            args.push(("data_encoded".to_string(), AttributeValue::from(bytes)));
        } else if let Some(data) = object.remove("data") {
            let content_type = match object.get("datacontenttype") {
                Some(Value::String(s)) => Some(MediaType::parse(Some(s))),
                _ => None,
            };
            match data {
                Value::String(text) if content_type.is_some() && !is_json(content_type.as_ref()) => {
                    let encoded = EncodedData::Text(text);
                    let decoded = data_decoder
                        .decode_payload(spec_version, &encoded, content_type.as_ref(), options)
                        .into_result()?;
                    if let Some(payload) = decoded {
                        args.push(("data".to_string(), AttributeValue::Data(payload.data)));
                    }
                    args.push(("data_encoded".to_string(), AttributeValue::Encoded(encoded)));
                }
                value => {
                    let encoded = EncodedData::Text(value.to_string());
                    args.push(("data".to_string(), AttributeValue::Data(value)));
                    args.push(("data_encoded".to_string(), AttributeValue::Encoded(encoded)));
                }
            }
        }
        args.extend(
            object
                .into_iter()
                .filter_map(|(k, v)| AttributeValue::from_json(v).map(|v| (k, v))),
        );
        EventV1::new(args.into_iter().collect())
    }

    fn decode_v0(&self, mut object: Map<String, Value>) -> CloudEventsResult<EventV0> {
        let json_data = match object.get("datacontenttype") {
            Some(Value::String(s)) => MediaType::parse(Some(s)).is_json(),
            _ => false,
        };
        if json_data {
            if let Some(Value::String(text)) = object.get("data") {
                if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                    object.insert("data".to_string(), parsed);
                }
            }
        }
        let mut args = std::collections::HashMap::new();
        if let Some(data) = object.remove("data") {
            args.insert("data".to_string(), AttributeValue::Data(data));
        }
        args.extend(
            object
                .into_iter()
                .filter_map(|(k, v)| AttributeValue::from_json(v).map(|v| (k, v))),
        );
        EventV0::new(args)
    }

    /// Converts one event into an envelope object.
    pub fn encode_object(
        &self,
        event: &Event,
        data_encoder: &MultiFormat,
        options: &FormatOptions,
    ) -> CloudEventsResult<Map<String, Value>> {
        match event {
            Event::V1(event) => self.encode_v1(event, data_encoder, options),
            Event::V0(event) => Ok(self.encode_v0(event)),
        }
    }

    fn encode_v1(
        &self,
        event: &EventV1,
        data_encoder: &MultiFormat,
        options: &FormatOptions,
    ) -> CloudEventsResult<Map<String, Value>> {
        let mut object = ordered_attributes(event.to_map(), V1_KEY_ORDER);
        if !event.has_data() {
            return Ok(object);
        }
        let content_type = event.data_content_type();
        if content_type.is_none() || is_json(content_type) {
            match (event.is_data_decoded(), event.data(), event.data_encoded()) {
                (true, Some(data), _) => {
                    object.insert("data".to_string(), data.clone());
                }
                (_, _, Some(EncodedData::Binary(bytes))) => {
                    insert_base64(&mut object, bytes);
                }
                (_, _, Some(EncodedData::Text(text))) => {
                    let data = serde_json::from_str(text)
                        .unwrap_or_else(|_| Value::String(text.clone()));
                    object.insert("data".to_string(), data);
                }
                _ => {}
            }
            return Ok(object);
        }

        let encoded = match (event.data_encoded(), event.data()) {
            (Some(encoded), _) => encoded.clone(),
            (None, Some(data)) => data_encoder
                .encode_payload(event.spec_version(), data, content_type, options)
                .into_result()?
                .map(|c| c.content)
                .ok_or_else(|| {
                    CloudEventsError::UnsupportedFormat(format!(
                        "Could not encode unknown content-type: {}",
                        content_type.map(MediaType::canonical_string).unwrap_or_default()
                    ))
                })?,
            (None, None) => return Ok(object),
        };
        match encoded {
            EncodedData::Text(text) => {
                object.insert("data".to_string(), Value::String(text));
            }
            EncodedData::Binary(bytes) => insert_base64(&mut object, &bytes),
        }
        Ok(object)
    }

    fn encode_v0(&self, event: &EventV0) -> Map<String, Value> {
        let mut object = ordered_attributes(event.to_map(), V0_KEY_ORDER);
        if let Some(data) = event.data() {
            let data = match data {
                Value::String(text) if is_json(event.data_content_type()) => {
                    serde_json::from_str(text).unwrap_or_else(|_| data.clone())
                }
                other => other.clone(),
            };
            object.insert("data".to_string(), data);
        }
        object
    }
}

fn ordered_attributes(
    attributes: &std::collections::BTreeMap<String, String>,
    order: &[&str],
) -> Map<String, Value> {
    let mut object = Map::new();
    for key in order {
        if let Some(value) = attributes.get(*key) {
            object.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    for (key, value) in attributes {
        if !order.contains(&key.as_str()) {
            object.insert(key.clone(), Value::String(value.clone()));
        }
    }
    object
}

fn insert_base64(object: &mut Map<String, Value>, bytes: &[u8]) {
    object.insert(
        BASE64_KEY.to_string(),
        Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
    );
    if !object.contains_key("datacontenttype") {
        object.insert("datacontenttype".to_string(), Value::from(OCTET_STREAM));
    }
}

impl Format for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities::all()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(content_type = %content_type.canonical_string()))]
    fn decode_envelope(
        &self,
        content: &EncodedData,
        content_type: &MediaType,
        data_decoder: &MultiFormat,
        options: &FormatOptions,
    ) -> Outcome<EventEnvelope> {
        if !content_type.is_cloudevents() {
            return Outcome::NotApplicable;
        }
        let batch = content_type.is_cloudevents_batch();
        match content_type.subtype_format() {
            Some("json") => {}
            None if !batch => {}
            _ => return Outcome::NotApplicable,
        }
        if batch {
            let objects: Vec<Map<String, Value>> = attempt!(serde_json::from_slice(
                content.as_bytes()
            )
            .map_err(|e| CloudEventsError::format_syntax("Failed to parse JSON batch", e)));
            debug!(count = objects.len(), "decoding batch");
            let events = attempt!(objects
                .into_iter()
                .map(|object| self.decode_object(object, data_decoder, options))
                .collect::<CloudEventsResult<Vec<_>>>());
            Outcome::Handled(EventEnvelope::Batch(events))
        } else {
            let object: Map<String, Value> = attempt!(serde_json::from_slice(content.as_bytes())
                .map_err(|e| CloudEventsError::format_syntax("Failed to parse JSON event", e)));
            self.decode_object(object, data_decoder, options)
                .map(EventEnvelope::Event)
                .into()
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn encode_envelope(
        &self,
        envelope: &EventEnvelope,
        data_encoder: &MultiFormat,
        options: &FormatOptions,
    ) -> Outcome<EncodedContent> {
        let (value, content_type) = match envelope {
            EventEnvelope::Event(event) => (
                Value::Object(attempt!(self.encode_object(event, data_encoder, options))),
                SINGLE_CONTENT_TYPE.clone(),
            ),
            EventEnvelope::Batch(events) => (
                Value::Array(attempt!(events
                    .iter()
                    .map(|e| self.encode_object(e, data_encoder, options).map(Value::Object))
                    .collect::<CloudEventsResult<Vec<_>>>())),
                BATCH_CONTENT_TYPE.clone(),
            ),
            EventEnvelope::Opaque(_) => return Outcome::NotApplicable,
        };
        Outcome::Handled(EncodedContent {
            content: EncodedData::Text(to_json_string(value, options)),
            content_type: Some(content_type),
        })
    }

    fn decode_payload(
        &self,
        spec_version: &str,
        content: &EncodedData,
        content_type: Option<&MediaType>,
        _options: &FormatOptions,
    ) -> Outcome<DecodedPayload> {
        if !is_json(content_type) {
            return Outcome::NotApplicable;
        }
        attempt!(check_spec_version(spec_version));
        let data = attempt!(serde_json::from_slice(content.as_bytes())
            .map_err(|e| CloudEventsError::format_syntax("Failed to parse JSON data", e)));
        Outcome::Handled(DecodedPayload {
            data,
            content_type: content_type.cloned(),
        })
    }

    fn encode_payload(
        &self,
        spec_version: &str,
        data: &Value,
        content_type: Option<&MediaType>,
        options: &FormatOptions,
    ) -> Outcome<EncodedContent> {
        if !is_json(content_type) {
            return Outcome::NotApplicable;
        }
        attempt!(check_spec_version(spec_version));
        Outcome::Handled(EncodedContent {
            content: EncodedData::Text(to_json_string(data.clone(), options)),
            content_type: content_type.cloned(),
        })
    }
}
