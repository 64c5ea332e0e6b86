//! # Event Model
//!
//! Immutable CloudEvent values, one variant per supported spec version:
//!
//! - [`EventV1`]: CloudEvents 1.0, with the dual `data` / `data_encoded`
//!   payload model.
//! - [`EventV0`]: CloudEvents 0.3, with a single `data` value (plus the exact
//!   bytes it was decoded from) and the legacy `datacontentencoding` /
//!   `schemaurl` attributes.
//!
//! Events are built from a loose attribute mapping through
//! [`Event::create`], validated once, and never mutated afterwards.
//! [`Event::with`] produces a modified copy.
//!
//! Content that is recognizably CloudEvents-shaped but in a structured format
//! nobody can decode is carried as an [`OpaqueEvent`].

mod field_interpreter;
mod opaque;
mod v0;
mod v1;

use std::{borrow::Cow, collections::BTreeMap, collections::HashMap};

use chrono::{DateTime, FixedOffset, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::{media_type::MediaType, CloudEventsError, CloudEventsResult};

pub(crate) use field_interpreter::FieldInterpreter;
pub use opaque::OpaqueEvent;
pub use v0::EventV0;
pub use v1::EventV1;

lazy_static! {
    pub(crate) static ref V0_SPEC_VERSION: Regex = Regex::new(r"^0\.3$").expect("static pattern");
    pub(crate) static ref V1_SPEC_VERSION: Regex = Regex::new(r"^1(\.|$)").expect("static pattern");
    pub(crate) static ref SUPPORTED_SPEC_VERSION: Regex =
        Regex::new(r"^(0\.3$|1(\.|$))").expect("static pattern");
    static ref ATTRIBUTE_NAME: Regex = Regex::new(r"^[a-z0-9]+$").expect("static pattern");
}

/// Keys that name the spec version, wire name first.
pub(crate) const SPEC_VERSION_KEYS: &[&str] = &["specversion", "spec_version"];

/// Validated extension attribute name: lowercase ASCII letters and digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeName(String);

impl AttributeName {
    pub fn new(name: impl Into<String>) -> CloudEventsResult<Self> {
        let name = name.into();
        if !ATTRIBUTE_NAME.is_match(&name) {
            return Err(CloudEventsError::attribute(format!(
                "Illegal attribute name: {:?}",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttributeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The exact encoded form of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EncodedData {
    Text(String),
    Binary(Vec<u8>),
}

impl EncodedData {
    /// Raw transport bytes become text only when a charset was declared and the
    /// bytes are valid UTF-8; anything else is binary.
    pub fn from_bytes(bytes: Vec<u8>, charset: Option<&str>) -> Self {
        if charset.is_none() {
            return Self::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Binary(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<&str> for EncodedData {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for EncodedData {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for EncodedData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// A loosely typed attribute value, as accepted by [`Event::create`] and
/// [`Event::with`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Uri(Url),
    Time(DateTime<FixedOffset>),
    MediaType(MediaType),
    Data(Value),
    Encoded(EncodedData),
}

impl AttributeValue {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Integer(_) => "Integer",
            Self::Boolean(_) => "Boolean",
            Self::Uri(_) => "URI",
            Self::Time(_) => "DateTime",
            Self::MediaType(_) => "MediaType",
            Self::Data(_) => "Data",
            Self::Encoded(EncodedData::Text(_)) => "Text",
            Self::Encoded(EncodedData::Binary(_)) => "Binary",
        }
    }

    /// Stringifies a value for storage as an extension attribute.
    pub(crate) fn to_attribute_string(&self, name: &str) -> CloudEventsResult<String> {
        Ok(match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Uri(url) => url.to_string(),
            Self::Time(time) => time.to_rfc3339(),
            Self::MediaType(mt) => mt.to_string(),
            Self::Data(Value::String(s)) => s.clone(),
            Self::Data(value) => value.to_string(),
            Self::Encoded(EncodedData::Text(s)) => s.clone(),
            Self::Encoded(EncodedData::Binary(_)) => {
                return Err(CloudEventsError::attribute(format!(
                    "Illegal type for {}: binary content cannot be an attribute",
                    name
                )))
            }
        })
    }

    pub(crate) fn into_json(self) -> Value {
        match self {
            Self::String(s) => Value::String(s),
            Self::Integer(i) => Value::from(i),
            Self::Boolean(b) => Value::Bool(b),
            Self::Uri(url) => Value::String(url.to_string()),
            Self::Time(time) => Value::String(time.to_rfc3339()),
            Self::MediaType(mt) => Value::String(mt.to_string()),
            Self::Data(value) => value,
            Self::Encoded(encoded) => Value::String(encoded.to_text_lossy().into_owned()),
        }
    }

    /// Maps a JSON envelope member onto an attribute value. `null` has no
    /// attribute representation.
    pub(crate) fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::String(s)),
            Value::Bool(b) => Some(Self::Boolean(b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::String(n.to_string()),
            }),
            other => Some(Self::Data(other)),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for AttributeValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Url> for AttributeValue {
    fn from(value: Url) -> Self {
        Self::Uri(value)
    }
}

impl From<DateTime<FixedOffset>> for AttributeValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Time(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value.fixed_offset())
    }
}

impl From<MediaType> for AttributeValue {
    fn from(value: MediaType) -> Self {
        Self::MediaType(value)
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

impl From<EncodedData> for AttributeValue {
    fn from(value: EncodedData) -> Self {
        Self::Encoded(value)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Encoded(EncodedData::Binary(value))
    }
}

pub(crate) fn collect_attributes<I, K, V>(attributes: I) -> HashMap<String, AttributeValue>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttributeValue>,
{
    attributes
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A CloudEvent of any supported spec version.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    V0(EventV0),
    V1(EventV1),
}

impl Event {
    /// Builds an event of the variant matching `spec_version`.
    ///
    /// ```
    /// # use cloudevents_bindings::event::Event;
    /// let event = Event::create(
    ///     "1.0",
    ///     [("id", "1234"), ("source", "/orders"), ("type", "com.example.created")],
    /// )
    /// .unwrap();
    /// assert_eq!(event.id(), "1234");
    /// assert!(!event.has_data());
    /// ```
    pub fn create<I, K, V>(spec_version: &str, attributes: I) -> CloudEventsResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let mut args = collect_attributes(attributes);
        for key in SPEC_VERSION_KEYS {
            args.remove(*key);
        }
        args.insert(
            SPEC_VERSION_KEYS[0].to_string(),
            AttributeValue::String(spec_version.to_string()),
        );
        Self::from_attributes(args)
    }

    /// Builds an event from a mapping that carries its own `specversion`.
    pub fn from_attributes(args: HashMap<String, AttributeValue>) -> CloudEventsResult<Self> {
        let version = SPEC_VERSION_KEYS
            .iter()
            .filter_map(|key| args.get(*key))
            .last()
            .ok_or_else(|| CloudEventsError::attribute("The specversion field is required"))?;
        let version = match version {
            AttributeValue::String(s) => s.as_str(),
            other => {
                return Err(CloudEventsError::attribute(format!(
                    "Illegal type for specversion: String expected but {} found",
                    other.type_name()
                )))
            }
        };
        if V1_SPEC_VERSION.is_match(version) {
            Ok(Self::V1(EventV1::new(args)?))
        } else if V0_SPEC_VERSION.is_match(version) {
            Ok(Self::V0(EventV0::new(args)?))
        } else {
            Err(CloudEventsError::spec_version(format!(
                "Unrecognized specversion: {}",
                version
            )))
        }
    }

    /// Returns a new event with `changes` merged over this one's attributes.
    pub fn with<I, K, V>(&self, changes: I) -> CloudEventsResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let changes = collect_attributes(changes);
        match self {
            Self::V0(event) => event.with_attributes(changes).map(Self::V0),
            Self::V1(event) => event.with_attributes(changes).map(Self::V1),
        }
    }

    pub fn spec_version(&self) -> &str {
        match self {
            Self::V0(e) => e.spec_version(),
            Self::V1(e) => e.spec_version(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::V0(e) => e.id(),
            Self::V1(e) => e.id(),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::V0(e) => e.source(),
            Self::V1(e) => e.source(),
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::V0(e) => e.event_type(),
            Self::V1(e) => e.event_type(),
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::V0(e) => e.subject(),
            Self::V1(e) => e.subject(),
        }
    }

    pub fn time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::V0(e) => e.time(),
            Self::V1(e) => e.time(),
        }
    }

    pub fn data_content_type(&self) -> Option<&MediaType> {
        match self {
            Self::V0(e) => e.data_content_type(),
            Self::V1(e) => e.data_content_type(),
        }
    }

    /// Decoded payload, if one is known.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::V0(e) => e.data(),
            Self::V1(e) => e.data(),
        }
    }

    /// Exact encoded payload, if one is known.
    pub fn data_encoded(&self) -> Option<&EncodedData> {
        match self {
            Self::V0(e) => e.data_encoded(),
            Self::V1(e) => e.data_encoded(),
        }
    }

    /// Whether the event carries any payload at all.
    pub fn has_data(&self) -> bool {
        match self {
            Self::V0(e) => e.has_data(),
            Self::V1(e) => e.has_data(),
        }
    }

    /// Looks up any string attribute (required, optional or extension).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.to_map().get(name).map(String::as_str)
    }

    /// The frozen canonical attribute map. Payload fields are not included.
    pub fn to_map(&self) -> &BTreeMap<String, String> {
        match self {
            Self::V0(e) => e.to_map(),
            Self::V1(e) => e.to_map(),
        }
    }

    pub fn extensions(&self) -> &BTreeMap<AttributeName, String> {
        match self {
            Self::V0(e) => e.extensions(),
            Self::V1(e) => e.extensions(),
        }
    }
}

impl From<EventV0> for Event {
    fn from(event: EventV0) -> Self {
        Self::V0(event)
    }
}

impl From<EventV1> for Event {
    fn from(event: EventV1) -> Self {
        Self::V1(event)
    }
}

/// What travels in one transport unit: a single event, a batch, or content
/// that could only be kept opaque.
#[derive(Debug, Clone, PartialEq)]
pub enum EventEnvelope {
    Event(Event),
    Batch(Vec<Event>),
    Opaque(OpaqueEvent),
}

impl EventEnvelope {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_batch(self) -> Option<Vec<Event>> {
        match self {
            Self::Batch(batch) => Some(batch),
            _ => None,
        }
    }

    pub fn into_opaque(self) -> Option<OpaqueEvent> {
        match self {
            Self::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }
}

impl From<Event> for EventEnvelope {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<Vec<Event>> for EventEnvelope {
    fn from(batch: Vec<Event>) -> Self {
        Self::Batch(batch)
    }
}

impl From<OpaqueEvent> for EventEnvelope {
    fn from(opaque: OpaqueEvent) -> Self {
        Self::Opaque(opaque)
    }
}
