//! One-shot attribute extraction and validation shared by [`EventV0`] and
//! [`EventV1`] construction.
//!
//! Each accessor removes its keys (wire name first, then aliases) from the
//! pending arguments, converts the value, and records the canonical string in
//! the flat attribute map. Whatever is left over after the recognized fields
//! are consumed becomes an extension attribute.
//!
//! [`EventV0`]: super::EventV0
//! [`EventV1`]: super::EventV1

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::Value;
use url::Url;

use super::{AttributeName, AttributeValue, EncodedData};
use crate::{media_type::MediaType, CloudEventsError, CloudEventsResult};

pub(crate) struct FieldInterpreter {
    args: HashMap<String, AttributeValue>,
    attributes: BTreeMap<String, String>,
}

impl FieldInterpreter {
    pub fn new(args: HashMap<String, AttributeValue>) -> Self {
        Self {
            args,
            attributes: BTreeMap::new(),
        }
    }

    /// Removes every alias; the last one present wins.
    fn take(&mut self, keys: &[&str]) -> Option<AttributeValue> {
        keys.iter()
            .filter_map(|key| self.args.remove(*key))
            .last()
    }

    fn record(&mut self, keys: &[&str], raw: String) {
        self.attributes.insert(keys[0].to_string(), raw);
    }

    fn required<T>(keys: &[&str], value: Option<T>) -> CloudEventsResult<T> {
        value.ok_or_else(|| {
            CloudEventsError::attribute(format!("The {} field is required", keys[0]))
        })
    }

    pub fn spec_version(&mut self, keys: &[&str], accept: &Regex) -> CloudEventsResult<String> {
        let value = Self::required(keys, self.take(keys))?;
        match value {
            AttributeValue::String(version) => {
                if !accept.is_match(&version) {
                    return Err(CloudEventsError::spec_version(format!(
                        "Unrecognized specversion: {}",
                        version
                    )));
                }
                self.record(keys, version.clone());
                Ok(version)
            }
            other => Err(illegal_type(keys[0], "String", &other)),
        }
    }

    pub fn string(
        &mut self,
        keys: &[&str],
        required: bool,
        allow_empty: bool,
    ) -> CloudEventsResult<Option<String>> {
        let value = match self.take(keys) {
            Some(value) => value,
            None if required => return Self::required(keys, None),
            None => return Ok(None),
        };
        match value {
            AttributeValue::String(s) => {
                if s.is_empty() && !allow_empty {
                    return Err(cannot_be_empty(keys[0]));
                }
                self.record(keys, s.clone());
                Ok(Some(s))
            }
            other => Err(illegal_type(keys[0], "String", &other)),
        }
    }

    pub fn required_string(&mut self, keys: &[&str]) -> CloudEventsResult<String> {
        let value = self.string(keys, true, false)?;
        Self::required(keys, value)
    }

    /// Accepts absolute URIs and relative references; the raw string is kept.
    pub fn uri(&mut self, keys: &[&str], required: bool) -> CloudEventsResult<Option<String>> {
        let value = match self.take(keys) {
            Some(value) => value,
            None if required => return Self::required(keys, None),
            None => return Ok(None),
        };
        let raw = match value {
            AttributeValue::String(s) => {
                if s.is_empty() {
                    return Err(cannot_be_empty(keys[0]));
                }
                validate_uri_reference(&s).map_err(|message| {
                    CloudEventsError::attribute(format!(
                        "Illegal format for {}: {}",
                        keys[0], message
                    ))
                })?;
                s
            }
            AttributeValue::Uri(url) => url.to_string(),
            other => return Err(illegal_type(keys[0], "URI", &other)),
        };
        self.record(keys, raw.clone());
        Ok(Some(raw))
    }

    pub fn required_uri(&mut self, keys: &[&str]) -> CloudEventsResult<String> {
        let value = self.uri(keys, true)?;
        Self::required(keys, value)
    }

    pub fn rfc3339_date_time(
        &mut self,
        keys: &[&str],
    ) -> CloudEventsResult<Option<DateTime<FixedOffset>>> {
        let (time, raw) = match self.take(keys) {
            None => return Ok(None),
            Some(AttributeValue::String(s)) => {
                let time = DateTime::parse_from_rfc3339(&s).map_err(|e| {
                    CloudEventsError::attribute(format!(
                        "Illegal format for {}: {}",
                        keys[0], e
                    ))
                })?;
                (time, s)
            }
            Some(AttributeValue::Time(time)) => (time, time.to_rfc3339()),
            Some(other) => return Err(illegal_type(keys[0], "DateTime", &other)),
        };
        self.record(keys, raw);
        Ok(Some(time))
    }

    pub fn media_type(&mut self, keys: &[&str]) -> CloudEventsResult<Option<MediaType>> {
        let (media_type, raw) = match self.take(keys) {
            None => return Ok(None),
            Some(AttributeValue::String(s)) => {
                if s.is_empty() {
                    return Err(cannot_be_empty(keys[0]));
                }
                (MediaType::parse(Some(&s)), s)
            }
            Some(AttributeValue::MediaType(mt)) => {
                let raw = mt.to_string();
                if raw.is_empty() {
                    return Err(cannot_be_empty(keys[0]));
                }
                (mt, raw)
            }
            Some(other) => return Err(illegal_type(keys[0], "MediaType", &other)),
        };
        self.record(keys, raw);
        Ok(Some(media_type))
    }

    /// Decoded payload. Present-but-null is still "present".
    pub fn data_object(&mut self, keys: &[&str]) -> CloudEventsResult<Option<Value>> {
        match self.take(keys) {
            None => Ok(None),
            Some(AttributeValue::Encoded(EncodedData::Binary(_))) => Err(CloudEventsError::attribute(
                format!("Illegal type for {}: use data_encoded for binary content", keys[0]),
            )),
            Some(value) => Ok(Some(value.into_json())),
        }
    }

    pub fn data_encoded(&mut self, keys: &[&str]) -> CloudEventsResult<Option<EncodedData>> {
        match self.take(keys) {
            None => Ok(None),
            Some(AttributeValue::String(s)) => Ok(Some(EncodedData::Text(s))),
            Some(AttributeValue::Encoded(encoded)) => Ok(Some(encoded)),
            Some(other) => Err(illegal_type(keys[0], "String or bytes", &other)),
        }
    }

    /// Consumes the remaining arguments as extension attributes and returns
    /// the frozen flat attribute map together with the extensions.
    pub fn finish_attributes(
        mut self,
    ) -> CloudEventsResult<(BTreeMap<String, String>, BTreeMap<AttributeName, String>)> {
        let mut extensions = BTreeMap::new();
        let mut remaining: Vec<_> = self.args.drain().collect();
        remaining.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in remaining {
            let name = AttributeName::new(key)?;
            let value = value.to_attribute_string(name.as_str())?;
            self.attributes.insert(name.to_string(), value.clone());
            extensions.insert(name, value);
        }
        Ok((self.attributes, extensions))
    }
}

fn illegal_type(key: &str, expected: &str, found: &AttributeValue) -> CloudEventsError {
    CloudEventsError::attribute(format!(
        "Illegal type for {}: {} expected but {} found",
        key,
        expected,
        found.type_name()
    ))
}

fn cannot_be_empty(key: &str) -> CloudEventsError {
    CloudEventsError::attribute(format!("The {} field cannot be empty", key))
}

fn validate_uri_reference(value: &str) -> Result<(), String> {
    if let Some(c) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("unexpected character {:?}", c));
    }
    match Url::parse(value) {
        Ok(_) => Ok(()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse("http://localhost/").map_err(|e| e.to_string())?;
            base.join(value).map(|_| ()).map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}
