use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use super::{
    v1::{DATA_ENCODED_KEYS, DATA_KEYS},
    AttributeName, AttributeValue, EncodedData, FieldInterpreter, V0_SPEC_VERSION,
};
use crate::{media_type::MediaType, CloudEventsResult};

/// A CloudEvents 0.3 event.
///
/// 0.3 has a single `data` value. An encoded payload supplied as
/// `data_encoded` is folded into `data` as a string when no decoded value is
/// given, and the exact bytes are kept for re-encoding.
#[derive(Debug, Clone)]
pub struct EventV0 {
    spec_version: String,
    id: String,
    source: String,
    event_type: String,
    data_content_type: Option<MediaType>,
    data_content_encoding: Option<String>,
    schema_url: Option<String>,
    subject: Option<String>,
    time: Option<DateTime<FixedOffset>>,
    data: Option<Value>,
    data_encoded: Option<EncodedData>,
    attributes: BTreeMap<String, String>,
    extensions: BTreeMap<AttributeName, String>,
}

impl EventV0 {
    pub fn new(args: HashMap<String, AttributeValue>) -> CloudEventsResult<Self> {
        let mut fi = FieldInterpreter::new(args);
        let spec_version = fi.spec_version(super::SPEC_VERSION_KEYS, &V0_SPEC_VERSION)?;
        let id = fi.required_string(&["id"])?;
        let source = fi.required_uri(&["source"])?;
        let event_type = fi.required_string(&["type"])?;
        let encoded = fi.data_encoded(DATA_ENCODED_KEYS)?;
        let data = fi.data_object(DATA_KEYS)?.or_else(|| {
            encoded
                .as_ref()
                .map(|e| Value::String(e.to_text_lossy().into_owned()))
        });
        let data_content_type = fi.media_type(&["datacontenttype", "data_content_type"])?;
        let data_content_encoding =
            fi.string(&["datacontentencoding", "data_content_encoding"], false, false)?;
        let schema_url = fi.uri(&["schemaurl", "schema_url"], false)?;
        let subject = fi.string(&["subject"], false, false)?;
        let time = fi.rfc3339_date_time(&["time"])?;
        let (attributes, extensions) = fi.finish_attributes()?;
        Ok(Self {
            spec_version,
            id,
            source,
            event_type,
            data_content_type,
            data_content_encoding,
            schema_url,
            subject,
            time,
            data,
            data_encoded: encoded,
            attributes,
            extensions,
        })
    }

    pub(crate) fn with_attributes(
        &self,
        changes: HashMap<String, AttributeValue>,
    ) -> CloudEventsResult<Self> {
        let mut args: HashMap<String, AttributeValue> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::String(v.clone())))
            .collect();
        if let Some(data) = &self.data {
            args.insert(DATA_KEYS[0].to_string(), AttributeValue::Data(data.clone()));
        }
        if let Some(encoded) = &self.data_encoded {
            args.insert(
                DATA_ENCODED_KEYS[0].to_string(),
                AttributeValue::Encoded(encoded.clone()),
            );
        }
        match (
            changes.contains_key(DATA_KEYS[0]),
            changes.contains_key(DATA_ENCODED_KEYS[0]),
        ) {
            (true, false) => {
                args.remove(DATA_ENCODED_KEYS[0]);
            }
            (false, true) => {
                args.remove(DATA_KEYS[0]);
            }
            _ => {}
        }
        args.extend(changes);
        Self::new(args)
    }

    pub fn spec_version(&self) -> &str {
        &self.spec_version
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data_content_type(&self) -> Option<&MediaType> {
        self.data_content_type.as_ref()
    }

    pub fn data_content_encoding(&self) -> Option<&str> {
        self.data_content_encoding.as_deref()
    }

    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn time(&self) -> Option<&DateTime<FixedOffset>> {
        self.time.as_ref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Exact encoded payload, when the event was decoded from one.
    pub fn data_encoded(&self) -> Option<&EncodedData> {
        self.data_encoded.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some() || self.data_encoded.is_some()
    }

    pub fn to_map(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn extensions(&self) -> &BTreeMap<AttributeName, String> {
        &self.extensions
    }
}

impl PartialEq for EventV0 {
    fn eq(&self, other: &Self) -> bool {
        if self.attributes != other.attributes || self.data != other.data {
            return false;
        }
        match (&self.data_encoded, &other.data_encoded) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}
