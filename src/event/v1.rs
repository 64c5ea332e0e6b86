use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use super::{AttributeName, AttributeValue, EncodedData, FieldInterpreter, V1_SPEC_VERSION};
use crate::{media_type::MediaType, CloudEventsResult};

pub(crate) const DATA_KEYS: &[&str] = &["data"];
pub(crate) const DATA_ENCODED_KEYS: &[&str] = &["data_encoded"];
const CONTENT_TYPE_KEYS: &[&str] = &["datacontenttype", "data_content_type"];
const SCHEMA_KEYS: &[&str] = &["dataschema", "data_schema"];

/// A CloudEvents 1.0 event.
///
/// The payload is held in two forms: `data` is the decoded value and
/// `data_encoded` is the exact encoded form. Either, both, or neither may be
/// present. When `data` was supplied it is authoritative and serializers
/// re-encode it; otherwise `data_encoded` is passed through verbatim.
#[derive(Debug, Clone)]
pub struct EventV1 {
    spec_version: String,
    id: String,
    source: String,
    event_type: String,
    data_content_type: Option<MediaType>,
    data_schema: Option<String>,
    subject: Option<String>,
    time: Option<DateTime<FixedOffset>>,
    data: Option<Value>,
    data_encoded: Option<EncodedData>,
    data_decoded: bool,
    attributes: BTreeMap<String, String>,
    extensions: BTreeMap<AttributeName, String>,
}

impl EventV1 {
    pub fn new(args: HashMap<String, AttributeValue>) -> CloudEventsResult<Self> {
        let mut fi = FieldInterpreter::new(args);
        let spec_version = fi.spec_version(super::SPEC_VERSION_KEYS, &V1_SPEC_VERSION)?;
        let id = fi.required_string(&["id"])?;
        let source = fi.required_uri(&["source"])?;
        let event_type = fi.required_string(&["type"])?;
        let data_encoded = fi.data_encoded(DATA_ENCODED_KEYS)?;
        let data = fi.data_object(DATA_KEYS)?;
        let data_content_type = fi.media_type(CONTENT_TYPE_KEYS)?;
        let data_schema = fi.uri(SCHEMA_KEYS, false)?;
        let subject = fi.string(&["subject"], false, false)?;
        let time = fi.rfc3339_date_time(&["time"])?;
        let (attributes, extensions) = fi.finish_attributes()?;
        Ok(Self {
            spec_version,
            id,
            source,
            event_type,
            data_content_type,
            data_schema,
            subject,
            time,
            data_decoded: data.is_some(),
            data,
            data_encoded,
            attributes,
            extensions,
        })
    }

    /// The attribute mapping this event was built from, suitable for feeding
    /// back into [`EventV1::new`].
    pub(crate) fn to_args(&self) -> HashMap<String, AttributeValue> {
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
        args
    }

    /// Merges `changes` over this event's attributes. Replacing one payload
    /// form drops the other unless both are replaced together.
    pub(crate) fn with_attributes(
        &self,
        changes: HashMap<String, AttributeValue>,
    ) -> CloudEventsResult<Self> {
        let mut args = self.to_args();
        let touches = |keys: &[&str]| keys.iter().any(|k| changes.contains_key(*k));
        match (touches(DATA_KEYS), touches(DATA_ENCODED_KEYS)) {
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

    /// The source URI reference, as supplied.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data_content_type(&self) -> Option<&MediaType> {
        self.data_content_type.as_ref()
    }

    pub fn data_schema(&self) -> Option<&str> {
        self.data_schema.as_deref()
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

    pub fn data_encoded(&self) -> Option<&EncodedData> {
        self.data_encoded.as_ref()
    }

    /// Whether `data` is the authoritative payload form.
    pub fn is_data_decoded(&self) -> bool {
        self.data_decoded
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

impl PartialEq for EventV1 {
    fn eq(&self, other: &Self) -> bool {
        if self.attributes != other.attributes {
            return false;
        }
        if self.data_decoded && other.data_decoded {
            self.data == other.data
        } else {
            self.data_encoded == other.data_encoded
        }
    }
}
