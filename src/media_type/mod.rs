//! # Media Types
//!
//! [`MediaType`] is the parsed, normalized form of a `Content-Type` header. It
//! drives every format-selection decision in the bindings, so it is built to
//! never fail: input that does not follow the grammar degrades to
//! `text/plain; charset=us-ascii` and the diagnostic is kept in
//! [`MediaType::error_message`].
//!
//! ```
//! # use cloudevents_bindings::media_type::MediaType;
//! let mt = MediaType::parse(Some("Application/CloudEvents+JSON; charset=utf-8"));
//! assert_eq!(mt.media_type(), "application");
//! assert_eq!(mt.subtype_base(), "cloudevents");
//! assert_eq!(mt.subtype_format(), Some("json"));
//! assert_eq!(mt.charset(), Some("utf-8"));
//! assert_eq!(mt.canonical_string(), "application/cloudevents+json; charset=utf-8");
//! ```

pub(crate) mod parser;

use std::hash::{Hash, Hasher};

use tracing::debug;

use parser::{describe_error, is_token_char, parse_media_type};

const DEFAULT_MEDIA_TYPE: &str = "text";
const DEFAULT_SUBTYPE: &str = "plain";
const DEFAULT_CHARSET: &str = "us-ascii";

#[derive(Debug, Clone)]
pub struct MediaType {
    media_type: String,
    subtype: String,
    subtype_base: String,
    subtype_format: Option<String>,
    params: Vec<(String, String)>,
    charset: Option<String>,
    original_string: String,
    canonical_string: String,
    error: Option<String>,
}

impl MediaType {
    /// Parses a raw header value. Missing or malformed input yields the
    /// degraded `text/plain` default with [`MediaType::error_message`] set.
    pub fn parse(raw: Option<&str>) -> Self {
        let original = raw.unwrap_or_default();
        let trimmed = original.trim();
        match parse_media_type(trimmed) {
            Ok((_, parsed)) => Self::from_parts(
                original.to_string(),
                parsed.media_type,
                parsed.subtype,
                parsed.params,
                None,
            ),
            Err(e) => {
                let message = match raw {
                    None => "Content type is not present".to_string(),
                    Some(_) => describe_error(trimmed, e),
                };
                debug!(content_type = %original, %message, "degraded unparsable content type");
                Self::from_parts(
                    original.to_string(),
                    DEFAULT_MEDIA_TYPE.to_string(),
                    DEFAULT_SUBTYPE.to_string(),
                    Vec::new(),
                    Some(message),
                )
            }
        }
    }

    fn from_parts(
        original_string: String,
        media_type: String,
        subtype: String,
        params: Vec<(String, String)>,
        error: Option<String>,
    ) -> Self {
        let (subtype_base, subtype_format) = match subtype.split_once('+') {
            Some((base, format)) => (base.to_string(), Some(format.to_string())),
            None => (subtype.clone(), None),
        };
        let charset = params
            .iter()
            .rev()
            .find(|(name, _)| name == "charset")
            .map(|(_, value)| value.clone())
            .or_else(|| default_charset(&media_type, &subtype_base, subtype_format.as_deref()));
        let canonical_string = params.iter().fold(
            format!("{}/{}", media_type, subtype),
            |mut acc, (name, value)| {
                acc.push_str("; ");
                acc.push_str(name);
                acc.push('=');
                acc.push_str(&maybe_quote(value));
                acc
            },
        );
        Self {
            media_type,
            subtype,
            subtype_base,
            subtype_format,
            params,
            charset,
            original_string,
            canonical_string,
            error,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Full subtype including any `+format` suffix.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn subtype_base(&self) -> &str {
        &self.subtype_base
    }

    pub fn subtype_format(&self) -> Option<&str> {
        self.subtype_format.as_deref()
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Last value of the named parameter. Lookup is case-insensitive.
    pub fn param(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.params
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn original_string(&self) -> &str {
        &self.original_string
    }

    pub fn canonical_string(&self) -> &str {
        &self.canonical_string
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// `application/json`, `text/json`, `application/foo+json` and friends.
    pub fn is_json(&self) -> bool {
        self.subtype_base == "json" || self.subtype_format.as_deref() == Some("json")
    }

    /// `text/*` or `application/octet-stream`.
    pub fn is_text(&self) -> bool {
        self.media_type == "text"
            || (self.media_type == "application" && self.subtype == "octet-stream")
    }

    /// `application/cloudevents[+fmt]` or `application/cloudevents-batch[+fmt]`.
    pub fn is_cloudevents(&self) -> bool {
        self.media_type == "application"
            && (self.subtype_base == "cloudevents" || self.subtype_base == "cloudevents-batch")
    }

    pub fn is_cloudevents_batch(&self) -> bool {
        self.media_type == "application" && self.subtype_base == "cloudevents-batch"
    }
}

fn default_charset(media_type: &str, subtype_base: &str, subtype_format: Option<&str>) -> Option<String> {
    if media_type == "text" && subtype_base == "plain" {
        Some(DEFAULT_CHARSET.to_string())
    } else if media_type == "text" || subtype_base == "json" || subtype_format == Some("json") {
        Some("utf-8".to_string())
    } else {
        None
    }
}

fn maybe_quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_token_char) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

impl Default for MediaType {
    fn default() -> Self {
        Self::from_parts(
            format!("{}/{}", DEFAULT_MEDIA_TYPE, DEFAULT_SUBTYPE),
            DEFAULT_MEDIA_TYPE.to_string(),
            DEFAULT_SUBTYPE.to_string(),
            Vec::new(),
            None,
        )
    }
}

impl From<&str> for MediaType {
    fn from(raw: &str) -> Self {
        Self::parse(Some(raw))
    }
}

impl From<String> for MediaType {
    fn from(raw: String) -> Self {
        Self::parse(Some(&raw))
    }
}

/// Prints the header value exactly as it was received.
impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.original_string)
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_string == other.canonical_string && self.error == other.error
    }
}

impl Eq for MediaType {}

impl Hash for MediaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_string.hash(state);
    }
}
