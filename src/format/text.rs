use serde_json::Value;

use super::{
    DecodedPayload, EncodedContent, Format, FormatCapabilities, FormatCapability, FormatOptions,
    Outcome,
};
use crate::{event::EncodedData, media_type::MediaType};

/// Pass-through payload codec for `text/*` and `application/octet-stream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    pub fn new() -> Self {
        Self
    }
}

fn is_text(content_type: Option<&MediaType>) -> bool {
    content_type.map(MediaType::is_text).unwrap_or(false)
}

impl Format for TextCodec {
    fn name(&self) -> &str {
        "text"
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities::from(vec![
            FormatCapability::DecodePayload,
            FormatCapability::EncodePayload,
        ])
    }

    fn decode_payload(
        &self,
        _spec_version: &str,
        content: &EncodedData,
        content_type: Option<&MediaType>,
        _options: &FormatOptions,
    ) -> Outcome<DecodedPayload> {
        if !is_text(content_type) {
            return Outcome::NotApplicable;
        }
        let text = match content {
            EncodedData::Text(text) => text.clone(),
            // Raw bytes are only text when they decode cleanly.
            EncodedData::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => return Outcome::NotApplicable,
            },
        };
        Outcome::Handled(DecodedPayload {
            data: Value::String(text),
            content_type: content_type.cloned(),
        })
    }

    fn encode_payload(
        &self,
        _spec_version: &str,
        data: &Value,
        content_type: Option<&MediaType>,
        _options: &FormatOptions,
    ) -> Outcome<EncodedContent> {
        if !is_text(content_type) {
            return Outcome::NotApplicable;
        }
        let text = match data {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Outcome::Handled(EncodedContent {
            content: EncodedData::Text(text),
            content_type: content_type.cloned(),
        })
    }
}
