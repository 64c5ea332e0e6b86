use super::EncodedData;
use crate::media_type::MediaType;

/// Structured content that looked like a CloudEvent but could not be decoded
/// by any registered format. It is kept verbatim so it can be forwarded.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueEvent {
    content: EncodedData,
    content_type: Option<MediaType>,
    batch: bool,
}

impl OpaqueEvent {
    /// `batch` defaults to what the content type says when not given.
    pub fn new(content: EncodedData, content_type: Option<MediaType>, batch: Option<bool>) -> Self {
        let batch = batch.unwrap_or_else(|| {
            content_type
                .as_ref()
                .map(MediaType::is_cloudevents_batch)
                .unwrap_or(false)
        });
        Self {
            content,
            content_type,
            batch,
        }
    }

    pub fn content(&self) -> &EncodedData {
        &self.content
    }

    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    pub fn is_batch(&self) -> bool {
        self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_inferred_from_content_type() {
        let opaque = OpaqueEvent::new(
            EncodedData::from("<events/>"),
            Some(MediaType::from("application/cloudevents-batch+xml")),
            None,
        );
        assert!(opaque.is_batch());
        let opaque = OpaqueEvent::new(EncodedData::from("x"), None, None);
        assert!(!opaque.is_batch());
        let opaque = OpaqueEvent::new(EncodedData::from("x"), None, Some(true));
        assert!(opaque.is_batch());
    }
}
