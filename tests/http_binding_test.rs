use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use cloudevents_bindings::{
    event::{AttributeValue, EncodedData, Event, EventEnvelope},
    format::{Format, FormatCapabilities, FormatCapability, FormatOptions, MultiFormat, Outcome},
    http_binding::{percent_decode, percent_encode, HttpBinding, HttpMessage},
    media_type::MediaType,
    BindingConfig, ErrorKind,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn binding() -> &'static HttpBinding {
    HttpBinding::default_binding()
}

fn event(version: &str, extra: Vec<(&str, AttributeValue)>) -> Event {
    let mut attrs = vec![
        ("id", AttributeValue::from("1234")),
        ("source", "https://example.com/orders".into()),
        ("type", "com.example.created".into()),
    ];
    attrs.extend(extra);
    Event::create(version, attrs).unwrap()
}

fn structured_post(content_type: &str, body: &str) -> HttpMessage {
    HttpMessage::new()
        .with_method("POST")
        .with_header("Content-Type", content_type)
        .with_body(body)
}

#[test]
fn test_binary_text_round_trip() {
    let original = event(
        "1.0",
        vec![
            ("subject", "Hi! 😀".into()),
            ("comexample", "ext value".into()),
            ("datacontenttype", "text/plain; charset=utf-8".into()),
            ("data", json!("Hello").into()),
        ],
    );
    let message = binding()
        .encode(&EventEnvelope::Event(original.clone()), false)
        .unwrap();

    assert_eq!(message.header("CE-specversion"), Some("1.0"));
    assert_eq!(message.header("CE-subject"), Some("Hi!%20%F0%9F%98%80"));
    assert_eq!(message.header("CE-comexample"), Some("ext%20value"));
    assert_eq!(message.header("CE-source"), Some("https://example.com/orders"));
    assert_eq!(message.header("CE-datacontenttype"), None);
    assert_eq!(message.content_type(), Some("text/plain; charset=utf-8"));
    assert_eq!(message.body_text().as_deref(), Some("Hello"));

    let decoded = binding().decode(&message, false).unwrap();
    assert_eq!(decoded, EventEnvelope::Event(original));
}

#[test]
fn test_binary_decode_fixture() {
    let message = HttpMessage::new()
        .with_method("POST")
        .with_header("CE-SpecVersion", "1.0")
        .with_header("CE-ID", "abc")
        .with_header("CE-Source", "/mycontext")
        .with_header("CE-Type", "com.example.someevent")
        .with_header("CE-Subject", "\"quoted%20value\"")
        .with_header("CE-Time", "2020-05-06T07:08:09Z")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"count": 3}"#);
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();

    assert_eq!(event.id(), "abc");
    assert_eq!(event.source(), "/mycontext");
    assert_eq!(event.subject(), Some("quoted value"));
    assert_eq!(event.time().unwrap().timestamp(), 1_588_748_889);
    assert_eq!(event.data(), Some(&json!({"count": 3})));
    assert_eq!(
        event.data_encoded(),
        Some(&EncodedData::from(r#"{"count": 3}"#))
    );
    assert!(event.data_content_type().unwrap().is_json());
}

#[test]
fn test_binary_json_round_trip() {
    let original = event(
        "1.0",
        vec![
            ("datacontenttype", "application/json".into()),
            ("data", json!({"items": [1, 2, 3]}).into()),
        ],
    );
    let message = binding()
        .encode(&EventEnvelope::Event(original.clone()), false)
        .unwrap();
    assert_eq!(message.body_text().as_deref(), Some(r#"{"items":[1,2,3]}"#));
    assert_eq!(
        binding().decode(&message, false).unwrap(),
        EventEnvelope::Event(original)
    );
}

#[test]
fn test_binary_without_data_has_no_body() {
    let original = event("1.0", vec![]);
    let message = binding()
        .encode(&EventEnvelope::Event(original.clone()), false)
        .unwrap();
    assert_eq!(message.body, None);
    assert_eq!(message.content_type(), None);
    let decoded = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert!(!decoded.has_data());
    assert_eq!(decoded, original);
}

#[test]
fn test_empty_body_is_empty_payload() {
    let message = HttpMessage::new()
        .with_method("POST")
        .with_header("ce-specversion", "1.0")
        .with_header("ce-id", "1")
        .with_header("ce-source", "/s")
        .with_header("ce-type", "t")
        .with_header("content-type", "text/plain")
        .with_body(Vec::new());
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert!(event.has_data());
    assert_eq!(event.data(), Some(&json!("")));
    assert_eq!(event.data_encoded(), Some(&EncodedData::from("")));
}

#[test]
fn test_binary_legacy_round_trip() {
    let original = event(
        "0.3",
        vec![
            ("datacontenttype", "text/plain".into()),
            ("data", json!("hello").into()),
            ("schemaurl", "https://example.com/schema".into()),
        ],
    );
    let message = binding()
        .encode(&EventEnvelope::Event(original.clone()), false)
        .unwrap();
    assert_eq!(message.header("CE-schemaurl"), Some("https://example.com/schema"));
    assert_eq!(message.body_text().as_deref(), Some("hello"));
    assert_eq!(
        binding().decode(&message, false).unwrap(),
        EventEnvelope::Event(original)
    );
}

#[test]
fn test_blank_content_type_header() {
    let message = HttpMessage::new()
        .with_method("POST")
        .with_header("ce-specversion", "1.0")
        .with_header("ce-id", "1")
        .with_header("ce-source", "/s")
        .with_header("ce-type", "t")
        .with_header("Content-Type", "")
        .with_body("hello");
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert_eq!(event.data_content_type(), None);
    assert_eq!(event.attribute("datacontenttype"), None);
    assert_eq!(event.data(), Some(&json!("hello")));

    let changed = event.with([("subject", "s")]).unwrap();
    assert_eq!(changed.subject(), Some("s"));
    assert_eq!(changed.data(), Some(&json!("hello")));
}

#[test]
fn test_legacy_binary_payload_kept_exactly() {
    let body = vec![0xffu8, 0x00, 0x41];
    let message = HttpMessage::new()
        .with_method("POST")
        .with_header("ce-specversion", "0.3")
        .with_header("ce-id", "1")
        .with_header("ce-source", "/s")
        .with_header("ce-type", "t")
        .with_header("Content-Type", "application/octet-stream")
        .with_body(body.clone());
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert_eq!(event.spec_version(), "0.3");
    assert_eq!(event.data_encoded(), Some(&EncodedData::Binary(body.clone())));

    let encoded = binding()
        .encode(&EventEnvelope::Event(event), false)
        .unwrap();
    assert_eq!(encoded.body, Some(body));
    assert_eq!(encoded.content_type(), Some("application/octet-stream"));
}

#[test]
fn test_structured_decode_fixture() {
    let message = structured_post(
        "application/cloudevents+json",
        r#"{"specversion":"1.0","id":"x","source":"/s","type":"t"}"#,
    );
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert_eq!(event.id(), "x");
    assert_eq!(event.source(), "/s");
    assert_eq!(event.event_type(), "t");
    assert_eq!(event.data(), None);
    assert!(!event.has_data());
}

#[test]
fn test_structured_round_trip_sorted() {
    let original = event(
        "1.0",
        vec![
            ("datacontenttype", "application/json".into()),
            ("data", json!({"b": 2, "a": 1}).into()),
        ],
    );
    let message = binding()
        .encode_with(
            &EventEnvelope::Event(original.clone()),
            Some("json"),
            &FormatOptions::sorted(),
        )
        .unwrap();
    assert_eq!(
        message.content_type(),
        Some("application/cloudevents+json; charset=utf-8")
    );
    assert_eq!(
        message.body_text().unwrap(),
        r#"{"data":{"a":1,"b":2},"datacontenttype":"application/json","id":"1234","source":"https://example.com/orders","specversion":"1.0","type":"com.example.created"}"#
    );
    assert_eq!(
        binding().decode(&message, false).unwrap(),
        EventEnvelope::Event(original)
    );
}

#[test]
fn test_batch_round_trip() {
    let batch = vec![
        event("1.0", vec![("subject", "first".into())]),
        event("0.3", vec![("subject", "second".into())]),
    ];
    let message = binding()
        .encode(&EventEnvelope::Batch(batch.clone()), true)
        .unwrap();
    assert_eq!(
        message.content_type(),
        Some("application/cloudevents-batch+json; charset=utf-8")
    );
    assert_eq!(
        binding().decode(&message, false).unwrap(),
        EventEnvelope::Batch(batch)
    );
}

#[test]
fn test_batch_requires_structured_mode() {
    let err = binding()
        .encode(&EventEnvelope::Batch(vec![event("1.0", vec![])]), false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_unknown_encoder_name() {
    let err = binding()
        .encode_with(
            &EventEnvelope::Event(event("1.0", vec![])),
            Some("avro"),
            &FormatOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_get_and_head_are_not_events() {
    for method in ["GET", "head"] {
        let message = HttpMessage::new()
            .with_method(method)
            .with_header("ce-specversion", "1.0")
            .with_header("ce-id", "1")
            .with_header("ce-source", "/s")
            .with_header("ce-type", "t");
        let err = binding().decode(&message, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotCloudEvent);
    }
}

#[test]
fn test_plain_request_is_not_event() {
    let message = structured_post("application/json", "{}");
    let err = binding().decode(&message, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotCloudEvent);
    assert_eq!(
        err.to_string(),
        "Not a CloudEvent: Content-Type is application/json, and CE-SpecVersion is not present"
    );
}

#[test]
fn test_opaque_content() {
    let message = structured_post("application/cloudevents+xml", "<event/>");
    let err = binding().decode(&message, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

    let envelope = binding().decode(&message, true).unwrap();
    let opaque = match &envelope {
        EventEnvelope::Opaque(opaque) => opaque,
        other => panic!("unexpected {:?}", other),
    };
    assert!(!opaque.is_batch());
    assert_eq!(opaque.content(), &EncodedData::Binary(b"<event/>".to_vec()));

    let encoded = binding().encode(&envelope, false).unwrap();
    assert_eq!(encoded.content_type(), Some("application/cloudevents+xml"));
    assert_eq!(encoded.body, message.body);
}

#[test]
fn test_malformed_structured_content() {
    let message = structured_post("application/cloudevents+json", "{\"specversion\":");
    let err = binding().decode(&message, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatSyntax);
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_probable_event() {
    let b = binding();
    assert!(b.probable_event(&HttpMessage::new().with_header("CE-SpecVersion", "1.0")));
    assert!(b.probable_event(
        &HttpMessage::new().with_header("Content-Type", "application/cloudevents+avro")
    ));
    assert!(b.probable_event(
        &HttpMessage::new().with_header("Content-Type", "application/cloudevents-batch+json")
    ));
    assert!(!b.probable_event(&HttpMessage::new().with_header("Content-Type", "application/json")));
    assert!(!b.probable_event(&HttpMessage::new()));
}

#[test]
fn test_config_defaults_drive_default_calls() {
    let config = BindingConfig::from_str(r#"{"allow_opaque": true, "structured": true}"#).unwrap();
    let binding = HttpBinding::from_config(config);
    let message = structured_post("application/cloudevents+xml", "<event/>");
    assert!(matches!(
        binding.decode_default(&message).unwrap(),
        EventEnvelope::Opaque(_)
    ));
    let encoded = binding
        .encode_default(&EventEnvelope::Event(event("1.0", vec![])))
        .unwrap();
    assert!(MediaType::parse(encoded.content_type()).is_cloudevents());
}

/// Declines every envelope it sees.
struct Declining {
    calls: AtomicUsize,
}

impl Format for Declining {
    fn name(&self) -> &str {
        "declining"
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapability::DecodeEnvelope.into()
    }

    fn decode_envelope(
        &self,
        _content: &EncodedData,
        _content_type: &MediaType,
        _data_decoder: &MultiFormat,
        _options: &FormatOptions,
    ) -> Outcome<EventEnvelope> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Outcome::NotApplicable
    }
}

#[test]
fn test_declining_codec_is_invisible() {
    let messages = [
        structured_post(
            "application/cloudevents+json",
            r#"{"specversion":"1.0","id":"x","source":"/s","type":"t","data":[1]}"#,
        ),
        structured_post("application/cloudevents+xml", "<event/>"),
        structured_post("application/cloudevents+json", "nope"),
    ];
    let plain = HttpBinding::with_defaults();
    let declining = Arc::new(Declining {
        calls: AtomicUsize::new(0),
    });
    let mut extended = HttpBinding::with_defaults();
    extended.register(declining.clone(), None);

    let outcome = |b: &HttpBinding, m: &HttpMessage| {
        b.decode(m, true)
            .map_err(|e| e.kind())
            .map(|e| format!("{:?}", e))
    };
    for message in &messages {
        assert_eq!(outcome(&extended, message), outcome(&plain, message));
    }
    assert_eq!(declining.calls.load(Ordering::SeqCst), messages.len());

    assert!(extended.unregister("declining"));
    for message in &messages {
        assert_eq!(outcome(&extended, message), outcome(&plain, message));
    }
    assert_eq!(declining.calls.load(Ordering::SeqCst), messages.len());
}

proptest! {
    #[test]
    fn prop_percent_encoding_round_trips(value in any::<String>()) {
        let encoded = percent_encode(&value);
        prop_assert!(encoded.bytes().all(|b| (33..=126).contains(&b) && b != b'"'));
        prop_assert_eq!(percent_decode(&encoded), value);
    }
}
