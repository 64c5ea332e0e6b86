use std::sync::Arc;

use cloudevents_bindings::{
    event::{AttributeValue, EncodedData, Event, EventEnvelope, OpaqueEvent},
    format::FormatOptions,
    kafka_binding::{KafkaBinding, KafkaMessage, KeyMapper, KeyMapping, ReverseKeyMapper},
    media_type::MediaType,
    ErrorKind,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn binding() -> &'static KafkaBinding {
    KafkaBinding::default_binding()
}

fn event(extra: Vec<(&str, AttributeValue)>) -> Event {
    let mut attrs = vec![
        ("id", AttributeValue::from("evt-1")),
        ("source", "/inventory".into()),
        ("type", "com.example.stock".into()),
    ];
    attrs.extend(extra);
    Event::create("1.0", attrs).unwrap()
}

fn binary_headers() -> KafkaMessage {
    KafkaMessage::new()
        .with_header("ce_specversion", "1.0")
        .with_header("ce_id", "evt-1")
        .with_header("ce_source", "/inventory")
        .with_header("ce_type", "com.example.stock")
}

#[test]
fn test_structured_round_trip() {
    let original = event(vec![
        ("partitionkey", "p1".into()),
        ("datacontenttype", "application/json".into()),
        ("data", json!({"sku": "A-1", "count": 4}).into()),
    ]);
    let message = binding()
        .encode(&EventEnvelope::Event(original.clone()), true)
        .unwrap();
    assert_eq!(message.key.as_deref(), Some("p1"));
    assert_eq!(
        message.content_type(),
        Some("application/cloudevents+json; charset=utf-8")
    );
    assert_eq!(message.header("ce_id"), None);
    assert_eq!(
        binding().decode(&message, false).unwrap(),
        EventEnvelope::Event(original)
    );
}

#[test]
fn test_binary_round_trip() {
    let original = event(vec![
        ("partitionkey", "p1".into()),
        ("subject", "raw value with spaces".into()),
        ("datacontenttype", "application/json".into()),
        ("data", json!({"sku": "A-1"}).into()),
    ]);
    let message = binding()
        .encode(&EventEnvelope::Event(original.clone()), false)
        .unwrap();
    assert_eq!(message.key.as_deref(), Some("p1"));
    assert_eq!(message.header("ce_specversion"), Some("1.0"));
    assert_eq!(message.header("ce_subject"), Some("raw value with spaces"));
    assert_eq!(message.header("ce_partitionkey"), Some("p1"));
    assert_eq!(message.content_type(), Some("application/json"));
    assert_eq!(message.value, Some(EncodedData::from(r#"{"sku":"A-1"}"#)));
    assert_eq!(
        binding().decode(&message, false).unwrap(),
        EventEnvelope::Event(original)
    );
}

#[test]
fn test_binary_text_payload() {
    let message = binary_headers()
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_value("Hello");
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert_eq!(event.data(), Some(&json!("Hello")));
    assert_eq!(event.data_encoded(), Some(&EncodedData::from("Hello")));
}

#[test]
fn test_blank_content_type_header() {
    let message = binary_headers()
        .with_header("content-type", "")
        .with_value("hello");
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert_eq!(event.data_content_type(), None);
    assert_eq!(event.attribute("datacontenttype"), None);

    let keyed = binding()
        .decode(&message.clone().with_key("k1"), false)
        .unwrap()
        .into_event()
        .unwrap();
    assert_eq!(keyed.attribute("partitionkey"), Some("k1"));
    assert_eq!(keyed.data(), Some(&json!("hello")));
}

#[test]
fn test_tombstone_has_no_data() {
    let message = binary_headers();
    assert!(message.is_tombstone());
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert!(!event.has_data());
    assert_eq!(event.data(), None);
    assert_eq!(event.id(), "evt-1");

    let encoded = binding()
        .encode(&EventEnvelope::Event(event), false)
        .unwrap();
    assert!(encoded.is_tombstone());
    assert_eq!(encoded.content_type(), None);
}

#[test]
fn test_empty_value_is_not_tombstone() {
    let message = binary_headers()
        .with_header("content-type", "text/plain")
        .with_value("");
    assert!(!message.is_tombstone());
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert!(event.has_data());
}

#[test]
fn test_batch_content_type_rejected() {
    let message = KafkaMessage::new()
        .with_header("content-type", "application/cloudevents-batch+json")
        .with_value("[]");
    let err = binding().decode(&message, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BatchNotSupported);

    let err = binding()
        .encode(&EventEnvelope::Batch(vec![event(vec![])]), true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BatchNotSupported);

    let opaque_batch = OpaqueEvent::new(
        EncodedData::from("[]"),
        Some(MediaType::from("application/cloudevents-batch+xml")),
        None,
    );
    let err = binding()
        .encode(&EventEnvelope::Opaque(opaque_batch), true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BatchNotSupported);
}

#[test]
fn test_key_restores_partition_key() {
    let message = binary_headers().with_key("k9");
    let event = binding().decode(&message, false).unwrap().into_event().unwrap();
    assert_eq!(event.attribute("partitionkey"), Some("k9"));

    let event = binding()
        .decode_with(&message, false, &KeyMapping::Disabled)
        .unwrap()
        .into_event()
        .unwrap();
    assert_eq!(event.attribute("partitionkey"), None);

    let custom: ReverseKeyMapper = Arc::new(|key: Option<&str>| {
        vec![(
            "tenant".to_string(),
            AttributeValue::from(key.unwrap_or("none").to_uppercase()),
        )]
    });
    let event = binding()
        .decode_with(&message, false, &KeyMapping::Custom(custom))
        .unwrap()
        .into_event()
        .unwrap();
    assert_eq!(event.attribute("tenant"), Some("K9"));
    assert_eq!(event.attribute("partitionkey"), None);
}

#[test]
fn test_missing_key_adds_nothing() {
    let event = binding()
        .decode(&binary_headers(), false)
        .unwrap()
        .into_event()
        .unwrap();
    assert_eq!(event.attribute("partitionkey"), None);
}

#[test]
fn test_custom_key_mapper() {
    let original = event(vec![("partitionkey", "p1".into())]);
    let by_source: KeyMapper = Arc::new(|event: &Event| Some(event.source().to_string()));
    let message = binding()
        .encode_with(
            &EventEnvelope::Event(original.clone()),
            None,
            &KeyMapping::Custom(by_source),
            &FormatOptions::default(),
        )
        .unwrap();
    assert_eq!(message.key.as_deref(), Some("/inventory"));

    let message = binding()
        .encode_with(
            &EventEnvelope::Event(original),
            None,
            &KeyMapping::Disabled,
            &FormatOptions::default(),
        )
        .unwrap();
    assert_eq!(message.key, None);
}

#[test]
fn test_binding_level_mappers() {
    let mut binding = KafkaBinding::with_defaults();
    binding.set_key_mapper(None);
    binding.set_reverse_key_mapper(None);
    let original = event(vec![("partitionkey", "p1".into())]);
    let message = binding
        .encode(&EventEnvelope::Event(original), false)
        .unwrap();
    assert_eq!(message.key, None);

    let decoded = binding
        .decode(&binary_headers().with_key("k9"), false)
        .unwrap()
        .into_event()
        .unwrap();
    assert_eq!(decoded.attribute("partitionkey"), None);
}

#[test]
fn test_structured_spec_version_mismatch() {
    let message = KafkaMessage::new()
        .with_header("content-type", "application/cloudevents+json")
        .with_value(r#"{"specversion":"2.0","id":"x","source":"/s","type":"t"}"#);
    let err = binding().decode(&message, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SpecVersion);
}

#[test]
fn test_not_an_event() {
    let message = KafkaMessage::new()
        .with_header("content-type", "application/json")
        .with_value("{}");
    let err = binding().decode(&message, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotCloudEvent);
    assert!(!binding().probable_event(&message));
    assert!(binding().probable_event(&binary_headers()));
}

#[test]
fn test_opaque_passes_through() {
    let message = KafkaMessage::new()
        .with_header("content-type", "application/cloudevents+avro")
        .with_value(vec![0u8, 1, 2]);
    let envelope = binding().decode(&message, true).unwrap();
    assert!(matches!(envelope, EventEnvelope::Opaque(_)));
    let encoded = binding().encode(&envelope, true).unwrap();
    assert_eq!(encoded.value, Some(EncodedData::Binary(vec![0, 1, 2])));
    assert_eq!(encoded.content_type(), Some("application/cloudevents+avro"));
}
