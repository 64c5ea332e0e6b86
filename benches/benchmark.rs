use cloudevents_bindings::{
    AttributeValue, Event, EventEnvelope, HttpBinding, KafkaBinding, MediaType,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn sample_event() -> EventEnvelope {
    let event = Event::create(
        "1.0",
        [
            ("id", AttributeValue::from("bench-1")),
            ("source", "https://example.com/bench".into()),
            ("type", "com.example.bench".into()),
            ("subject", "Hi! 😀".into()),
            ("partitionkey", "p1".into()),
            ("datacontenttype", "application/json".into()),
            ("data", json!({"items": [1, 2, 3], "name": "bench"}).into()),
        ],
    )
    .expect("valid event");
    EventEnvelope::Event(event)
}

fn bench_media_type(c: &mut Criterion) {
    c.bench_function("media type parse", |b| {
        b.iter(|| {
            MediaType::parse(black_box(Some(
                "application/cloudevents+json (comment); charset=utf-8",
            )))
        })
    });
}

fn bench_http(c: &mut Criterion) {
    let binding = HttpBinding::default_binding();
    let envelope = sample_event();
    let structured = binding.encode(&envelope, true).expect("structured");
    let binary = binding.encode(&envelope, false).expect("binary");

    c.bench_function("http structured encode", |b| {
        b.iter(|| binding.encode(black_box(&envelope), true))
    });
    c.bench_function("http structured decode", |b| {
        b.iter(|| binding.decode(black_box(&structured), false))
    });
    c.bench_function("http binary encode", |b| {
        b.iter(|| binding.encode(black_box(&envelope), false))
    });
    c.bench_function("http binary decode", |b| {
        b.iter(|| binding.decode(black_box(&binary), false))
    });
}

fn bench_kafka(c: &mut Criterion) {
    let binding = KafkaBinding::default_binding();
    let envelope = sample_event();
    let binary = binding.encode(&envelope, false).expect("binary");

    c.bench_function("kafka binary encode", |b| {
        b.iter(|| binding.encode(black_box(&envelope), false))
    });
    c.bench_function("kafka binary decode", |b| {
        b.iter(|| binding.decode(black_box(&binary), false))
    });
}

criterion_group!(benches, bench_media_type, bench_http, bench_kafka);
criterion_main!(benches);
