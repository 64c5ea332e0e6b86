//! # CloudEvents Bindings
//!
//! A typed CloudEvents envelope and the protocol bindings that carry it over
//! HTTP and Kafka in binary, structured and batch content modes.
//!
//! ## Layers
//!
//! ### 1. Media Types
//! Every format decision starts from a parsed `Content-Type` header
//! ([`media_type`]). Parsing never fails; garbage degrades to `text/plain`.
//!
//! ### 2. Event Model
//! Immutable events per spec version with validated attributes and a dual
//! encoded/decoded payload ([`event`]).
//!
//! ### 3. Formats
//! Pluggable codecs behind one [`format::Format`] trait, chained by
//! [`format::MultiFormat`] so that a codec can decline and let the next one
//! try. JSON envelopes and payloads come from [`format::JsonCodec`], plain
//! text from [`format::TextCodec`].
//!
//! ### 4. Protocol Bindings
//! - HTTP ([`http_binding`]): `CE-` headers, percent-encoded values, batches.
//! - Kafka ([`kafka_binding`]): `ce_` headers, tombstones, key mapping.
//!
//! ```
//! use cloudevents_bindings::{AttributeValue, Event, EventEnvelope, HttpBinding};
//! use serde_json::json;
//!
//! let event = Event::create(
//!     "1.0",
//!     [
//!         ("id", AttributeValue::from("1234")),
//!         ("source", "/orders".into()),
//!         ("type", "com.example.created".into()),
//!         ("datacontenttype", "application/json".into()),
//!         ("data", json!({"total": 12}).into()),
//!     ],
//! )
//! .unwrap();
//! let binding = HttpBinding::default_binding();
//! let message = binding.encode(&EventEnvelope::Event(event.clone()), true).unwrap();
//! let decoded = binding.decode(&message, false).unwrap();
//! assert_eq!(decoded.into_event(), Some(event));
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod format;
pub mod http_binding;
pub mod kafka_binding;
pub mod media_type;

// Re-exports
pub use config::BindingConfig;
pub use error::*;
pub use event::{AttributeValue, EncodedData, Event, EventEnvelope, EventV0, EventV1, OpaqueEvent};
pub use format::{Format, FormatOptions, JsonCodec, MultiFormat, Outcome, TextCodec};
pub use http_binding::{HttpBinding, HttpMessage};
pub use kafka_binding::{KafkaBinding, KafkaMessage};
pub use media_type::MediaType;
