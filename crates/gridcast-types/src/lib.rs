//! Shared configuration model and error definitions for the gridcast emulator.
//!
//! This crate provides the foundational types used across all gridcast crates:
//! the topic/subscriber configuration model, filter configuration with its
//! load-time validation rules, the per-subscriber webhook validation cell,
//! and the port-keyed topic registry.
//!
//! Everything here is loaded once at startup and treated as immutable for the
//! process lifetime, with one exception: the webhook validation state cell,
//! which is mutated by the subscription handshake and the inbound `/validate`
//! callback and is therefore guarded by its own lock.

mod error;
mod filter;
mod registry;
mod topic;

pub use error::ConfigError;
pub use filter::{
    AdvancedFilter, FilterConfig, FilterOperator, MAX_ADVANCED_FILTERS, MAX_FILTER_STRING_LEN,
    MAX_FILTER_VALUES,
};
pub use registry::TopicRegistry;
pub use topic::{
    MappingKind, PropertyMapping, SchemaKind, ServiceBusSubscriber, Topic, ValidationHandle,
    ValidationState, WebhookSubscriber, RESERVED_BROKER_PROPERTIES, VALIDATION_WINDOW_SECS,
};
