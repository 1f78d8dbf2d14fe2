//! The port-keyed topic registry.
//!
//! Built once from the loaded configuration, validated as a whole, then
//! shared read-only across every listener and dispatch task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{ConfigError, Topic};

/// Immutable lookup table from listener port to topic.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    topics: Vec<Arc<Topic>>,
    by_port: HashMap<u16, Arc<Topic>>,
}

impl TopicRegistry {
    /// Validates the loaded topics and builds the registry.
    ///
    /// Enforces the cross-topic invariants (unique topic names, unique
    /// ports, globally unique subscriber names) on top of each topic's own
    /// validation, and arms every webhook subscriber's validation window
    /// relative to `now`. Any violation aborts startup before a port binds.
    pub fn new(topics: Vec<Topic>, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        let mut subscriber_names = HashSet::new();

        for topic in &topics {
            topic.validate()?;
            if !names.insert(topic.name.clone()) {
                return Err(ConfigError::DuplicateTopicName(topic.name.clone()));
            }
            if !ports.insert(topic.port) {
                return Err(ConfigError::DuplicateTopicPort(topic.port));
            }
            for name in topic.subscriber_names() {
                if !subscriber_names.insert(name.to_string()) {
                    return Err(ConfigError::DuplicateSubscriberName(name.to_string()));
                }
            }
        }

        for topic in &topics {
            for subscriber in &topic.webhook_subscribers {
                subscriber.validation.arm(now);
            }
        }

        let topics: Vec<Arc<Topic>> = topics.into_iter().map(Arc::new).collect();
        let by_port = topics.iter().map(|t| (t.port, Arc::clone(t))).collect();

        Ok(Self { topics, by_port })
    }

    /// Resolves the topic bound to `port`.
    pub fn resolve(&self, port: u16) -> Option<Arc<Topic>> {
        self.by_port.get(&port).cloned()
    }

    /// All topics, in configuration order.
    pub fn topics(&self) -> &[Arc<Topic>] {
        &self.topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SchemaKind, ValidationState, WebhookSubscriber};

    fn topic(name: &str, port: u16) -> Topic {
        Topic {
            name: name.to_string(),
            port,
            key: "key".to_string(),
            schema: SchemaKind::EventGrid,
            disabled: false,
            webhook_subscribers: Vec::new(),
            servicebus_subscribers: Vec::new(),
        }
    }

    fn webhook(name: &str) -> WebhookSubscriber {
        WebhookSubscriber {
            name: name.to_string(),
            endpoint: "https://localhost:5050/hook".to_string(),
            disabled: false,
            disable_validation_handshake: false,
            filter: None,
            validation: Default::default(),
        }
    }

    #[test]
    fn resolves_topics_by_port() {
        let registry =
            TopicRegistry::new(vec![topic("a", 60101), topic("b", 60102)], Utc::now()).unwrap();
        assert_eq!(registry.resolve(60101).unwrap().name, "a");
        assert_eq!(registry.resolve(60102).unwrap().name, "b");
        assert!(registry.resolve(60103).is_none());
    }

    #[test]
    fn duplicate_topic_name_fails() {
        let err = TopicRegistry::new(vec![topic("a", 60101), topic("a", 60102)], Utc::now())
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTopicName(_)));
    }

    #[test]
    fn duplicate_port_fails() {
        let err = TopicRegistry::new(vec![topic("a", 60101), topic("b", 60101)], Utc::now())
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTopicPort(60101)));
    }

    #[test]
    fn duplicate_subscriber_name_across_topics_fails() {
        let mut a = topic("a", 60101);
        a.webhook_subscribers.push(webhook("shared"));
        let mut b = topic("b", 60102);
        b.webhook_subscribers.push(webhook("shared"));

        let err = TopicRegistry::new(vec![a, b], Utc::now()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSubscriberName(_)));
    }

    #[test]
    fn building_the_registry_arms_validation_windows() {
        let mut a = topic("a", 60101);
        a.webhook_subscribers.push(webhook("hook"));

        let now = Utc::now();
        let registry = TopicRegistry::new(vec![a], now).unwrap();
        let sub = &registry.resolve(60101).unwrap().webhook_subscribers[0];
        assert_eq!(sub.validation.state(), ValidationState::Unvalidated);
        assert!(sub.validation.deadline().unwrap() > now);
    }
}
