//! Configuration validation errors.

/// Errors raised while validating the loaded topic configuration.
///
/// All of these are fatal at startup: the server refuses to bind any port
/// until the whole configuration document passes validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Two topics share the same name.
    #[error("duplicate topic name '{0}'")]
    DuplicateTopicName(String),

    /// Two topics share the same port.
    #[error("duplicate topic port {0}")]
    DuplicateTopicPort(u16),

    /// Two subscribers (across any topics) share the same name.
    #[error("duplicate subscriber name '{0}'")]
    DuplicateSubscriberName(String),

    /// A topic name contains characters outside letters, digits and dashes.
    #[error("invalid topic name '{0}': only letters, digits and dashes are allowed")]
    InvalidTopicName(String),

    /// A subscriber name contains characters outside letters, digits and dashes.
    #[error("invalid subscriber name '{0}': only letters, digits and dashes are allowed")]
    InvalidSubscriberName(String),

    /// A webhook subscriber has no endpoint URL.
    #[error("webhook subscriber '{0}' has an empty endpoint URL")]
    MissingEndpoint(String),

    /// A Service-Bus namespace fails the DNS-label shape check.
    #[error("invalid service bus namespace '{0}': expected 6-50 letters, digits or dashes starting with a letter")]
    InvalidNamespace(String),

    /// A Service-Bus topic name fails the shape check.
    #[error("invalid service bus topic '{0}': expected 3-63 lowercase letters, digits or dashes")]
    InvalidServiceBusTopic(String),

    /// A Service-Bus shared access key is not valid base64.
    #[error("shared access key for subscriber '{0}' is not valid base64")]
    InvalidSharedAccessKey(String),

    /// A Service-Bus property mapping violates a broker constraint.
    #[error("invalid property mapping on subscriber '{subscriber}': {message}")]
    InvalidPropertyMapping { subscriber: String, message: String },

    /// A subscriber filter violates a load-time filter rule.
    #[error("invalid filter on subscriber '{subscriber}': {message}")]
    InvalidFilter { subscriber: String, message: String },
}
