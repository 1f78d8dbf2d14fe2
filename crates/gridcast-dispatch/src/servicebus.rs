//! Service-Bus REST delivery transport.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use gridcast_events::{Event, EventFields};
use gridcast_types::{MappingKind, ServiceBusSubscriber, RESERVED_BROKER_PROPERTIES};
use serde::Serialize;
use serde_json::Value;

use crate::{headers, DispatchError, NOTIFICATION_EVENT_TYPE};

/// Per-call delivery timeout, matching the `timeout=60` the broker is asked
/// to honor on its side.
const SERVICE_BUS_TIMEOUT: Duration = Duration::from_secs(60);

const SERVICE_BUS_CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";

/// One outbound broker message.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceBusMessage {
    /// The event serialized without any envelope wrapper.
    #[serde(rename = "Body")]
    pub body: String,

    #[serde(rename = "BrokerProperties")]
    pub broker_properties: BTreeMap<String, Value>,

    #[serde(rename = "UserProperties")]
    pub user_properties: BTreeMap<String, Value>,
}

/// Builds the broker message for one event.
///
/// Configured property mappings resolve either to a literal (`Static`) or a
/// dotted-path lookup into the event (`Dynamic`); mappings that resolve to
/// nothing are skipped. Names matching one of the nine reserved
/// broker-property names land in `BrokerProperties`, everything else in
/// `UserProperties`. `SessionId` and `MessageId` are mutually exclusive;
/// absent both, `MessageId` defaults to the event id. The fixed `aeg-*`
/// delivery properties always overwrite whatever the mappings produced.
pub fn build_message(
    subscriber: &ServiceBusSubscriber,
    event: &Event,
) -> Result<ServiceBusMessage, serde_json::Error> {
    let mut broker_properties = BTreeMap::new();
    let mut user_properties = BTreeMap::new();

    for (name, mapping) in &subscriber.properties {
        let resolved = match mapping.kind {
            MappingKind::Static => Some(Value::String(mapping.value.clone())),
            MappingKind::Dynamic => event.lookup(&mapping.value),
        };
        let Some(value) = resolved else { continue };
        if value.is_null() {
            continue;
        }
        if RESERVED_BROKER_PROPERTIES.contains(&name.as_str()) {
            broker_properties.insert(name.clone(), value);
        } else {
            user_properties.insert(name.clone(), value);
        }
    }

    if broker_properties.contains_key("SessionId") {
        broker_properties.remove("MessageId");
    } else if !broker_properties.contains_key("MessageId") {
        broker_properties.insert(
            "MessageId".to_string(),
            Value::String(event.id().to_string()),
        );
    }

    user_properties.insert(
        headers::EVENT_TYPE.to_string(),
        Value::String(NOTIFICATION_EVENT_TYPE.to_string()),
    );
    user_properties.insert(
        headers::SUBSCRIPTION_NAME.to_string(),
        Value::String(subscriber.name.to_uppercase()),
    );
    user_properties.insert(
        headers::DATA_VERSION.to_string(),
        Value::String(event.data_version().unwrap_or("").to_string()),
    );
    user_properties.insert(
        headers::METADATA_VERSION.to_string(),
        Value::String("1".to_string()),
    );
    user_properties.insert(
        headers::DELIVERY_COUNT.to_string(),
        Value::String("0".to_string()),
    );

    Ok(ServiceBusMessage {
        body: serde_json::to_string(event)?,
        broker_properties,
        user_properties,
    })
}

#[derive(Clone)]
pub(crate) struct ServiceBusSender {
    client: reqwest::Client,
}

impl ServiceBusSender {
    pub(crate) fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(SERVICE_BUS_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Signs a SAS token for the namespace topic and POSTs a one-element
    /// message array to its `/messages` endpoint.
    pub(crate) async fn deliver(
        &self,
        subscriber: &ServiceBusSubscriber,
        event: &Event,
    ) -> Result<(), DispatchError> {
        let message = build_message(subscriber, event)?;

        let host = format!("{}.servicebus.windows.net", subscriber.namespace);
        let resource = format!("https://{host}/{}", subscriber.topic);
        let token = gridcast_auth::service_bus_sas(
            &resource,
            &subscriber.shared_access_key_name,
            &subscriber.shared_access_key,
            Utc::now(),
        );

        let response = self
            .client
            .post(format!("{resource}/messages?timeout=60"))
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::HOST, host)
            .header(reqwest::header::CONTENT_TYPE, SERVICE_BUS_CONTENT_TYPE)
            .json(&[message])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchError::Status(response.status()));
        }
        Ok(())
    }
}
