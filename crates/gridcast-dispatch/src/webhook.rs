//! Webhook delivery transport.

use std::time::Duration;

use gridcast_events::{Event, EventFields};
use gridcast_types::WebhookSubscriber;

use crate::{headers, DispatchError, NOTIFICATION_EVENT_TYPE};

/// Per-call delivery timeout; a hung endpoint is abandoned after this.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub(crate) struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub(crate) fn new() -> Result<Self, reqwest::Error> {
        // Local webhook endpoints commonly run with self-signed
        // certificates, so certificate validation is off for this client.
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    /// POSTs the event to the subscriber endpoint as a one-element JSON
    /// array with the delivery header contract.
    pub(crate) async fn deliver(
        &self,
        subscriber: &WebhookSubscriber,
        event: &Event,
    ) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&subscriber.endpoint)
            .header(headers::EVENT_TYPE, NOTIFICATION_EVENT_TYPE)
            .header(headers::SUBSCRIPTION_NAME, subscriber.name.to_uppercase())
            .header(headers::DATA_VERSION, event.data_version().unwrap_or(""))
            .header(headers::METADATA_VERSION, "1")
            .header(headers::DELIVERY_COUNT, "0")
            .json(&[event])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchError::Status(response.status()));
        }
        Ok(())
    }
}
