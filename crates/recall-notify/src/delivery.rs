use std::future::Future;
use std::time::Duration;

use reqwest::{StatusCode, header};

use recall_db::models::SubscriptionRow;
use recall_push::ece::{self, SubscriptionKeys};
use recall_push::vapid::VapidSigner;
use recall_types::push::NotificationPayload;

use crate::config::PushConfig;

/// What happened to one (subscription, payload) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The push service says this endpoint will never accept messages again.
    EndpointGone,
    /// Anything else. Not retried within the run.
    TransientError(String),
}

/// Sends one notification to one device.
///
/// Implementations report every failure through `DeliveryOutcome`; a batch
/// relies on a single bad endpoint never aborting the others.
pub trait PushTransport: Send + Sync {
    fn deliver(
        &self,
        subscription: &SubscriptionRow,
        payload: &NotificationPayload,
    ) -> impl Future<Output = DeliveryOutcome> + Send;
}

/// Web Push over HTTPS: aes128gcm body, VAPID authorization.
pub struct WebPushTransport {
    client: reqwest::Client,
    signer: VapidSigner,
    ttl: Duration,
    timeout: Duration,
}

impl WebPushTransport {
    /// Fails if the VAPID keys do not parse or do not form a pair.
    pub fn new(config: &PushConfig) -> anyhow::Result<Self> {
        let signer = VapidSigner::from_base64(
            &config.vapid_private_key,
            &config.vapid_public_key,
            &config.vapid_subject,
        )?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            signer,
            ttl: config.ttl,
            timeout: config.timeout,
        })
    }

    pub fn public_key(&self) -> &str {
        self.signer.public_key()
    }

    async fn send(&self, subscription: &SubscriptionRow, body: &[u8]) -> DeliveryOutcome {
        let keys = match SubscriptionKeys::from_base64(&subscription.p256dh_key, &subscription.auth_key) {
            Ok(keys) => keys,
            Err(e) => return DeliveryOutcome::TransientError(format!("unusable subscription keys: {}", e)),
        };

        let encrypted = match ece::encrypt(&keys, body) {
            Ok(encrypted) => encrypted,
            Err(e) => return DeliveryOutcome::TransientError(format!("encryption failed: {}", e)),
        };

        let authorization = match self.signer.authorization(&subscription.endpoint) {
            Ok(value) => value,
            Err(e) => return DeliveryOutcome::TransientError(format!("VAPID signing failed: {}", e)),
        };

        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl.as_secs().to_string())
            .header("Urgency", "normal")
            .header(header::CONTENT_ENCODING, "aes128gcm")
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::AUTHORIZATION, authorization)
            .body(encrypted)
            .send()
            .await;

        match response {
            Ok(response) => classify_status(response.status()),
            Err(e) if e.is_timeout() => {
                DeliveryOutcome::TransientError(format!("push service timed out after {:?}", self.timeout))
            }
            Err(e) => DeliveryOutcome::TransientError(format!("push request failed: {}", e)),
        }
    }
}

impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        subscription: &SubscriptionRow,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::TransientError(format!("payload serialization failed: {}", e)),
        };

        // reqwest's own timeout covers the HTTP exchange; this also bounds
        // connection setup and anything else that could hang.
        match tokio::time::timeout(self.timeout, self.send(subscription, &body)).await {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::TransientError(format!("delivery timed out after {:?}", self.timeout)),
        }
    }
}

/// Map a push service response onto an outcome. Only 410 Gone is permanent.
pub fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Delivered
    } else if status == StatusCode::GONE {
        DeliveryOutcome::EndpointGone
    } else {
        DeliveryOutcome::TransientError(format!("push service responded {}", status))
    }
}
