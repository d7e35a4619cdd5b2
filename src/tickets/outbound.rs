use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

/// Failure to hand a reply to the customer's messaging channel. Never fatal
/// to the owning `reply` transition; surfaced as a warning instead.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("gateway rejected message: {0}")]
    Rejected(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Outbound side of the messaging channel. Fire-and-forget-with-status: the
/// engine never blocks a ticket-state commit on the result.
#[async_trait]
pub trait OutboundGateway: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError>;
}

/// WhatsApp Cloud API gateway. Posts a text message to the Graph API
/// `/{phone_number_id}/messages` endpoint with a bearer token.
pub struct WhatsAppCloudGateway {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl WhatsAppCloudGateway {
    pub fn new(api_base: &str, phone_number_id: &str, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/{}/messages", api_base.trim_end_matches('/'), phone_number_id),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl OutboundGateway for WhatsAppCloudGateway {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": channel_id,
            "type": "text",
            "text": { "body": text },
        });

        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if res.status().is_success() {
            Ok(())
        } else {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected(format!("{}: {}", status, detail)))
        }
    }
}

/// Stand-in used when no WhatsApp credentials are configured. Reports
/// success so local runs exercise the full reply path.
pub struct NoopGateway;

#[async_trait]
impl OutboundGateway for NoopGateway {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        tracing::debug!(%channel_id, len = text.len(), "outbound gateway disabled; dropping message");
        Ok(())
    }
}
