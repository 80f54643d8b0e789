use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{
    clients::MailSender,
    config::Config,
    error::DispatchError,
    models::{
        message::{OutboundMessage, SendReceipt},
        sendgrid::{ErrorResponse, MailSendRequest},
    },
};

pub struct SendGridClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl SendGridClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.sendgrid_timeout_seconds))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %config.sendgrid_base_url, "SendGrid client initialized");

        Ok(Self {
            http_client,
            base_url: config.sendgrid_base_url.trim_end_matches('/').to_string(),
            api_key: config.sendgrid_api_key.clone(),
        })
    }

    async fn send_one(&self, message: &OutboundMessage) -> Result<SendReceipt, DispatchError> {
        let url = format!("{}/v3/mail/send", self.base_url);
        let request = MailSendRequest::from(message);

        debug!(to = %message.to, subject = %message.subject, "Sending email via SendGrid");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DispatchError::from_provider(None, e.to_string(), None))?;

        let status = response.status();

        if status.is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            return Ok(SendReceipt {
                message_id,
                status_code: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let details = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .map(|parsed| parsed.errors)
            .filter(|errors| !errors.is_empty());

        warn!(
            to = %message.to,
            status = status.as_u16(),
            "SendGrid rejected email"
        );

        Err(DispatchError::from_provider(
            Some(status.as_u16()),
            format!("SendGrid request failed with status {}", status),
            details,
        ))
    }
}

#[async_trait]
impl MailSender for SendGridClient {
    async fn send(&self, messages: &[OutboundMessage]) -> Result<Vec<SendReceipt>, DispatchError> {
        let receipts = try_join_all(messages.iter().map(|message| self.send_one(message))).await?;

        info!(count = receipts.len(), "Emails accepted by SendGrid");

        Ok(receipts)
    }
}
