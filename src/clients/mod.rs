pub mod health;
pub mod sendgrid;

use async_trait::async_trait;

use crate::{
    error::DispatchError,
    models::message::{OutboundMessage, SendReceipt},
};

/// Hands messages to the email provider.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Sends every message, returning one receipt per message in order.
    ///
    /// Fails as a whole if the provider rejects any of them.
    async fn send(&self, messages: &[OutboundMessage]) -> Result<Vec<SendReceipt>, DispatchError>;
}
