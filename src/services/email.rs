use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, info};

use crate::{
    clients::MailSender,
    error::DispatchError,
    models::{
        message::{OutboundMessage, SendReceipt},
        request::{
            SendBulkRequest, SendDynamicTemplateRequest, SendEmailRequest,
            SendTemplateEmailRequest,
        },
    },
    services::templates::{TemplateRegistry, data_string},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub status_code: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendResult {
    pub success: bool,
    pub sent_count: usize,
    pub responses: Vec<SendReceipt>,
}

/// Direct, unqueued sends: one-off emails, single template emails and small
/// bulk sends that go out in a single provider call.
pub struct EmailService {
    sender: Arc<dyn MailSender>,
    templates: Arc<TemplateRegistry>,
    default_from: String,
}

impl EmailService {
    pub fn new(
        sender: Arc<dyn MailSender>,
        templates: Arc<TemplateRegistry>,
        default_from: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            templates,
            default_from: default_from.into(),
        }
    }

    pub async fn send_email(&self, request: SendEmailRequest) -> Result<SendResult, DispatchError> {
        let messages: Vec<OutboundMessage> = request
            .to
            .as_slice()
            .iter()
            .map(|to| OutboundMessage {
                to: to.clone(),
                from: self.default_from.clone(),
                subject: request.subject.clone(),
                text: request.text.clone().unwrap_or_default(),
                html: request.html.clone().unwrap_or_default(),
                attachments: request.attachments.clone(),
                ..OutboundMessage::default()
            })
            .collect();

        let receipts = self.sender.send(&messages).await.inspect_err(|e| {
            error!(
                error = %e,
                to = ?request.to.as_slice(),
                subject = %request.subject,
                "Failed to send email"
            );
        })?;

        let result = first_result(receipts);

        info!(
            to = ?request.to.as_slice(),
            subject = %request.subject,
            attachments = request.attachments.len(),
            message_id = result.message_id.as_deref().unwrap_or_default(),
            "Email sent successfully"
        );

        Ok(result)
    }

    pub async fn send_dynamic_template(
        &self,
        request: SendDynamicTemplateRequest,
    ) -> Result<SendResult, DispatchError> {
        let messages: Vec<OutboundMessage> = request
            .to
            .as_slice()
            .iter()
            .map(|to| OutboundMessage {
                to: to.clone(),
                from: self.default_from.clone(),
                template_id: Some(request.template_id.clone()),
                dynamic_template_data: Some(request.dynamic_template_data.clone()),
                ..OutboundMessage::default()
            })
            .collect();

        let receipts = self.sender.send(&messages).await.inspect_err(|e| {
            error!(
                error = %e,
                template_id = %request.template_id,
                to = ?request.to.as_slice(),
                "Failed to send dynamic template email"
            );
        })?;

        let result = first_result(receipts);

        info!(
            to = ?request.to.as_slice(),
            template_id = %request.template_id,
            message_id = result.message_id.as_deref().unwrap_or_default(),
            "Dynamic template email sent successfully"
        );

        Ok(result)
    }

    pub async fn send_template_email(
        &self,
        request: SendTemplateEmailRequest,
    ) -> Result<SendResult, DispatchError> {
        let template = self
            .templates
            .get_template(&request.template_name, &request.template_data)
            .ok_or_else(|| DispatchError::TemplateNotFound(request.template_name.clone()))?;

        self.send_email(SendEmailRequest {
            to: request.to,
            subject: request.subject.unwrap_or(template.subject),
            text: Some(template.text),
            html: Some(template.html),
            attachments: Vec::new(),
        })
        .await
    }

    pub async fn send_bulk_emails(
        &self,
        request: SendBulkRequest,
    ) -> Result<BulkSendResult, DispatchError> {
        let mut messages = Vec::with_capacity(request.recipients.len());

        for recipient in &request.recipients {
            let (subject, text, html) = match &request.template_name {
                Some(name) => {
                    let mut data = request.template_data.clone();
                    data.insert("name".to_string(), JsonValue::from(recipient.display_name()));

                    let template = self
                        .templates
                        .get_template(name, &data)
                        .ok_or_else(|| DispatchError::TemplateNotFound(name.clone()))?;

                    (request.subject.clone(), template.text, template.html)
                }
                None => (
                    request.subject.clone(),
                    data_string(&request.template_data, "text"),
                    data_string(&request.template_data, "html"),
                ),
            };

            let mut custom_args = BTreeMap::new();
            custom_args.insert("recipient_id".to_string(), recipient.tracking_id().to_string());

            messages.push(OutboundMessage {
                to: recipient.email.clone(),
                from: self.default_from.clone(),
                subject,
                text,
                html,
                custom_args,
                ..OutboundMessage::default()
            });
        }

        let responses = self.sender.send(&messages).await.inspect_err(|e| {
            error!(
                error = %e,
                recipient_count = request.recipients.len(),
                "Failed to send bulk emails"
            );
        })?;

        info!(
            count = request.recipients.len(),
            subject = %request.subject,
            "Bulk emails sent successfully"
        );

        Ok(BulkSendResult {
            success: true,
            sent_count: request.recipients.len(),
            responses,
        })
    }
}

fn first_result(receipts: Vec<SendReceipt>) -> SendResult {
    let first = receipts.into_iter().next();

    SendResult {
        success: true,
        message_id: first.as_ref().and_then(|r| r.message_id.clone()),
        status_code: first.map_or(202, |r| r.status_code),
    }
}
