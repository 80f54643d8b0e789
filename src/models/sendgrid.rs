use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::models::message::{Attachment, OutboundMessage};

#[derive(Debug, Clone, Serialize)]
pub struct MailSendRequest {
    pub personalizations: Vec<Personalization>,
    pub from: EmailAddress,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    pub tracking_settings: TrackingSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct Personalization {
    pub to: Vec<EmailAddress>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_args: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_template_data: Option<Map<String, JsonValue>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailAddress {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingSettings {
    pub click_tracking: Toggle,
    pub open_tracking: Toggle,
}

#[derive(Debug, Clone, Serialize)]
pub struct Toggle {
    pub enable: bool,
}

/// Error body returned by the mail send endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<JsonValue>,
}

impl From<&OutboundMessage> for MailSendRequest {
    fn from(message: &OutboundMessage) -> Self {
        let mut content = Vec::new();
        if !message.text.is_empty() {
            content.push(Content {
                content_type: "text/plain",
                value: message.text.clone(),
            });
        }
        if !message.html.is_empty() {
            content.push(Content {
                content_type: "text/html",
                value: message.html.clone(),
            });
        }

        Self {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: message.to.clone(),
                }],
                custom_args: message.custom_args.clone(),
                dynamic_template_data: message.dynamic_template_data.clone(),
            }],
            from: EmailAddress {
                email: message.from.clone(),
            },
            subject: Some(message.subject.clone()).filter(|subject| !subject.is_empty()),
            content,
            template_id: message.template_id.clone(),
            attachments: message.attachments.clone(),
            tracking_settings: TrackingSettings {
                click_tracking: Toggle { enable: true },
                open_tracking: Toggle { enable: true },
            },
        }
    }
}
