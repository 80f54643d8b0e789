use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::models::{
    message::{Attachment, Recipient},
    status::Priority,
};

/// A single address or a list of addresses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Addresses {
    One(String),
    Many(Vec<String>),
}

impl Addresses {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Addresses::One(address) => std::slice::from_ref(address),
            Addresses::Many(addresses) => addresses,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub to: Addresses,
    pub subject: String,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub html: Option<String>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTemplateEmailRequest {
    pub to: Addresses,
    pub template_name: String,

    #[serde(default)]
    pub template_data: Map<String, JsonValue>,

    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBulkRequest {
    pub recipients: Vec<Recipient>,
    pub subject: String,

    #[serde(default)]
    pub template_name: Option<String>,

    #[serde(default)]
    pub template_data: Map<String, JsonValue>,
}

/// Send through a template stored with the provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDynamicTemplateRequest {
    pub to: Addresses,
    pub template_id: String,
    pub dynamic_template_data: Map<String, JsonValue>,
}

fn default_use_queue() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBulkCachedRequest {
    pub recipients: Vec<Recipient>,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub template_name: Option<String>,

    #[serde(default)]
    pub template_data: Map<String, JsonValue>,

    #[serde(default = "default_use_queue")]
    pub use_queue: bool,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmUpRequest {
    #[serde(default)]
    pub template_names: Option<Vec<String>>,

    #[serde(default)]
    pub template_data: Map<String, JsonValue>,
}
