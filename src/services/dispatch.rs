use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::MailSender,
    error::DispatchError,
    models::{
        message::{DeadLetter, OutboundMessage, Recipient, SendReceipt},
        request::SendBulkCachedRequest,
        status::Priority,
        template::RenderedTemplate,
    },
    services::{
        batcher::create_batches,
        cache::{CacheStats, ExpiringCache},
        queue::{QueueConfig, QueueItem, QueueItemReport, QueueProcessor, QueueStats, WorkQueue},
        templates::{TemplateRegistry, data_string, replace_variables},
    },
    utils::estimate_processing_time,
};

pub type DeliveryQueue = WorkQueue<OutboundMessage, EmailDeliveryProcessor>;

/// Sends each queued message through the mail sender, in order, stopping at
/// the first failure.
pub struct EmailDeliveryProcessor {
    sender: Arc<dyn MailSender>,
}

impl EmailDeliveryProcessor {
    pub fn new(sender: Arc<dyn MailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl QueueProcessor<OutboundMessage> for EmailDeliveryProcessor {
    async fn process(&self, item: &QueueItem<OutboundMessage>) -> Result<(), DispatchError> {
        for message in &item.payload {
            if let Err(e) = self.sender.send(std::slice::from_ref(message)).await {
                error!(
                    queue_id = %item.id,
                    to = %message.to,
                    error = %e,
                    "Failed to send queued email"
                );
                return Err(e);
            }
        }

        Ok(())
    }

    fn dead_letter(&self, item: &QueueItem<OutboundMessage>) {
        let dead_letter = DeadLetter {
            queue_id: item.id.clone(),
            recipients: item.payload.iter().map(|m| m.to.clone()).collect(),
            attempts: item.attempts,
            failure_reason: item.last_error.clone().unwrap_or_default(),
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        error!(
            queue_id = %dead_letter.queue_id,
            emails = dead_letter.recipients.len(),
            attempts = dead_letter.attempts,
            dead_letter = %serde_json::to_string(&dead_letter).unwrap_or_default(),
            "Failed queue item moved to dead letter queue"
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Enqueue every batch and acknowledge immediately.
    #[default]
    Queued,
    /// Send every batch before returning.
    Direct,
}

#[derive(Debug, Clone)]
pub struct BulkDispatchRequest {
    pub recipients: Vec<Recipient>,
    pub subject: Option<String>,
    pub template_name: Option<String>,
    pub template_data: Map<String, JsonValue>,
    pub from: Option<String>,
    pub mode: DispatchMode,
    pub priority: Priority,
    pub batch_size: Option<usize>,
}

impl From<SendBulkCachedRequest> for BulkDispatchRequest {
    fn from(request: SendBulkCachedRequest) -> Self {
        Self {
            recipients: request.recipients,
            subject: request.subject,
            template_name: request.template_name,
            template_data: request.template_data,
            from: None,
            mode: if request.use_queue {
                DispatchMode::Queued
            } else {
                DispatchMode::Direct
            },
            priority: request.priority,
            batch_size: request.batch_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_index: usize,
    pub sent: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<Vec<SendReceipt>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BulkDispatchOutcome {
    #[serde(rename_all = "camelCase")]
    Queued {
        queued: bool,
        batch_count: usize,
        queue_ids: Vec<String>,
        estimated_processing_time: String,
    },
    #[serde(rename_all = "camelCase")]
    Sent {
        queued: bool,
        total_sent: usize,
        batch_count: usize,
        results: Vec<BatchResult>,
    },
}

impl BulkDispatchOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, BulkDispatchOutcome::Queued { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmUpReport {
    pub cached: Vec<String>,
    pub already_cached: Vec<String>,
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub default_from: String,
    pub recipient_batch_size: usize,
    pub template_cache_ttl: Duration,
    pub inter_batch_delay: Duration,
}

impl DispatchSettings {
    pub fn new(default_from: impl Into<String>) -> Self {
        Self {
            default_from: default_from.into(),
            recipient_batch_size: 1000,
            template_cache_ttl: Duration::from_millis(600_000),
            inter_batch_delay: Duration::from_millis(100),
        }
    }
}

/// Resolves template content once, batches recipients, and either queues the
/// batches or sends them straight away.
pub struct BulkDispatcher {
    sender: Arc<dyn MailSender>,
    templates: Arc<TemplateRegistry>,
    cache: Arc<ExpiringCache<RenderedTemplate>>,
    queue: Arc<DeliveryQueue>,
    settings: DispatchSettings,
}

impl BulkDispatcher {
    pub fn new(
        sender: Arc<dyn MailSender>,
        templates: Arc<TemplateRegistry>,
        cache: Arc<ExpiringCache<RenderedTemplate>>,
        queue_config: QueueConfig,
        settings: DispatchSettings,
    ) -> Self {
        let processor = EmailDeliveryProcessor::new(Arc::clone(&sender));
        let queue = Arc::new(WorkQueue::new(processor, queue_config));

        Self {
            sender,
            templates,
            cache,
            queue,
            settings,
        }
    }

    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub fn cache(&self) -> &Arc<ExpiringCache<RenderedTemplate>> {
        &self.cache
    }

    pub async fn send_bulk(
        &self,
        request: BulkDispatchRequest,
    ) -> Result<BulkDispatchOutcome, DispatchError> {
        info!(
            recipient_count = request.recipients.len(),
            template = request.template_name.as_deref().unwrap_or_default(),
            mode = ?request.mode,
            "Starting bulk email send"
        );

        let template_content = match &request.template_name {
            Some(name) => Some(self.resolve_template(name, &request.template_data)?),
            None => None,
        };

        let batch_size = request
            .batch_size
            .unwrap_or(self.settings.recipient_batch_size);
        let batches = create_batches(&request.recipients, batch_size);

        let content = MessageContent {
            subject: request.subject.as_deref(),
            template: template_content.as_ref(),
            template_data: &request.template_data,
            from: request
                .from
                .as_deref()
                .unwrap_or(&self.settings.default_from),
        };

        let outcome = match request.mode {
            DispatchMode::Queued => self.queue_batches(&batches, &content, request.priority),
            DispatchMode::Direct => self.send_batches(&batches, &content).await,
        };

        Ok(outcome)
    }

    fn resolve_template(
        &self,
        name: &str,
        template_data: &Map<String, JsonValue>,
    ) -> Result<RenderedTemplate, DispatchError> {
        let cache_key = template_cache_key(name, template_data)?;

        if let Some(cached) = self.cache.get(&cache_key) {
            info!(template = name, "Template loaded from cache");
            return Ok(cached);
        }

        info!(template = name, "Template not in cache, rendering");
        let rendered = self
            .templates
            .get_shared_template(name, template_data)
            .ok_or_else(|| DispatchError::TemplateNotFound(name.to_string()))?;

        self.cache
            .set_with_ttl(cache_key, rendered.clone(), self.settings.template_cache_ttl);
        info!(template = name, "Template cached");

        Ok(rendered)
    }

    fn queue_batches(
        &self,
        batches: &[Vec<Recipient>],
        content: &MessageContent<'_>,
        priority: Priority,
    ) -> BulkDispatchOutcome {
        let queue_ids: Vec<String> = batches
            .iter()
            .map(|batch| self.queue.enqueue(content.build_batch(batch), priority))
            .collect();

        info!(
            batch_count = batches.len(),
            queue_ids = queue_ids.len(),
            "Bulk emails queued"
        );

        BulkDispatchOutcome::Queued {
            queued: true,
            batch_count: batches.len(),
            estimated_processing_time: estimate_processing_time(batches.len()),
            queue_ids,
        }
    }

    async fn send_batches(
        &self,
        batches: &[Vec<Recipient>],
        content: &MessageContent<'_>,
    ) -> BulkDispatchOutcome {
        let mut results = Vec::with_capacity(batches.len());
        let mut total_sent = 0;

        for (index, batch) in batches.iter().enumerate() {
            info!(
                batch = index + 1,
                batch_count = batches.len(),
                batch_size = batch.len(),
                "Sending batch"
            );

            let messages = content.build_batch(batch);

            match self.sender.send(&messages).await {
                Ok(receipts) => {
                    total_sent += batch.len();
                    results.push(BatchResult {
                        batch_index: index,
                        sent: batch.len(),
                        responses: Some(receipts),
                        error: None,
                    });
                }
                Err(e) => {
                    error!(
                        batch = index + 1,
                        batch_size = batch.len(),
                        error = %e,
                        "Batch failed"
                    );
                    results.push(BatchResult {
                        batch_index: index,
                        sent: 0,
                        responses: None,
                        error: Some(e.to_string()),
                    });
                }
            }

            if index + 1 < batches.len() {
                sleep(self.settings.inter_batch_delay).await;
            }
        }

        info!(
            total_sent,
            batch_count = batches.len(),
            successful_batches = results.iter().filter(|r| r.error.is_none()).count(),
            "Bulk email send completed"
        );

        BulkDispatchOutcome::Sent {
            queued: false,
            total_sent,
            batch_count: batches.len(),
            results,
        }
    }

    /// Pre-renders and caches templates so the first bulk send skips the
    /// render. An empty `names` warms every registered template.
    pub fn warm_up_cache(
        &self,
        names: &[String],
        common_data: &Map<String, JsonValue>,
    ) -> Result<WarmUpReport, DispatchError> {
        info!("Warming up template cache");

        let names = if names.is_empty() {
            self.templates.template_names()
        } else {
            names.to_vec()
        };

        let mut report = WarmUpReport::default();

        for name in names {
            let cache_key = template_cache_key(&name, common_data)?;

            if self.cache.has(&cache_key) {
                report.already_cached.push(name);
                continue;
            }

            match self.templates.get_shared_template(&name, common_data) {
                Some(rendered) => {
                    self.cache
                        .set_with_ttl(cache_key, rendered, self.settings.template_cache_ttl);
                    info!(template = %name, "Template pre-cached");
                    report.cached.push(name);
                }
                None => {
                    warn!(template = %name, "Failed to warm up unknown template");
                    report.unknown.push(name);
                }
            }
        }

        info!(
            cached = report.cached.len(),
            already_cached = report.already_cached.len(),
            unknown = report.unknown.len(),
            "Template cache warm-up completed"
        );

        Ok(report)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Template cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn queue_item_status(&self, queue_id: &str) -> Option<QueueItemReport> {
        self.queue.status(queue_id)
    }
}

pub fn template_cache_key(
    name: &str,
    template_data: &Map<String, JsonValue>,
) -> Result<String, DispatchError> {
    Ok(format!(
        "template_{}_{}",
        name,
        serde_json::to_string(template_data)?
    ))
}

struct MessageContent<'a> {
    subject: Option<&'a str>,
    template: Option<&'a RenderedTemplate>,
    template_data: &'a Map<String, JsonValue>,
    from: &'a str,
}

impl MessageContent<'_> {
    fn build_batch(&self, batch: &[Recipient]) -> Vec<OutboundMessage> {
        let batch_id = Uuid::new_v4().to_string();
        batch
            .iter()
            .map(|recipient| self.build_message(recipient, &batch_id))
            .collect()
    }

    fn build_message(&self, recipient: &Recipient, batch_id: &str) -> OutboundMessage {
        let (subject, text, html) = match self.template {
            Some(template) => {
                let mut data = self.template_data.clone();
                data.insert(
                    "name".to_string(),
                    JsonValue::from(recipient.display_name()),
                );
                data.insert("email".to_string(), JsonValue::from(recipient.email.as_str()));
                data.extend(recipient.custom_data.clone());

                let subject = match self.subject {
                    Some(subject) => subject.to_string(),
                    None => replace_variables(&template.subject, &data),
                };

                (
                    subject,
                    replace_variables(&template.text, &data),
                    replace_variables(&template.html, &data),
                )
            }
            None => (
                self.subject.unwrap_or_default().to_string(),
                data_string(self.template_data, "text"),
                data_string(self.template_data, "html"),
            ),
        };

        let mut custom_args = BTreeMap::new();
        custom_args.insert("recipient_id".to_string(), recipient.tracking_id().to_string());
        custom_args.insert("batch_id".to_string(), batch_id.to_string());

        OutboundMessage {
            to: recipient.email.clone(),
            from: self.from.to_string(),
            subject,
            text,
            html,
            custom_args,
            ..OutboundMessage::default()
        }
    }
}
