use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mail_dispatch::{
    api::AppState,
    clients::{MailSender, health::HealthChecker},
    error::DispatchError,
    models::message::{OutboundMessage, Recipient, SendReceipt},
    services::{
        cache::ExpiringCache,
        dispatch::{BulkDispatcher, DispatchSettings},
        email::EmailService,
        queue::QueueConfig,
        rate_limit::{RateLimitConfig, RateLimiter},
        templates::TemplateRegistry,
    },
};
use parking_lot::Mutex;

pub const SENDER: &str = "sender@example.com";

/// Records every message it is asked to send. Messages addressed to a
/// failing recipient make the whole call fail with a 503.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(addresses: &[&str]) -> Arc<Self> {
        let sender = Self::default();
        sender
            .failing
            .lock()
            .extend(addresses.iter().map(|a| a.to_string()));
        Arc::new(sender)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSender for RecordingSender {
    async fn send(&self, messages: &[OutboundMessage]) -> Result<Vec<SendReceipt>, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing.lock();
        if messages.iter().any(|m| failing.contains(&m.to)) {
            return Err(DispatchError::from_provider(Some(503), "unavailable", None));
        }
        drop(failing);

        let mut sent = self.sent.lock();
        let receipts = messages
            .iter()
            .map(|_| SendReceipt {
                message_id: Some(format!("msg-{}", sent.len())),
                status_code: 202,
            })
            .collect();
        sent.extend(messages.iter().cloned());

        Ok(receipts)
    }
}

pub fn recipients(addresses: &[&str]) -> Vec<Recipient> {
    addresses.iter().map(|a| Recipient::new(*a)).collect()
}

pub fn dispatcher_with(sender: Arc<RecordingSender>) -> BulkDispatcher {
    let settings = DispatchSettings {
        inter_batch_delay: Duration::ZERO,
        ..DispatchSettings::new(SENDER)
    };

    BulkDispatcher::new(
        sender,
        Arc::new(TemplateRegistry::new()),
        Arc::new(ExpiringCache::new()),
        QueueConfig::default(),
        settings,
    )
}

pub fn app_state(sender: Arc<RecordingSender>, max_requests: u32) -> Arc<AppState> {
    let dispatcher = Arc::new(dispatcher_with(Arc::clone(&sender)));

    Arc::new(AppState {
        email: EmailService::new(sender, Arc::clone(dispatcher.templates()), SENDER),
        health_checker: HealthChecker::new(Arc::clone(&dispatcher), 10_000),
        rate_limiter: RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
        }),
        dispatcher,
    })
}
