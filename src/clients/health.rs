use std::{collections::BTreeMap, sync::Arc};

use chrono::{SecondsFormat, Utc};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::{
    models::health::{ComponentHealth, HealthCheckResponse, HealthStatus},
    services::dispatch::BulkDispatcher,
};

/// Missed loop ticks after which the delivery queue counts as down.
const STALLED_TICKS: u32 = 5;

pub struct HealthChecker {
    dispatcher: Arc<BulkDispatcher>,
    started_at: Instant,
    queue_backlog_limit: usize,
}

impl HealthChecker {
    pub fn new(dispatcher: Arc<BulkDispatcher>, queue_backlog_limit: usize) -> Self {
        Self {
            dispatcher,
            started_at: Instant::now(),
            queue_backlog_limit,
        }
    }

    pub fn check_all(&self) -> HealthCheckResponse {
        let mut checks = BTreeMap::new();

        checks.insert("delivery_queue".to_string(), self.check_queue());
        checks.insert("template_cache".to_string(), self.check_cache());

        let status = determine_overall_status(&checks);

        HealthCheckResponse {
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION"),
            checks,
        }
    }

    fn check_queue(&self) -> ComponentHealth {
        let queue = self.dispatcher.queue();
        let stats = queue.stats();

        let stall_limit = queue.config().process_interval * STALLED_TICKS;
        if let Some(silence) = queue.since_last_tick().filter(|s| *s > stall_limit) {
            error!(
                silent_ms = silence.as_millis() as u64,
                "Delivery queue loop stopped ticking"
            );
            return ComponentHealth::unhealthy(
                stats.queue_size,
                format!("Processing loop silent for {}ms", silence.as_millis()),
            )
            .with_processing(stats.processing);
        }

        if stats.queue_size > self.queue_backlog_limit {
            warn!(
                queue_size = stats.queue_size,
                limit = self.queue_backlog_limit,
                "Delivery queue backlog above limit"
            );
            return ComponentHealth::degraded(
                stats.queue_size,
                format!("Backlog exceeds {} items", self.queue_backlog_limit),
            )
            .with_processing(stats.processing);
        }

        debug!(queue_size = stats.queue_size, "Delivery queue health check passed");
        ComponentHealth::healthy(stats.queue_size).with_processing(stats.processing)
    }

    fn check_cache(&self) -> ComponentHealth {
        ComponentHealth::healthy(self.dispatcher.cache().len())
    }
}

fn determine_overall_status(checks: &BTreeMap<String, ComponentHealth>) -> HealthStatus {
    if checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy)
    {
        HealthStatus::Unhealthy
    } else if checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
