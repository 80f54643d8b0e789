use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::DispatchError,
    models::status::{Priority, QueueItemStatus},
    services::cache::{DEFAULT_SWEEP_INTERVAL, ExpiringCache},
    utils::generate_queue_id,
};

/// One unit of queued work: a payload that is delivered, retried and
/// dead-lettered as a whole.
#[derive(Debug, Clone)]
pub struct QueueItem<T> {
    pub id: String,
    pub payload: Vec<T>,
    pub priority: Priority,
    pub attempts: u32,
    pub status: QueueItemStatus,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl<T> QueueItem<T> {
    fn new(payload: Vec<T>, priority: Priority) -> Self {
        Self {
            id: generate_queue_id(),
            payload,
            priority,
            attempts: 0,
            status: QueueItemStatus::Pending,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn report(&self) -> QueueItemReport {
        QueueItemReport {
            id: self.id.clone(),
            status: self.status,
            priority: self.priority,
            attempts: self.attempts,
            message_count: self.payload.len(),
            created_at: self.created_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Payload-free view of a queue item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemReport {
    pub id: String,
    pub status: QueueItemStatus,
    pub priority: Priority,
    pub attempts: u32,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// The work a [`WorkQueue`] performs for each item it claims.
#[async_trait]
pub trait QueueProcessor<T: Send + Sync>: Send + Sync {
    /// Delivers the whole item. Any error fails the item.
    async fn process(&self, item: &QueueItem<T>) -> Result<(), DispatchError>;

    /// Called once for an item that exhausted its retries.
    fn dead_letter(&self, item: &QueueItem<T>) {
        error!(
            queue_id = %item.id,
            attempts = item.attempts,
            payload_len = item.payload.len(),
            error = item.last_error.as_deref().unwrap_or_default(),
            "Failed queue item moved to dead letter queue"
        );
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_size: usize,
    pub process_interval: Duration,
    pub max_retries: u32,
    /// How long terminal item states stay available to [`WorkQueue::status`].
    pub outcome_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            process_interval: Duration::from_millis(1000),
            max_retries: 3,
            outcome_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_size: usize,
    /// Items claimed by the running pass and not yet finished.
    pub in_flight: usize,
    pub processing: bool,
    pub batch_size: usize,
    /// Counts for queued and in-flight items. Completed items leave the queue
    /// as soon as they succeed, so `completed` never shows up here.
    pub status_counts: BTreeMap<QueueItemStatus, usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// In-process work queue with two-tier priority, bounded retries and a
/// dead-letter hook.
///
/// High priority items jump to the front; everything else, retries included,
/// joins the back.
pub struct WorkQueue<T, P> {
    items: Mutex<VecDeque<QueueItem<T>>>,
    in_flight: Mutex<HashMap<String, QueueItemReport>>,
    outcomes: Arc<ExpiringCache<QueueItemReport>>,
    processing: AtomicBool,
    last_tick: Mutex<Option<Instant>>,
    processor: P,
    config: QueueConfig,
}

impl<T, P> WorkQueue<T, P>
where
    T: Send + Sync + 'static,
    P: QueueProcessor<T> + 'static,
{
    pub fn new(processor: P, config: QueueConfig) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            outcomes: Arc::new(ExpiringCache::with_default_ttl(config.outcome_ttl)),
            processing: AtomicBool::new(false),
            last_tick: Mutex::new(None),
            processor,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn enqueue(&self, payload: Vec<T>, priority: Priority) -> String {
        let item = QueueItem::new(payload, priority);
        let queue_id = item.id.clone();
        let payload_len = item.payload.len();

        let queue_size = {
            let mut items = self.items.lock();
            match priority {
                Priority::High => items.push_front(item),
                Priority::Normal | Priority::Low => items.push_back(item),
            }
            items.len()
        };

        info!(
            queue_id = %queue_id,
            %priority,
            payload_len,
            queue_size,
            "Added item to delivery queue"
        );

        queue_id
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Time since the background loop last ticked, or `None` if it was never
    /// started.
    pub fn since_last_tick(&self) -> Option<Duration> {
        self.last_tick.lock().map(|tick| tick.elapsed())
    }

    /// Ids of the resident items in claim order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.items.lock().iter().map(|item| item.id.clone()).collect()
    }

    /// Current or terminal state of the item, if it is still known.
    pub fn status(&self, queue_id: &str) -> Option<QueueItemReport> {
        // The queue lock is held across both lookups so a retried item moving
        // back from `in_flight` is never missed.
        let items = self.items.lock();

        if let Some(item) = items.iter().find(|item| item.id == queue_id) {
            return Some(item.report());
        }

        if let Some(report) = self.in_flight.lock().get(queue_id).cloned() {
            return Some(report);
        }

        drop(items);
        self.outcomes.get(queue_id)
    }

    pub fn stats(&self) -> QueueStats {
        let items = self.items.lock();
        let in_flight = self.in_flight.lock();

        let mut status_counts = BTreeMap::new();
        for status in items
            .iter()
            .map(|item| item.status)
            .chain(in_flight.values().map(|report| report.status))
        {
            *status_counts.entry(status).or_insert(0) += 1;
        }

        QueueStats {
            queue_size: items.len(),
            in_flight: in_flight.len(),
            processing: self.is_processing(),
            batch_size: self.config.batch_size,
            status_counts,
        }
    }

    /// Runs one processing pass.
    ///
    /// Returns `None` without touching the queue when another pass is active
    /// or there is nothing to do.
    pub async fn process_pending(&self) -> Option<PassSummary> {
        if self.is_empty() {
            return None;
        }

        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Delivery queue pass already running, skipping tick");
            return None;
        }
        let _guard = ProcessingGuard(&self.processing);

        // Claimed items move into `in_flight` while the queue lock is held so a
        // status lookup always finds them in one place or the other.
        let claimed: Vec<QueueItem<T>> = {
            let mut items = self.items.lock();
            let count = items.len().min(self.config.batch_size);
            let claimed: Vec<QueueItem<T>> = items.drain(..count).collect();

            let mut in_flight = self.in_flight.lock();
            for item in &claimed {
                in_flight.insert(item.id.clone(), item.report());
            }
            claimed
        };

        let mut summary = PassSummary {
            claimed: claimed.len(),
            ..PassSummary::default()
        };

        for mut item in claimed {
            item.status = QueueItemStatus::Processing;
            if let Some(report) = self.in_flight.lock().get_mut(&item.id) {
                report.status = QueueItemStatus::Processing;
            }

            let result = self.processor.process(&item).await;

            match result {
                Ok(()) => {
                    item.status = QueueItemStatus::Completed;
                    self.outcomes.set(item.id.clone(), item.report());
                    self.in_flight.lock().remove(&item.id);
                    summary.completed += 1;

                    info!(
                        queue_id = %item.id,
                        payload_len = item.payload.len(),
                        "Queue item processed successfully"
                    );
                }
                Err(e) => {
                    item.attempts += 1;
                    item.last_error = Some(e.to_string());

                    if item.attempts < self.config.max_retries {
                        item.status = QueueItemStatus::Retry;

                        warn!(
                            queue_id = %item.id,
                            attempt = item.attempts,
                            max_retries = self.config.max_retries,
                            error = %e,
                            "Retrying queue item"
                        );

                        {
                            let mut items = self.items.lock();
                            self.in_flight.lock().remove(&item.id);
                            items.push_back(item);
                        }
                        summary.retried += 1;
                    } else {
                        item.status = QueueItemStatus::Failed;

                        error!(
                            queue_id = %item.id,
                            attempts = item.attempts,
                            error = %e,
                            "Queue item failed after max retries"
                        );

                        self.processor.dead_letter(&item);
                        self.outcomes.set(item.id.clone(), item.report());
                        self.in_flight.lock().remove(&item.id);
                        summary.failed += 1;
                    }
                }
            }
        }

        Some(summary)
    }

    /// Starts the background loop. Every tick spawns a pass; ticks that land
    /// while a pass is still draining do nothing.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        queue.outcomes.start_sweeper(DEFAULT_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = interval(queue.config.process_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                interval_ms = queue.config.process_interval.as_millis() as u64,
                batch_size = queue.config.batch_size,
                "Delivery queue processor started"
            );

            loop {
                ticker.tick().await;
                *queue.last_tick.lock() = Some(Instant::now());

                if queue.is_processing() || queue.is_empty() {
                    continue;
                }

                let pass_queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    if let Some(summary) = pass_queue.process_pending().await {
                        debug!(
                            claimed = summary.claimed,
                            completed = summary.completed,
                            retried = summary.retried,
                            failed = summary.failed,
                            "Delivery queue pass finished"
                        );
                    }
                });
            }
        })
    }
}
