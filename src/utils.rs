use chrono::Utc;
use uuid::Uuid;

/// `queue_<epoch millis>_<random suffix>`
pub fn generate_queue_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("queue_{}_{}", Utc::now().timestamp_millis(), &suffix[..12])
}

/// Rough linear estimate used in queued-send acknowledgements: one and a half
/// seconds per batch, rounded up.
pub fn estimate_processing_time(batch_count: usize) -> String {
    let seconds = (batch_count as f64 * 1.5).ceil() as u64;
    format!("{} seconds", seconds)
}
