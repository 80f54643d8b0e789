pub mod batcher;
pub mod cache;
pub mod dispatch;
pub mod email;
pub mod queue;
pub mod rate_limit;
pub mod templates;
