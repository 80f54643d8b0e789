mod common;

mod batcher_tests;
mod dispatch_tests;
mod rate_limit_tests;
mod validation_tests;
