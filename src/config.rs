use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{
    models::validation::is_valid_email,
    services::{dispatch::DispatchSettings, queue::QueueConfig, rate_limit::RateLimitConfig},
};

fn default_sendgrid_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

const fn default_sendgrid_timeout_seconds() -> u64 {
    10
}

const fn default_server_port() -> u16 {
    3000
}

const fn default_queue_batch_size() -> usize {
    100
}

const fn default_queue_process_interval_ms() -> u64 {
    1000
}

const fn default_queue_max_retries() -> u32 {
    3
}

const fn default_queue_outcome_ttl_ms() -> u64 {
    3_600_000
}

const fn default_cache_default_ttl_ms() -> u64 {
    300_000
}

const fn default_cache_sweep_interval_ms() -> u64 {
    60_000
}

const fn default_template_cache_ttl_ms() -> u64 {
    600_000
}

const fn default_recipient_batch_size() -> usize {
    1000
}

const fn default_inter_batch_delay_ms() -> u64 {
    100
}

const fn default_rate_limit_window_ms() -> u64 {
    900_000
}

const fn default_rate_limit_max_requests() -> u32 {
    10
}

const fn default_health_queue_backlog_limit() -> usize {
    10_000
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub sendgrid_api_key: String,
    pub sendgrid_verified_sender: String,

    #[serde(default = "default_sendgrid_base_url")]
    pub sendgrid_base_url: String,

    #[serde(default = "default_sendgrid_timeout_seconds")]
    pub sendgrid_timeout_seconds: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_queue_batch_size")]
    pub queue_batch_size: usize,

    #[serde(default = "default_queue_process_interval_ms")]
    pub queue_process_interval_ms: u64,

    #[serde(default = "default_queue_max_retries")]
    pub queue_max_retries: u32,

    #[serde(default = "default_queue_outcome_ttl_ms")]
    pub queue_outcome_ttl_ms: u64,

    #[serde(default = "default_cache_default_ttl_ms")]
    pub cache_default_ttl_ms: u64,

    #[serde(default = "default_cache_sweep_interval_ms")]
    pub cache_sweep_interval_ms: u64,

    #[serde(default = "default_template_cache_ttl_ms")]
    pub template_cache_ttl_ms: u64,

    #[serde(default = "default_recipient_batch_size")]
    pub recipient_batch_size: usize,

    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,

    #[serde(default = "default_health_queue_backlog_limit")]
    pub health_queue_backlog_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from explicit `KEY=value` pairs instead of the process
    /// environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let config = envy::from_iter::<_, Self>(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        )
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if !is_valid_email(&self.sendgrid_verified_sender) {
            return Err(anyhow!(
                "SENDGRID_VERIFIED_SENDER must be a valid email address"
            ));
        }
        if self.queue_batch_size == 0 || self.recipient_batch_size == 0 {
            return Err(anyhow!("Batch sizes must be at least 1"));
        }
        if self.rate_limit_max_requests == 0 || self.rate_limit_window_ms == 0 {
            return Err(anyhow!("Rate limit requests and window must be at least 1"));
        }
        Ok(())
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            batch_size: self.queue_batch_size,
            process_interval: Duration::from_millis(self.queue_process_interval_ms),
            max_retries: self.queue_max_retries,
            outcome_ttl: Duration::from_millis(self.queue_outcome_ttl_ms),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            default_from: self.sendgrid_verified_sender.clone(),
            recipient_batch_size: self.recipient_batch_size,
            template_cache_ttl: Duration::from_millis(self.template_cache_ttl_ms),
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit_max_requests,
            window: Duration::from_millis(self.rate_limit_window_ms),
        }
    }

    pub fn cache_default_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_default_ttl_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }
}
