use std::sync::Arc;

use anyhow::{Error, Result};
use mail_dispatch::{
    api::{AppState, run_api_server},
    clients::{MailSender, health::HealthChecker, sendgrid::SendGridClient},
    config::Config,
    services::{
        cache::ExpiringCache, dispatch::BulkDispatcher, email::EmailService,
        rate_limit::RateLimiter, templates::TemplateRegistry,
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let sender: Arc<dyn MailSender> = Arc::new(SendGridClient::new(&config)?);
    let templates = Arc::new(TemplateRegistry::new());
    let cache = Arc::new(ExpiringCache::with_default_ttl(config.cache_default_ttl()));

    let dispatcher = Arc::new(BulkDispatcher::new(
        Arc::clone(&sender),
        Arc::clone(&templates),
        Arc::clone(&cache),
        config.queue_config(),
        config.dispatch_settings(),
    ));

    cache.start_sweeper(config.cache_sweep_interval());
    dispatcher.queue().start();

    let state = Arc::new(AppState {
        email: EmailService::new(sender, templates, config.sendgrid_verified_sender.clone()),
        health_checker: HealthChecker::new(
            Arc::clone(&dispatcher),
            config.health_queue_backlog_limit,
        ),
        rate_limiter: RateLimiter::new(config.rate_limit_config()),
        dispatcher,
    });

    info!(port = config.server_port, "Configuration validated, starting server");

    run_api_server(&config, state).await
}
