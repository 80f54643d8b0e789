use std::{net::SocketAddr, sync::Arc};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{ConnectInfo, FromRequest, Path, Request, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header::RETRY_AFTER},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clients::health::HealthChecker,
    config::Config,
    error::DispatchError,
    models::{
        health::HealthStatus,
        request::{
            SendBulkCachedRequest, SendBulkRequest, SendDynamicTemplateRequest, SendEmailRequest,
            SendTemplateEmailRequest, WarmUpRequest,
        },
        response::ApiResponse,
        validation::{
            validate_send_bulk, validate_send_bulk_cached, validate_send_dynamic_template,
            validate_send_email, validate_send_template_email,
        },
    },
    services::{
        cache::CacheStats,
        dispatch::BulkDispatcher,
        email::EmailService,
        queue::QueueStats,
        rate_limit::{RateDecision, RateLimiter},
    },
};

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// `Json` whose rejections answer like any other validation failure.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = DispatchError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub struct AppState {
    pub dispatcher: Arc<BulkDispatcher>,
    pub email: EmailService,
    pub health_checker: HealthChecker,
    pub rate_limiter: RateLimiter,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    queue: QueueStats,
    cache: CacheStats,
    timestamp: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    let email_routes = Router::new()
        .route("/send", post(send_email))
        .route("/send-template", post(send_template_email))
        .route("/send-bulk", post(send_bulk))
        .route("/send-dynamic-template", post(send_dynamic_template));

    let queued_routes = Router::new()
        .route("/send-bulk-cached", post(send_bulk_cached))
        .route("/stats", get(queue_stats))
        .route("/items/{id}", get(queue_item_status))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/warmup", post(warm_up_cache));

    let api_routes = Router::new()
        .nest("/queued", queued_routes)
        .merge(email_routes)
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), rate_limit));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .nest("/api/v1/email", api_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(config: &Config, state: Arc<AppState>) -> Result<(), Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Email dispatch server started");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server closed");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let limit = state.rate_limiter.limit();

    match state.rate_limiter.check(&client) {
        RateDecision::Allowed {
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
            headers.insert(
                RATE_LIMIT_RESET,
                HeaderValue::from(reset_after.as_secs().max(1)),
            );
            response
        }
        RateDecision::Limited { retry_after } => {
            let retry_after_seconds = retry_after.as_millis().div_ceil(1000).max(1) as u64;

            warn!(
                client = %client,
                endpoint = %request.uri(),
                retry_after_seconds,
                "Rate limit exceeded"
            );

            let body = json!({
                "success": false,
                "message": "Too many requests. Please try again later.",
                "retryAfter": retry_after_seconds,
                "limit": limit,
                "windowMs": state.rate_limiter.config().window.as_millis() as u64,
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
            headers.insert(RATE_LIMIT_RESET, HeaderValue::from(retry_after_seconds));
            response
        }
    }
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "Email Dispatch Service API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all();

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn send_email(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SendEmailRequest>,
) -> Result<impl IntoResponse, DispatchError> {
    validate_send_email(&body)?;
    let result = state.email.send_email(body).await?;

    Ok(Json(ApiResponse::success(result, "Email sent successfully")))
}

async fn send_template_email(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SendTemplateEmailRequest>,
) -> Result<impl IntoResponse, DispatchError> {
    validate_send_template_email(&body)?;
    let result = state.email.send_template_email(body).await?;

    Ok(Json(ApiResponse::success(
        result,
        "Template email sent successfully",
    )))
}

async fn send_bulk(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SendBulkRequest>,
) -> Result<impl IntoResponse, DispatchError> {
    validate_send_bulk(&body)?;
    let result = state.email.send_bulk_emails(body).await?;

    Ok(Json(ApiResponse::success(
        result,
        "Bulk emails sent successfully",
    )))
}

async fn send_dynamic_template(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SendDynamicTemplateRequest>,
) -> Result<impl IntoResponse, DispatchError> {
    validate_send_dynamic_template(&body)?;
    let result = state.email.send_dynamic_template(body).await?;

    Ok(Json(ApiResponse::success(
        result,
        "Dynamic template email sent successfully",
    )))
}

async fn send_bulk_cached(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SendBulkCachedRequest>,
) -> Result<impl IntoResponse, DispatchError> {
    validate_send_bulk_cached(&body)?;
    let outcome = state.dispatcher.send_bulk(body.into()).await?;

    let (status, message) = if outcome.is_queued() {
        (StatusCode::ACCEPTED, "Bulk emails queued for processing")
    } else {
        (StatusCode::OK, "Bulk emails sent successfully")
    };

    Ok((status, Json(ApiResponse::success(outcome, message))))
}

async fn queue_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = StatsResponse {
        queue: state.dispatcher.queue_stats(),
        cache: state.dispatcher.cache_stats(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    Json(ApiResponse::success(stats, "Queue statistics"))
}

async fn queue_item_status(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<String>,
) -> Response {
    match state.dispatcher.queue_item_status(&queue_id) {
        Some(report) => Json(ApiResponse::success(report, "Queue item status")).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": format!("Queue item {} not found", queue_id),
            })),
        )
            .into_response(),
    }
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.dispatcher.clear_cache();

    Json(ApiResponse::message("Template cache cleared successfully"))
}

async fn warm_up_cache(
    State(state): State<Arc<AppState>>,
    body: Result<Json<WarmUpRequest>, JsonRejection>,
) -> Result<impl IntoResponse, DispatchError> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => WarmUpRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let names = body.template_names.unwrap_or_default();

    let report = state
        .dispatcher
        .warm_up_cache(&names, &body.template_data)?;

    Ok(Json(ApiResponse::success(
        report,
        "Template cache warmed up successfully",
    )))
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": format!("Endpoint {} {} not found", method, uri),
            "availableEndpoints": {
                "health": "GET /health",
                "sendEmail": "POST /api/v1/email/send",
                "sendTemplate": "POST /api/v1/email/send-template",
                "sendBulk": "POST /api/v1/email/send-bulk",
                "sendDynamicTemplate": "POST /api/v1/email/send-dynamic-template",
                "sendBulkCached": "POST /api/v1/email/queued/send-bulk-cached",
                "queueStats": "GET /api/v1/email/queued/stats",
                "queueItem": "GET /api/v1/email/queued/items/{id}",
            },
        })),
    )
}
