use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Validation error")]
    Validation(Vec<FieldError>),

    #[error("Template \"{0}\" not found")]
    TemplateNotFound(String),

    #[error("{message}")]
    Provider {
        status_code: u16,
        message: String,
        details: Option<Vec<JsonValue>>,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    /// Maps a failed provider call onto the uniform provider error.
    ///
    /// `code` is the HTTP status the provider answered with, or `None` when the
    /// request never got a response. Client errors keep their status; anything
    /// else is reported as 500.
    pub fn from_provider(
        code: Option<u16>,
        fallback_message: impl Into<String>,
        details: Option<Vec<JsonValue>>,
    ) -> Self {
        let message = code
            .and_then(provider_message)
            .map(str::to_string)
            .unwrap_or_else(|| fallback_message.into());

        let status_code = match code {
            Some(code) if (400..500).contains(&code) => code,
            _ => 500,
        };

        DispatchError::Provider {
            status_code,
            message,
            details,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Provider { status_code, .. } => {
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            DispatchError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operational errors are expected failures whose message is safe to show
    /// to the caller.
    pub fn is_operational(&self) -> bool {
        !matches!(self, DispatchError::Serialization(_))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Provider { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            _ => false,
        }
    }

    pub fn details(&self) -> Option<&[JsonValue]> {
        match self {
            DispatchError::Provider { details, .. } => details.as_deref(),
            _ => None,
        }
    }
}

impl From<JsonRejection> for DispatchError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        let field = rejected_field(&message).unwrap_or("body").to_string();

        DispatchError::Validation(vec![FieldError::new(field, message)])
    }
}

/// Field named by serde's "missing field `x`" message.
fn rejected_field(message: &str) -> Option<&str> {
    let (_, rest) = message.split_once("missing field `")?;
    rest.split_once('`').map(|(field, _)| field)
}

fn provider_message(code: u16) -> Option<&'static str> {
    let message = match code {
        400 => "Bad Request - Invalid email data",
        401 => "Unauthorized - Invalid API key",
        403 => "Forbidden - Insufficient permissions",
        413 => "Payload Too Large - Email too large",
        429 => "Too Many Requests - Rate limit exceeded",
        500 => "Internal Server Error - SendGrid issue",
        502 => "Bad Gateway - SendGrid temporarily unavailable",
        503 => "Service Unavailable - SendGrid maintenance",
        _ => return None,
    };
    Some(message)
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [JsonValue]>,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if self.is_operational() {
            self.to_string()
        } else {
            error!(error = %self, "Unexpected error while handling request");
            "Something went wrong!".to_string()
        };

        let errors = match &self {
            DispatchError::Validation(errors) => Some(errors.as_slice()),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            message,
            errors,
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}
