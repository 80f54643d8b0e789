use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub checks: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(size: usize) -> Self {
        Self {
            status: HealthStatus::Healthy,
            size: Some(size),
            processing: None,
            error: None,
        }
    }

    pub fn degraded(size: usize, error: String) -> Self {
        Self {
            status: HealthStatus::Degraded,
            size: Some(size),
            processing: None,
            error: Some(error),
        }
    }

    pub fn unhealthy(size: usize, error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            size: Some(size),
            processing: None,
            error: Some(error),
        }
    }

    pub fn with_processing(mut self, processing: bool) -> Self {
        self.processing = Some(processing);
        self
    }
}
