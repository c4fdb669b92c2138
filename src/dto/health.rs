use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when the store answers, "degraded" otherwise.
    pub status: String,
    /// Supervisors currently running on this instance.
    pub active_supervisors: usize,
}

impl HealthResponse {
    pub fn new(healthy: bool, active_supervisors: usize) -> Self {
        let status = if healthy { "ok" } else { "degraded" };
        Self {
            status: status.to_string(),
            active_supervisors,
        }
    }
}
