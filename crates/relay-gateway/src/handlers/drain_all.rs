use crate::state::GatewayState;
use crate::ApiError;
use axum::extract::State;
use tracing::info;

pub const DRAIN_ALL_ENDPOINT: &str = "/drain-all";

/// Ask every known queue to drain without waiting for the passes.
pub async fn drain_all(State(state): State<GatewayState>) -> Result<&'static str, ApiError> {
    let queues = state.manager.request_drain_all().await?;
    info!(queues, "Drain requested for all queues");
    Ok("drain triggered")
}
