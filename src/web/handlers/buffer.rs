//! Buffer configuration HTTP handler

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use crate::buffer::{compute_buffer_config, compute_health_score};
use crate::models::{BufferConfiguration, BufferHealthScore, BufferObservation, DeviceClass, NetworkProfile};
use crate::web::{
    AppState,
    extractors::{AuthenticatedUser, RequestContext},
    responses::{handle_error, ok},
};

/// How long a computed configuration stays valid before clients should
/// request a fresh one
const CONFIG_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BufferConfigBody {
    pub network_profile: NetworkProfile,
    pub device_type: DeviceClass,
    /// Optional current buffer observation; when present the response
    /// carries a health score alongside the configuration
    #[serde(default)]
    pub observation: Option<BufferObservation>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BufferConfigResponse {
    pub configuration: BufferConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_score: Option<BufferHealthScore>,
    pub expires_at: DateTime<Utc>,
}

/// Compute the optimal buffer configuration for the caller
#[utoipa::path(
    post,
    path = "/buffer/config",
    request_body = BufferConfigBody,
    responses(
        (status = 200, description = "Computed configuration", body = BufferConfigResponse),
        (status = 400, description = "Invalid network profile"),
    ),
    tag = "buffer"
)]
pub async fn buffer_config(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Json(body): Json<BufferConfigBody>,
) -> impl IntoResponse {
    let result = async {
        let tier = state.subscribers.subscription_tier(user.user_id).await?;
        compute_buffer_config(
            &state.config.buffer,
            &body.network_profile,
            body.device_type,
            tier.is_premium(),
        )
    }
    .await;

    match result {
        Ok(configuration) => {
            state.observability.buffer_configs_computed.add(1, &[]);
            let health_score = body.observation.as_ref().map(compute_health_score);
            ok(
                BufferConfigResponse {
                    configuration,
                    health_score,
                    expires_at: Utc::now()
                        + chrono::Duration::from_std(CONFIG_TTL)
                            .unwrap_or_else(|_| chrono::Duration::minutes(5)),
                },
                context.request_id,
            )
        }
        Err(err) => handle_error(err, context.request_id),
    }
}
