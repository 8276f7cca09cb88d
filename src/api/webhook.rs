//! WhatsApp webhook endpoints

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::channels::WebhookEvent;

/// Subscription verification query parameters
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Fixed acknowledgment returned for every delivery
#[derive(Serialize)]
pub struct Ack {
    pub status: &'static str,
}

/// `GET /webhook` - platform subscription verification
///
/// Echoes the challenge as an integer when the mode is `subscribe` and the
/// token matches; any other combination (including a non-integer challenge)
/// fails verification.
pub async fn verify(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let token_matches = params.mode.as_deref() == Some("subscribe")
        && params.verify_token.as_deref() == Some(state.verify_token.as_str());

    if token_matches {
        if let Some(challenge) = params
            .challenge
            .as_deref()
            .and_then(|c| c.parse::<i64>().ok())
        {
            return Json(challenge).into_response();
        }
    }

    tracing::warn!("webhook verification failed");
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "error": "Verification failed" })),
    )
        .into_response()
}

/// `POST /webhook` - event delivery
///
/// Always acknowledges with the same body; the platform redelivers on
/// anything else. Processing runs in a background task, and internal errors
/// end up in the server log only.
pub async fn receive(State(state): State<Arc<ApiState>>, body: Bytes) -> Json<Ack> {
    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => {
            tokio::spawn(async move {
                match state.router.route(&event).await {
                    Ok(outcome) => tracing::debug!(?outcome, "event processed"),
                    Err(e) => tracing::error!(error = %e, "event processing failed"),
                }
            });
        }
        Err(e) => tracing::warn!(error = %e, "discarding malformed webhook payload"),
    }

    Json(Ack { status: "ok" })
}
