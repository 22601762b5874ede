//! Request extractors
//!
//! Correlation context and bearer authentication. Token issuance is owned
//! by the external identity service; the extractor only verifies signature
//! and expiry and yields the caller's user id.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::web::AppState;
use crate::web::responses::handle_error;

/// Correlation context attached to every request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .unwrap_or_else(Uuid::new_v4);

        let client_ip = parts
            .headers
            .get("x-forwarded-for")
            .or_else(|| parts.headers.get("x-real-ip"))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());

        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            request_id,
            client_ip,
            user_agent,
        })
    }
}

/// The authenticated caller, extracted from the bearer token
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = RequestContext::from_request_parts(parts, state)
            .await
            .expect("RequestContext extraction is infallible");

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    handle_error(
                        AppError::unauthenticated("Missing bearer token"),
                        context.request_id,
                    )
                    .into_response()
                })?;

        let user_id = state
            .token_verifier
            .verify(bearer.token(), Utc::now())
            .map_err(|err| handle_error(err, context.request_id).into_response())?;

        Ok(Self { user_id })
    }
}
