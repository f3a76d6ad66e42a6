//! REST surface over the storefront and admin services.
//!
//! Identity comes from the auth gateway in front of this service:
//! `x-user-id` for signed-in shoppers, `x-device-id` for anonymous ones, and
//! `x-user-role: admin` for the admin routes.

mod admin;
mod shop;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::notify::Severity;
use crate::session::{Identity, SessionRegistry};
use crate::store::StoreError;
use crate::StorefrontError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const DEVICE_ID_HEADER: &str = "x-device-id";
pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self { Self { registry: Arc::new(registry) } }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .nest("/api/v1", shop::routes())
        .nest("/api/v1/admin", admin::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Storefront(StorefrontError),
    Forbidden,
}

impl From<StorefrontError> for ApiError {
    fn from(e: StorefrontError) -> Self { ApiError::Storefront(e) }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    severity: Severity,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let e = match self {
            ApiError::Forbidden => return StatusCode::FORBIDDEN,
            ApiError::Storefront(e) => e,
        };
        match e {
            StorefrontError::Validation(_)
            | StorefrontError::InvalidInput(_)
            | StorefrontError::Coupon(_)
            | StorefrontError::Transition(_)
            | StorefrontError::InvalidQuantity
            | StorefrontError::EmptyCart => StatusCode::BAD_REQUEST,
            StorefrontError::NotFound { .. } | StorefrontError::ItemNotFound | StorefrontError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            StorefrontError::DuplicateReview | StorefrontError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            StorefrontError::NotEligibleToReview | StorefrontError::Store(StoreError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
            StorefrontError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            StorefrontError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, severity) = if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
            ("Something went wrong, please try again".to_string(), Severity::Error)
        } else {
            let message = match &self {
                ApiError::Forbidden => "Admin access required".to_string(),
                ApiError::Storefront(e) => e.to_string(),
            };
            (message, Severity::Warning)
        };
        (status, Json(ErrorBody { message, severity })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Extractors
// =============================================================================

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

fn user_id(parts: &Parts) -> Result<Option<Uuid>, ApiError> {
    header(parts, USER_ID_HEADER)
        .map(|raw| raw.parse::<Uuid>().map_err(|_| ApiError::from(StorefrontError::InvalidInput(format!("invalid {USER_ID_HEADER} header")))))
        .transpose()
}

/// Who is calling: a signed-in user or an anonymous device.
pub struct Shopper(pub Identity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Shopper {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = user_id(parts)? {
            return Ok(Shopper(Identity::authenticated(user_id)));
        }
        match header(parts, DEVICE_ID_HEADER) {
            Some(device_id) => Ok(Shopper(Identity::anonymous(device_id)?)),
            None => Err(StorefrontError::AuthenticationRequired.into()),
        }
    }
}

/// A signed-in user with the admin role.
pub struct Admin(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = user_id(parts)?.ok_or(StorefrontError::AuthenticationRequired)?;
        if !header(parts, ROLE_HEADER).is_some_and(|r| r.eq_ignore_ascii_case("admin")) {
            return Err(ApiError::Forbidden);
        }
        Ok(Admin(user_id))
    }
}
