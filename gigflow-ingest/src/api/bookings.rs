//! Booking API handlers
//!
//! Authenticated surface for musicians: manual entry, edits, lifecycle actions,
//! conflict queries and the review queue. Conflict reports are computed per
//! request and never cached.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflicts::ConflictReport;
use crate::db::users::{self, User};
use crate::error::{ApiError, ApiResult};
use crate::lifecycle::Action;
use crate::models::{Booking, BookingUpdate};
use crate::services::{ActionInput, ActionOutcome, BookingDetail, BookingWithConflicts, ManualBooking};
use crate::AppState;

/// POST /bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<ManualBooking>,
) -> ApiResult<(StatusCode, Json<BookingWithConflicts>)> {
    let created = state.bookings.create_manual(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BookingDetail>> {
    Ok(Json(state.bookings.detail(id).await?))
}

/// PATCH /bookings/:id
pub async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<BookingUpdate>,
) -> ApiResult<Json<BookingWithConflicts>> {
    Ok(Json(state.bookings.update(id, update).await?))
}

/// GET /bookings/:id/conflicts
pub async fn get_conflicts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConflictReport>> {
    Ok(Json(state.bookings.conflicts(id).await?))
}

/// POST /bookings/:id/conflicts/:other_id/resolve
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Path((id, other_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ConflictReport>> {
    Ok(Json(state.bookings.resolve_conflict(id, other_id).await?))
}

/// POST /bookings/:id/actions/:action
///
/// Body is optional; `send-invoice` needs `amountMinor`, `mark-paid` needs
/// `invoiceId`.
pub async fn apply_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(Uuid, String)>,
    input: Option<Json<ActionInput>>,
) -> ApiResult<Json<ActionOutcome>> {
    let action: Action = action.parse()?;
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let outcome = state
        .bookings
        .apply_action(id, action, input, Utc::now().date_naive())
        .await?;
    Ok(Json(outcome))
}

/// POST /bookings/:id/review
pub async fn mark_reviewed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.bookings.mark_reviewed(id).await?))
}

/// POST /bookings/:id/reparse
pub async fn reparse_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.pipeline.reparse(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub needs_review: bool,
}

/// GET /users/:user_id/bookings?needs_review=true
pub async fn list_bookings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Booking>>> {
    Ok(Json(state.bookings.list(&user_id, query.needs_review).await?))
}

/// POST /users request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub id: String,
    pub name: String,
    pub routing_prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user: User,
}

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreateUserResponse>)> {
    let id = request.id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("id must not be empty".to_string()));
    }
    let routing_prefix = request
        .routing_prefix
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty());
    if let Some(prefix) = &routing_prefix {
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.') {
            return Err(ApiError::BadRequest(format!("Invalid routing prefix: {}", prefix)));
        }
    }

    let user = User {
        id: id.to_string(),
        name: request.name.trim().to_string(),
        routing_prefix,
        is_triage: false,
    };
    users::create_user(&state.db, &user).await?;
    tracing::info!(user_id = %user.id, routing_prefix = ?user.routing_prefix, "Registered user");
    Ok((StatusCode::CREATED, Json(CreateUserResponse { user })))
}

/// Build booking and user routes
pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking).patch(update_booking))
        .route("/bookings/:id/conflicts", get(get_conflicts))
        .route("/bookings/:id/conflicts/:other_id/resolve", post(resolve_conflict))
        .route("/bookings/:id/actions/:action", post(apply_action))
        .route("/bookings/:id/review", post(mark_reviewed))
        .route("/bookings/:id/reparse", post(reparse_booking))
        .route("/users", post(create_user))
        .route("/users/:user_id/bookings", get(list_bookings))
}
