//! API service routes

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use laundry::{BookingDraft, NoticeDraft, SlotDraft};
use serde::Deserialize;
use serde_json::json;

use crate::{error::ApiResult, state::AppState};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let washing_machine = Router::new()
        .route("/slots", get(list_slots).post(create_slot))
        .route("/slots/full-day", post(create_full_day))
        .route("/slots/expired", delete(delete_expired_slots))
        .route("/slot/:id/toggle", put(toggle_slot))
        .route("/slot/:id", delete(delete_slot))
        .route("/book", post(book_slot))
        .route("/cancel/:id", put(cancel_booking))
        .route("/students/:id/bookings", get(student_bookings))
        .route("/send-booking-notification", post(send_booking_notification));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/washing-machine", washing_machine)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct FullDayRequest {
    pub booking_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub student_id: Option<i64>,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

/// All slots with the booking student's name
pub async fn list_slots(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let slots = state.booking.list_slots().await?;
    Ok(Json(slots))
}

pub async fn create_slot(
    State(state): State<AppState>,
    payload: Result<Json<SlotDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(draft) = payload?;
    let id = state.booking.create_slot(draft).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// Open one slot per roster hour on a date
pub async fn create_full_day(
    State(state): State<AppState>,
    payload: Result<Json<FullDayRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let created = state
        .booking
        .create_full_day(request.booking_date.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "created": created }))))
}

pub async fn delete_expired_slots(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let deleted = state.booking.delete_expired_slots().await?;

    Ok(Json(json!({
        "message": "Expired slots deleted successfully",
        "deletedCount": deleted,
    })))
}

pub async fn toggle_slot(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let open = state.booking.toggle_slot(id).await?;
    let message = if open { "Slot opened" } else { "Slot closed" };

    Ok(Json(json!({
        "message": message,
        "is_slot_open": open,
    })))
}

pub async fn delete_slot(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    state.booking.delete_slot(id).await?;

    Ok(Json(json!({
        "message": "Slot deleted successfully",
        "deletedId": id,
    })))
}

/// Book a slot; the confirmation message is sent in the background
pub async fn book_slot(
    State(state): State<AppState>,
    payload: Result<Json<BookingDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(draft) = payload?;
    let booking = state.booking.book_slot(draft).await?;

    Ok(Json(json!({
        "message": "Slot booked successfully",
        "student_name": booking.student.name,
    })))
}

/// Cancel a booking; an optional `student_id` in the body must match the holder
pub async fn cancel_booking(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Option<Json<CancelRequest>>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    state.booking.cancel_booking(id, request.student_id).await?;

    Ok(Json(json!({
        "message": "Booking cancelled successfully",
        "slot_id": id,
    })))
}

pub async fn student_bookings(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let slots = state.booking.student_bookings(id).await?;
    Ok(Json(slots))
}

pub async fn send_booking_notification(
    State(state): State<AppState>,
    payload: Result<Json<NoticeDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(draft) = payload?;
    state.booking.send_booking_notice(draft).await?;

    Ok(Json(json!({
        "success": true,
        "message": "WhatsApp notification sent successfully",
    })))
}
