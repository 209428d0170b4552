//! Booking API endpoints

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde_json::{Value, json};
use ulid::Ulid;

use super::dto::{self, BookingPage, BookingView};
use super::{ApiError, AppState, Caller};

/// Handle requests for creating a booking for the caller
pub async fn create(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    payload: Result<Json<dto::CreateBooking>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingView>), ApiError> {
    let Json(req) = payload?;
    let span = dto::span_of(&req.start, &req.end)?;
    let booking = state
        .engine
        .create_booking(&ctx, req.space_id, span, req.note)
        .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// The caller's bookings, or another user's for managers/admins
pub async fn list(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    query: Result<Query<dto::BookingsQuery>, QueryRejection>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let Query(query) = query?;
    let bookings = state.engine.bookings_for(&ctx, query.user_id).await?;
    Ok(Json(dto::views(bookings)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<BookingView>, ApiError> {
    let Path(id) = path?;
    let booking = state.engine.booking_for(&ctx, id).await?;
    Ok(Json(booking.into()))
}

/// Advisory check; creating the booking re-checks under the lock
pub async fn availability(
    State(state): State<AppState>,
    query: Result<Query<dto::SpaceWindow>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let span = dto::span_of(&query.start, &query.end)?;
    let available = state.engine.is_space_free(query.space_id, span).await?;
    Ok(Json(json!({ "available": available })))
}

/// Mock payment: marks the booking paid right away
pub async fn pay(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<BookingView>, ApiError> {
    let Path(id) = path?;
    let booking = state.engine.confirm_payment(Some(&ctx), id).await?;
    Ok(Json(booking.into()))
}

pub async fn set_payment(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Ulid>, PathRejection>,
    payload: Result<Json<dto::PaymentUpdate>, JsonRejection>,
) -> Result<Json<BookingView>, ApiError> {
    let Path(id) = path?;
    let ctx = caller.elevated()?;
    let Json(req) = payload?;
    let booking = state
        .engine
        .override_payment_status(&ctx, id, req.payment_status)
        .await?;
    Ok(Json(booking.into()))
}

pub async fn cancel(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    state.engine.cancel(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Every booking, most recent first, one page at a time
pub async fn admin_list(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<dto::PageQuery>, QueryRejection>,
) -> Result<Json<BookingPage>, ApiError> {
    caller.elevated()?;
    let Query(query) = query?;
    let page = query.page();
    let items = state.engine.list_all(page).await;
    Ok(Json(BookingPage {
        items: dto::views(items),
        limit: page.limit.clamp(1, crate::limits::MAX_PAGE_LIMIT),
        offset: page.offset,
    }))
}
