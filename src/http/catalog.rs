//! Location and space API endpoints, including the admin setup wizard

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

use crate::engine::{LocationDraft, LocationFilter, SpaceDraft, normalize_services};
use crate::model::{Location, SpaceKind};

use super::dto::{self, SpaceDefaults, SpaceView, SpanView, WizardCommitted, WizardPrefill};
use super::{ApiError, AppState, Caller};

// ── Availability ────────────────────────────────────────────────

pub async fn available_spaces(
    State(state): State<AppState>,
    query: Result<Query<dto::Window>, QueryRejection>,
) -> Result<Json<Vec<SpaceView>>, ApiError> {
    let Query(query) = query?;
    let span = dto::span_of(&query.start, &query.end)?;
    let spaces = state
        .engine
        .available_spaces(span, query.location_id)
        .await?;
    Ok(Json(dto::views(spaces)))
}

pub async fn available_locations(
    State(state): State<AppState>,
    query: Result<Query<dto::Window>, QueryRejection>,
) -> Result<Json<Vec<Location>>, ApiError> {
    let Query(query) = query?;
    let span = dto::span_of(&query.start, &query.end)?;
    Ok(Json(state.engine.available_locations(span).await?))
}

/// Free sub-intervals of the window on one space
pub async fn free_windows(
    State(state): State<AppState>,
    path: Result<Path<Ulid>, PathRejection>,
    query: Result<Query<dto::Window>, QueryRejection>,
) -> Result<Json<Vec<SpanView>>, ApiError> {
    let Path(id) = path?;
    let Query(query) = query?;
    let span = dto::span_of(&query.start, &query.end)?;
    let free = state.engine.free_windows(id, span).await?;
    Ok(Json(dto::views(free)))
}

// ── Spaces ──────────────────────────────────────────────────────

pub async fn get_space(
    State(state): State<AppState>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<SpaceView>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.engine.get_space(id).await?.into()))
}

pub async fn update_space(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Ulid>, PathRejection>,
    payload: Result<Json<dto::SpaceUpdate>, JsonRejection>,
) -> Result<Json<SpaceView>, ApiError> {
    let Path(id) = path?;
    caller.elevated()?;
    let Json(req) = payload?;
    let space = state.engine.update_space(id, req.into()).await?;
    Ok(Json(space.into()))
}

pub async fn delete_space(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    caller.elevated()?;
    state.engine.delete_space(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Locations ───────────────────────────────────────────────────

/// Public catalog listing. `services` is a comma separated list, all required.
pub async fn list_locations(
    State(state): State<AppState>,
    query: Result<Query<dto::LocationsQuery>, QueryRejection>,
) -> Result<Json<Vec<Location>>, ApiError> {
    let Query(query) = query?;
    let kind = match query.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(raw) => Some(
            SpaceKind::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown space type: {raw}")))?,
        ),
        None => None,
    };
    let filter = LocationFilter {
        city: query.city,
        kind,
        services: query
            .services
            .map(|s| normalize_services(&Value::String(s)))
            .unwrap_or_default(),
    };
    Ok(Json(state.engine.list_locations(&filter).await))
}

pub async fn create_location(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<dto::LocationInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Location>), ApiError> {
    caller.elevated()?;
    let Json(req) = payload?;
    let location = state.engine.create_location(req.into()).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn get_location(
    State(state): State<AppState>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<Location>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.engine.get_location(id).await?))
}

pub async fn update_location(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Ulid>, PathRejection>,
    payload: Result<Json<dto::LocationUpdate>, JsonRejection>,
) -> Result<Json<Location>, ApiError> {
    let Path(id) = path?;
    caller.elevated()?;
    let Json(req) = payload?;
    Ok(Json(state.engine.update_location(id, req.into()).await?))
}

/// Removes the location together with its spaces and their bookings
pub async fn delete_location(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    caller.elevated()?;
    state.engine.delete_location(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn location_spaces(
    State(state): State<AppState>,
    path: Result<Path<Ulid>, PathRejection>,
) -> Result<Json<Vec<SpaceView>>, ApiError> {
    let Path(id) = path?;
    let spaces = state.engine.spaces_for_location(id).await?;
    Ok(Json(dto::views(spaces)))
}

pub async fn add_spaces(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Ulid>, PathRejection>,
    payload: Result<Json<dto::SpacesInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<SpaceView>>), ApiError> {
    let Path(id) = path?;
    caller.elevated()?;
    let Json(req) = payload?;
    let drafts: Vec<SpaceDraft> = req.spaces.into_iter().map(SpaceDraft::from).collect();
    let spaces = state.engine.create_spaces(id, &drafts).await?;
    Ok((StatusCode::CREATED, Json(dto::views(spaces))))
}

// ── Wizard ──────────────────────────────────────────────────────

fn wizard_drafts(
    caller: Caller,
    payload: Result<Json<dto::WizardInput>, JsonRejection>,
) -> Result<(LocationDraft, Vec<SpaceDraft>), ApiError> {
    caller.elevated()?;
    let Json(req) = payload?;
    Ok(req.into_drafts())
}

/// Service tags the wizard offers before anything is typed.
const SUGGESTED_SERVICES: &[&str] = &[
    "wifi",
    "coffee",
    "printer",
    "lockers",
    "phone-booths",
    "meeting-rooms",
];

pub async fn wizard_prefill(caller: Caller) -> Result<Json<WizardPrefill>, ApiError> {
    caller.elevated()?;
    Ok(Json(WizardPrefill {
        services_catalog: SUGGESTED_SERVICES,
        space_types: SpaceKind::ALL.to_vec(),
        defaults: SpaceDefaults {
            price_per_hour: 10.0,
            capacity: 1,
        },
    }))
}

/// Dry run: same answers as commit, nothing written
pub async fn wizard_validate(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<dto::WizardInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (location, spaces) = wizard_drafts(caller, payload)?;
    state.engine.validate_wizard(&location, &spaces).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn wizard_commit(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<dto::WizardInput>, JsonRejection>,
) -> Result<(StatusCode, Json<WizardCommitted>), ApiError> {
    let (location, spaces) = wizard_drafts(caller, payload)?;
    let (location, spaces) = state.engine.commit_wizard(&location, &spaces).await?;
    Ok((
        StatusCode::CREATED,
        Json(WizardCommitted {
            ok: true,
            location,
            spaces: dto::views(spaces),
        }),
    ))
}
