//! Wire types. Timestamps are RFC 3339, money is a decimal amount of
//! currency units; the engine works in unix milliseconds and cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::engine::{
    Counts, LocationDraft, LocationPatch, SpaceDraft, SpacePatch, SpaceReport, normalize_services,
};
use crate::model::*;

pub fn to_ms(t: &DateTime<Utc>) -> Ms {
    t.timestamp_millis()
}

pub fn from_ms(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub fn span_of(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<Span, crate::engine::EngineError> {
    Span::try_new(to_ms(start), to_ms(end))
}

pub fn to_cents(units: f64) -> Cents {
    (units * 100.0).round() as Cents
}

pub fn from_cents(cents: Cents) -> f64 {
    cents as f64 / 100.0
}

// ── Requests ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBooking {
    pub space_id: Ulid,
    #[serde(alias = "start_ts")]
    pub start: DateTime<Utc>,
    #[serde(alias = "end_ts")]
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Window {
    #[serde(alias = "start_ts")]
    pub start: DateTime<Utc>,
    #[serde(alias = "end_ts")]
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location_id: Option<Ulid>,
}

#[derive(Debug, Deserialize)]
pub struct SpaceWindow {
    pub space_id: Ulid,
    #[serde(alias = "start_ts")]
    pub start: DateTime<Utc>,
    #[serde(alias = "end_ts")]
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    #[serde(default)]
    pub user_id: Option<Ulid>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let default = Page::default();
        Page {
            limit: self.limit.unwrap_or(default.limit),
            offset: self.offset.unwrap_or(default.offset),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentUpdate {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct LocationsQuery {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    #[serde(default)]
    pub services: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub services: Value,
}

impl From<LocationInput> for LocationDraft {
    fn from(input: LocationInput) -> Self {
        LocationDraft {
            name: input.name,
            city: input.city,
            address: input.address,
            services: normalize_services(&input.services),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationUpdate {
    pub name: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub services: Option<Value>,
}

impl From<LocationUpdate> for LocationPatch {
    fn from(input: LocationUpdate) -> Self {
        LocationPatch {
            name: input.name,
            city: input.city,
            address: input.address,
            services: input.services.as_ref().map(normalize_services),
        }
    }
}

fn default_capacity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SpaceInput {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    #[serde(default)]
    pub price_per_hour: f64,
}

impl From<SpaceInput> for SpaceDraft {
    fn from(input: SpaceInput) -> Self {
        SpaceDraft {
            name: input.name,
            kind: input.kind,
            capacity: input.capacity,
            price_per_hour: to_cents(input.price_per_hour),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SpaceUpdate {
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
    pub capacity: Option<i64>,
    pub price_per_hour: Option<f64>,
}

impl From<SpaceUpdate> for SpacePatch {
    fn from(input: SpaceUpdate) -> Self {
        SpacePatch {
            name: input.name,
            kind: input.kind,
            capacity: input.capacity,
            price_per_hour: input.price_per_hour.map(to_cents),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SpacesInput {
    #[serde(default)]
    pub spaces: Vec<SpaceInput>,
}

#[derive(Debug, Deserialize)]
pub struct WizardInput {
    #[serde(default)]
    pub location: LocationInput,
    #[serde(default)]
    pub spaces: Vec<SpaceInput>,
}

impl WizardInput {
    pub fn into_drafts(self) -> (LocationDraft, Vec<SpaceDraft>) {
        (
            self.location.into(),
            self.spaces.into_iter().map(SpaceDraft::from).collect(),
        )
    }
}

// ── Responses ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub id: Ulid,
    pub space_id: Ulid,
    pub user_id: Ulid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub price: Option<f64>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        BookingView {
            id: b.id,
            space_id: b.space_id,
            user_id: b.user_id,
            start: from_ms(b.span.start),
            end: from_ms(b.span.end),
            status: b.status,
            payment_status: b.payment_status,
            price: b.price.map(from_cents),
            note: b.note,
            created_at: from_ms(b.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpaceView {
    pub id: Ulid,
    pub location_id: Ulid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SpaceKind,
    pub capacity: u32,
    pub price_per_hour: f64,
}

impl From<Space> for SpaceView {
    fn from(s: Space) -> Self {
        SpaceView {
            id: s.id,
            location_id: s.location_id,
            name: s.name,
            kind: s.kind,
            capacity: s.capacity,
            price_per_hour: from_cents(s.price_per_hour),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpanView {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<Span> for SpanView {
    fn from(s: Span) -> Self {
        SpanView {
            start: from_ms(s.start),
            end: from_ms(s.end),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingPage {
    pub items: Vec<BookingView>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct WizardCommitted {
    pub ok: bool,
    pub location: Location,
    pub spaces: Vec<SpaceView>,
}

#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub location_id: Ulid,
    pub location: String,
    pub space_id: Ulid,
    pub space: String,
    pub bookings: usize,
    pub revenue: f64,
}

impl From<SpaceReport> for ReportRow {
    fn from(r: SpaceReport) -> Self {
        ReportRow {
            location_id: r.location_id,
            location: r.location,
            space_id: r.space_id,
            space: r.space,
            bookings: r.bookings,
            revenue: from_cents(r.revenue),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsView {
    pub locations_count: usize,
    pub spaces_count: usize,
    pub bookings_count: usize,
}

impl From<Counts> for MetricsView {
    fn from(c: Counts) -> Self {
        MetricsView {
            locations_count: c.locations,
            spaces_count: c.spaces,
            bookings_count: c.bookings,
        }
    }
}

/// Suggested values for a new wizard form.
#[derive(Debug, Serialize)]
pub struct WizardPrefill {
    pub services_catalog: &'static [&'static str],
    pub space_types: Vec<SpaceKind>,
    pub defaults: SpaceDefaults,
}

#[derive(Debug, Serialize)]
pub struct SpaceDefaults {
    pub price_per_hour: f64,
    pub capacity: i64,
}

pub fn views<T, V: From<T>>(items: Vec<T>) -> Vec<V> {
    items.into_iter().map(V::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_converts_at_two_decimals() {
        assert_eq!(to_cents(10.0), 1_000);
        assert_eq!(to_cents(12.345), 1_235);
        assert_eq!(from_cents(2_000), 20.0);
    }

    #[test]
    fn booking_accepts_ts_aliases() {
        let body = r#"{
            "space_id": "01J0000000000000000000000A",
            "start_ts": "2026-01-01T10:00:00Z",
            "end_ts": "2026-01-01T12:00:00+01:00"
        }"#;
        let req: CreateBooking = serde_json::from_str(body).unwrap();
        let span = span_of(&req.start, &req.end).unwrap();
        assert_eq!(span.duration_ms(), HOUR_MS);
    }

    #[test]
    fn space_input_defaults_and_type_field() {
        let input: SpaceInput =
            serde_json::from_str(r#"{"name": "Sala Volta", "type": "meeting_room", "price_per_hour": 25.5}"#)
                .unwrap();
        let draft = SpaceDraft::from(input);
        assert_eq!(draft.capacity, 1);
        assert_eq!(draft.price_per_hour, 2_550);
        assert_eq!(draft.kind, "meeting_room");
    }

    #[test]
    fn location_services_are_normalized() {
        let input: LocationInput = serde_json::from_str(
            r#"{"name": "Hub", "city": "Torino", "address": "Via Po 1", "services": "wifi, Coffee"}"#,
        )
        .unwrap();
        let draft = LocationDraft::from(input);
        assert_eq!(
            draft.services.into_iter().collect::<Vec<_>>(),
            vec!["coffee".to_string(), "wifi".to_string()]
        );
    }
}
