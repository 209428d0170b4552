use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Money in minor units (euro cents).
pub type Cents = i64;

pub const HOUR_MS: Ms = 3_600_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Validating constructor for untrusted input. Zero-length and inverted
    /// ranges are rejected.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// `NOT (a.end <= b.start OR a.start >= b.end)`. Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Manager,
    Admin,
}

impl Role {
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Role::Customer),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Identity of the caller, produced by the upstream auth gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Ulid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Ulid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Owner of the booking, or a manager/admin.
    pub fn may_act_on(&self, owner: Ulid) -> bool {
        self.user_id == owner || self.role.is_elevated()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceKind {
    Desk,
    Meeting,
    Office,
    Phone,
    Event,
}

impl SpaceKind {
    pub const ALL: [SpaceKind; 5] = [
        SpaceKind::Desk,
        SpaceKind::Meeting,
        SpaceKind::Office,
        SpaceKind::Phone,
        SpaceKind::Event,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desk" => Some(SpaceKind::Desk),
            "meeting" | "meeting_room" => Some(SpaceKind::Meeting),
            "office" | "private_office" => Some(SpaceKind::Office),
            "phone" | "phone_booth" => Some(SpaceKind::Phone),
            "event" => Some(SpaceKind::Event),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpaceKind::Desk => "desk",
            SpaceKind::Meeting => "meeting",
            SpaceKind::Office => "office",
            SpaceKind::Phone => "phone",
            SpaceKind::Event => "event",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Canonical services representation: trimmed, non-empty, deduplicated tags.
pub type Services = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: Ulid,
    pub name: String,
    pub city: String,
    pub address: String,
    pub services: Services,
}

impl Location {
    pub fn key(&self) -> LocationKey {
        LocationKey::new(&self.name, &self.city, &self.address)
    }
}

/// Uniqueness key for locations: (name, city, address), trimmed and case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationKey(String, String, String);

impl LocationKey {
    pub fn new(name: &str, city: &str, address: &str) -> Self {
        Self(fold(name), fold(city), fold(address))
    }
}

/// Uniqueness key for spaces: (location, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpaceKey(Ulid, String);

impl SpaceKey {
    pub fn new(location_id: Ulid, name: &str) -> Self {
        Self(location_id, fold(name))
    }
}

pub(crate) fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: Ulid,
    pub location_id: Ulid,
    pub name: String,
    pub kind: SpaceKind,
    pub price_per_hour: Cents,
    pub capacity: u32,
}

impl Space {
    pub fn key(&self) -> SpaceKey {
        SpaceKey::new(self.location_id, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub space_id: Ulid,
    pub user_id: Ulid,
    pub span: Span,
    pub payment_status: PaymentStatus,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub price: Option<Cents>,
    pub note: Option<String>,
}

impl Booking {
    /// Non-cancelled bookings hold their slot, paid or not.
    pub fn is_blocking(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

/// In-memory state of one space: its record plus every booking made on it,
/// sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct SpaceState {
    pub space: Space,
    pub bookings: Vec<Booking>,
    /// Set under the write lock when the space is deleted, so writers that
    /// raced the deletion and still hold the `Arc` fail instead of inserting.
    pub deleted: bool,
}

impl SpaceState {
    pub fn new(space: Space) -> Self {
        Self {
            space,
            bookings: Vec::new(),
            deleted: false,
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Overlapping bookings that still hold their slot.
    pub fn blocking(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        self.overlapping(query).filter(|b| b.is_blocking())
    }
}

/// The event types. This is the WAL record format; multi-row writes are a
/// single record so they commit or vanish together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    LocationCreated {
        location: Location,
        spaces: Vec<Space>,
    },
    LocationUpdated {
        location: Location,
    },
    LocationDeleted {
        id: Ulid,
    },
    SpacesCreated {
        location_id: Ulid,
        spaces: Vec<Space>,
    },
    SpaceUpdated {
        space: Space,
    },
    SpaceDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    PaymentStatusSet {
        id: Ulid,
        space_id: Ulid,
        payment_status: PaymentStatus,
    },
    BookingCancelled {
        id: Ulid,
        space_id: Ulid,
    },
}

// ── Query helpers ───────────────────────────────────────────

/// Pagination for admin listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: crate::limits::DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}
