use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedSpaceState;

/// State of a uniqueness key. `Reserved` is held by a writer between its
/// check and its durable append; concurrent claimants see the key as taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeySlot {
    Reserved(Ulid),
    Taken(Ulid),
}

impl KeySlot {
    fn holder(self) -> Ulid {
        match self {
            KeySlot::Reserved(id) | KeySlot::Taken(id) => id,
        }
    }
}

/// A claimed uniqueness key. Released on drop unless committed.
pub(crate) struct KeyReservation<'a, K: Eq + Hash + Clone> {
    map: &'a DashMap<K, KeySlot>,
    key: Option<K>,
    id: Ulid,
}

impl<K: Eq + Hash + Clone> KeyReservation<'_, K> {
    pub fn commit(mut self) {
        if let Some(key) = self.key.take() {
            self.map.insert(key, KeySlot::Taken(self.id));
        }
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyReservation<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let id = self.id;
            self.map.remove_if(&key, |_, slot| *slot == KeySlot::Reserved(id));
        }
    }
}

/// Claim `key` for `id` atomically. On failure returns the current holder,
/// committed or in flight.
pub(crate) fn reserve<K: Eq + Hash + Clone>(
    map: &DashMap<K, KeySlot>,
    key: K,
    id: Ulid,
) -> Result<KeyReservation<'_, K>, Ulid> {
    match map.entry(key.clone()) {
        Entry::Occupied(e) => Err(e.get().holder()),
        Entry::Vacant(e) => {
            e.insert(KeySlot::Reserved(id));
            Ok(KeyReservation {
                map,
                key: Some(key),
                id,
            })
        }
    }
}

/// In-memory indexes over committed state. Everything here is derived from
/// the WAL and rebuilt on replay.
pub struct Store {
    spaces: DashMap<Ulid, SharedSpaceState>,
    locations: DashMap<Ulid, Location>,
    pub(crate) location_keys: DashMap<LocationKey, KeySlot>,
    pub(crate) space_keys: DashMap<SpaceKey, KeySlot>,
    /// Location → spaces index.
    location_spaces: DashMap<Ulid, Vec<Ulid>>,
    /// Reverse lookup: booking id → space id.
    booking_to_space: DashMap<Ulid, Ulid>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            spaces: DashMap::new(),
            locations: DashMap::new(),
            location_keys: DashMap::new(),
            space_keys: DashMap::new(),
            location_spaces: DashMap::new(),
            booking_to_space: DashMap::new(),
        }
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn get_space(&self, id: &Ulid) -> Option<SharedSpaceState> {
        self.spaces.get(id).map(|e| e.value().clone())
    }

    pub fn space_handles(&self) -> Vec<SharedSpaceState> {
        self.spaces.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get_location(&self, id: &Ulid) -> Option<Location> {
        self.locations.get(id).map(|e| e.value().clone())
    }

    pub fn locations(&self) -> Vec<Location> {
        self.locations.iter().map(|e| e.value().clone()).collect()
    }

    pub fn location_space_ids(&self, location_id: &Ulid) -> Vec<Ulid> {
        self.location_spaces
            .get(location_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn space_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_space.get(booking_id).map(|e| *e.value())
    }

    pub fn location_for_key(&self, key: &LocationKey) -> Option<Ulid> {
        match self.location_keys.get(key).map(|e| *e.value()) {
            Some(KeySlot::Taken(id)) => Some(id),
            _ => None,
        }
    }

    pub fn space_name_taken(&self, key: &SpaceKey) -> bool {
        self.space_keys.contains_key(key)
    }

    // ── Catalog mutation ─────────────────────────────────────

    pub fn insert_location(&self, location: Location) {
        self.location_keys
            .insert(location.key(), KeySlot::Taken(location.id));
        self.location_spaces.entry(location.id).or_default();
        self.locations.insert(location.id, location);
    }

    /// Replace a location record, moving its uniqueness key if it changed.
    pub fn update_location(&self, location: Location) {
        if let Some(old) = self.locations.get(&location.id).map(|e| e.value().key())
            && old != location.key()
        {
            self.location_keys
                .remove_if(&old, |_, slot| *slot == KeySlot::Taken(location.id));
        }
        self.location_keys
            .insert(location.key(), KeySlot::Taken(location.id));
        self.locations.insert(location.id, location);
    }

    pub fn remove_location(&self, id: &Ulid) -> Option<Location> {
        let (_, location) = self.locations.remove(id)?;
        self.location_keys
            .remove_if(&location.key(), |_, slot| *slot == KeySlot::Taken(*id));
        self.location_spaces.remove(id);
        Some(location)
    }

    pub fn insert_space(&self, space: Space) {
        self.space_keys.insert(space.key(), KeySlot::Taken(space.id));
        self.location_spaces
            .entry(space.location_id)
            .or_default()
            .push(space.id);
        let id = space.id;
        self.spaces
            .insert(id, Arc::new(RwLock::new(SpaceState::new(space))));
    }

    /// Mark a space deleted and drop it from every index, bookings included.
    /// Caller holds the space's write lock.
    pub fn detach_space(&self, ss: &mut SpaceState) {
        ss.deleted = true;
        let id = ss.space.id;
        self.spaces.remove(&id);
        self.space_keys
            .remove_if(&ss.space.key(), |_, slot| *slot == KeySlot::Taken(id));
        if let Some(mut kids) = self.location_spaces.get_mut(&ss.space.location_id) {
            kids.retain(|c| *c != id);
        }
        for booking in &ss.bookings {
            self.booking_to_space.remove(&booking.id);
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply a space-scoped event (no locking; caller holds the write lock).
    pub fn apply_to_space(&self, ss: &mut SpaceState, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                self.booking_to_space.insert(booking.id, booking.space_id);
                ss.insert_booking(booking.clone());
            }
            Event::PaymentStatusSet {
                id, payment_status, ..
            } => {
                if let Some(b) = ss.booking_mut(*id) {
                    b.payment_status = *payment_status;
                    if *payment_status == PaymentStatus::Paid {
                        b.status = BookingStatus::Confirmed;
                    }
                }
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(b) = ss.booking_mut(*id) {
                    b.status = BookingStatus::Cancelled;
                }
            }
            Event::SpaceUpdated { space } => {
                let old = ss.space.key();
                if old != space.key() {
                    self.space_keys
                        .remove_if(&old, |_, slot| *slot == KeySlot::Taken(space.id));
                }
                self.space_keys.insert(space.key(), KeySlot::Taken(space.id));
                ss.space = space.clone();
            }
            Event::SpaceDeleted { .. } => self.detach_space(ss),
            // Catalog events are handled at the map level, not here
            Event::LocationCreated { .. }
            | Event::LocationUpdated { .. }
            | Event::LocationDeleted { .. }
            | Event::SpacesCreated { .. } => {}
        }
    }

    /// Apply an event during startup replay. We're the sole owner of every
    /// `Arc`, so `try_write` always succeeds instantly. Never use
    /// `blocking_write` here because replay may run inside an async context.
    pub fn replay(&self, event: &Event) {
        match event {
            Event::LocationCreated { location, spaces } => {
                self.insert_location(location.clone());
                for space in spaces {
                    self.insert_space(space.clone());
                }
            }
            Event::LocationUpdated { location } => self.update_location(location.clone()),
            Event::LocationDeleted { id } => {
                for space_id in self.location_space_ids(id) {
                    if let Some(rs) = self.get_space(&space_id)
                        && let Ok(mut guard) = rs.try_write()
                    {
                        self.detach_space(&mut guard);
                    }
                }
                self.remove_location(id);
            }
            Event::SpacesCreated { spaces, .. } => {
                for space in spaces {
                    self.insert_space(space.clone());
                }
            }
            other => {
                if let Some(space_id) = event_space_id(other)
                    && let Some(rs) = self.get_space(&space_id)
                    && let Ok(mut guard) = rs.try_write()
                {
                    self.apply_to_space(&mut guard, other);
                }
            }
        }
    }
}

/// Extract the space id from a space-scoped event.
fn event_space_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { booking } => Some(booking.space_id),
        Event::PaymentStatusSet { space_id, .. } | Event::BookingCancelled { space_id, .. } => {
            Some(*space_id)
        }
        Event::SpaceUpdated { space } => Some(space.id),
        Event::SpaceDeleted { id } => Some(*id),
        Event::LocationCreated { .. }
        | Event::LocationUpdated { .. }
        | Event::LocationDeleted { .. }
        | Event::SpacesCreated { .. } => None,
    }
}
