use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::store::reserve;
use super::{Engine, EngineError, FieldError};

// ── Inputs ────────────────────────────────────────────────────────

/// A location as submitted, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationDraft {
    pub name: String,
    pub city: String,
    pub address: String,
    pub services: Services,
}

/// A space as submitted. `kind` is the raw type name; unknown names are
/// reported as a field error rather than rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceDraft {
    pub name: String,
    pub kind: String,
    pub capacity: i64,
    pub price_per_hour: Cents,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationPatch {
    pub name: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub services: Option<Services>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpacePatch {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub capacity: Option<i64>,
    pub price_per_hour: Option<Cents>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFilter {
    /// Case-insensitive substring of the city.
    pub city: Option<String>,
    /// At least one space of this kind.
    pub kind: Option<SpaceKind>,
    /// Every listed service must be offered.
    pub services: Services,
}

// ── Validation ────────────────────────────────────────────────────

fn required(path: &str, value: &str, max: usize, errors: &mut Vec<FieldError>) {
    let value = value.trim();
    if value.is_empty() {
        errors.push(FieldError::new(path, "required"));
    } else if value.len() > max {
        errors.push(FieldError::new(path, format!("longer than {max} bytes")));
    }
}

fn check_location(prefix: &str, draft: &LocationDraft, errors: &mut Vec<FieldError>) {
    required(&format!("{prefix}name"), &draft.name, MAX_NAME_LEN, errors);
    required(&format!("{prefix}city"), &draft.city, MAX_NAME_LEN, errors);
    required(&format!("{prefix}address"), &draft.address, MAX_ADDRESS_LEN, errors);
    if draft.services.len() > MAX_SERVICES {
        errors.push(FieldError::new(
            format!("{prefix}services"),
            format!("at most {MAX_SERVICES} services"),
        ));
    }
    if draft.services.iter().any(|s| s.len() > MAX_SERVICE_TAG_LEN) {
        errors.push(FieldError::new(
            format!("{prefix}services"),
            format!("service names are limited to {MAX_SERVICE_TAG_LEN} bytes"),
        ));
    }
}

/// Returns the parsed kind when the draft is otherwise valid.
fn check_space(prefix: &str, draft: &SpaceDraft, errors: &mut Vec<FieldError>) -> Option<SpaceKind> {
    let before = errors.len();
    required(&format!("{prefix}name"), &draft.name, MAX_NAME_LEN, errors);
    let kind = SpaceKind::parse(&draft.kind);
    if kind.is_none() {
        errors.push(FieldError::new(format!("{prefix}kind"), "unknown space type"));
    }
    if !(1..=i64::from(MAX_CAPACITY)).contains(&draft.capacity) {
        errors.push(FieldError::new(
            format!("{prefix}capacity"),
            format!("must be between 1 and {MAX_CAPACITY}"),
        ));
    }
    if !(0..=MAX_PRICE_PER_HOUR).contains(&draft.price_per_hour) {
        errors.push(FieldError::new(
            format!("{prefix}price_per_hour"),
            format!("must be between 0 and {MAX_PRICE_PER_HOUR} cents"),
        ));
    }
    if errors.len() == before { kind } else { None }
}

fn build_location(prefix: &str, draft: &LocationDraft, errors: &mut Vec<FieldError>) -> Location {
    check_location(prefix, draft, errors);
    Location {
        id: Ulid::new(),
        name: draft.name.trim().to_string(),
        city: draft.city.trim().to_string(),
        address: draft.address.trim().to_string(),
        services: draft.services.clone(),
    }
}

/// Validate a batch of drafts for one location. Names must be unique within
/// the batch (case-insensitively); clashes with stored spaces are checked later
/// against the key index.
fn build_spaces(location_id: Ulid, drafts: &[SpaceDraft], errors: &mut Vec<FieldError>) -> Vec<Space> {
    let mut seen = HashSet::new();
    let mut spaces = Vec::with_capacity(drafts.len());
    for (i, draft) in drafts.iter().enumerate() {
        let prefix = format!("spaces[{i}].");
        let kind = check_space(&prefix, draft, errors);
        let name = draft.name.trim();
        if !name.is_empty() && !seen.insert(fold(name)) {
            errors.push(FieldError::new(format!("{prefix}name"), "duplicate name in batch"));
            continue;
        }
        if let Some(kind) = kind {
            spaces.push(Space {
                id: Ulid::new(),
                location_id,
                name: name.to_string(),
                kind,
                price_per_hour: draft.price_per_hour,
                capacity: draft.capacity as u32,
            });
        }
    }
    spaces
}

fn check_batch_size(count: usize) -> Result<(), EngineError> {
    if count > MAX_SPACES_PER_BATCH {
        return Err(EngineError::LimitExceeded("too many spaces in one request"));
    }
    Ok(())
}

/// Canonical services set from any of the shapes clients send: an array, a
/// JSON-encoded string, a comma/semicolon/whitespace separated string, or an
/// object of `{tag: bool}` flags. Tags are trimmed and lowercased.
pub fn normalize_services(value: &Value) -> Services {
    let mut out = Services::new();
    collect_services(value, &mut out);
    out
}

fn collect_services(value: &Value, out: &mut Services) {
    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => push_tag(s, out),
                    Value::Number(n) => push_tag(&n.to_string(), out),
                    _ => {}
                }
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if (trimmed.starts_with('[') || trimmed.starts_with('{'))
                && let Ok(inner) = serde_json::from_str::<Value>(trimmed)
            {
                collect_services(&inner, out);
                return;
            }
            for tag in trimmed.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
                push_tag(tag, out);
            }
        }
        Value::Object(flags) => {
            for (tag, flag) in flags {
                let on = match flag {
                    Value::Bool(b) => *b,
                    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    Value::String(s) => matches!(fold(s).as_str(), "true" | "1" | "yes"),
                    _ => false,
                };
                if on {
                    push_tag(tag, out);
                }
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn push_tag(tag: &str, out: &mut Services) {
    let tag = fold(tag);
    if !tag.is_empty() {
        out.insert(tag);
    }
}

// ── Catalog operations ────────────────────────────────────────────

impl Engine {
    /// Create a location with no spaces. A location with the same
    /// normalized (name, city, address) fails with `AlreadyExists`.
    pub async fn create_location(&self, draft: LocationDraft) -> Result<Location, EngineError> {
        let mut errors = Vec::new();
        let location = build_location("", &draft, &mut errors);
        if !errors.is_empty() {
            return Err(EngineError::Invalid(errors));
        }
        let (location, _) = self.commit_catalog(location, Vec::new()).await?;
        Ok(location)
    }

    /// Dry run of [`Engine::commit_wizard`]: the same checks, nothing written.
    pub async fn validate_wizard(
        &self,
        draft: &LocationDraft,
        spaces: &[SpaceDraft],
    ) -> Result<(), EngineError> {
        let (location, _) = self.prepare_wizard(draft, spaces)?;
        if let Some(existing) = self.store.location_for_key(&location.key()) {
            return Err(EngineError::AlreadyExists(existing));
        }
        Ok(())
    }

    /// A location and its initial spaces, committed as a single WAL record.
    pub async fn commit_wizard(
        &self,
        draft: &LocationDraft,
        spaces: &[SpaceDraft],
    ) -> Result<(Location, Vec<Space>), EngineError> {
        let (location, spaces) = self.prepare_wizard(draft, spaces)?;
        self.commit_catalog(location, spaces).await
    }

    fn prepare_wizard(
        &self,
        draft: &LocationDraft,
        drafts: &[SpaceDraft],
    ) -> Result<(Location, Vec<Space>), EngineError> {
        check_batch_size(drafts.len())?;
        let mut errors = Vec::new();
        let location = build_location("location.", draft, &mut errors);
        let spaces = build_spaces(location.id, drafts, &mut errors);
        if !errors.is_empty() {
            return Err(EngineError::Invalid(errors));
        }
        Ok((location, spaces))
    }

    async fn commit_catalog(
        &self,
        location: Location,
        spaces: Vec<Space>,
    ) -> Result<(Location, Vec<Space>), EngineError> {
        let key = location.key();
        if let Some(existing) = self.store.location_for_key(&key) {
            return Err(EngineError::AlreadyExists(existing));
        }
        let reservation =
            reserve(&self.store.location_keys, key, location.id).map_err(EngineError::AlreadyExists)?;

        let _gate = self.write_gate.read().await;
        let event = Event::LocationCreated {
            location: location.clone(),
            spaces: spaces.clone(),
        };
        self.wal_append(&event).await?;
        self.store.insert_location(location.clone());
        for space in &spaces {
            self.store.insert_space(space.clone());
        }
        reservation.commit();

        tracing::info!(
            "location {} created ({}, {}) with {} spaces",
            location.id,
            location.name,
            location.city,
            spaces.len()
        );
        Ok((location, spaces))
    }

    /// Add spaces to an existing location. All or nothing: any invalid draft
    /// or name clash rejects the whole batch.
    pub async fn create_spaces(
        &self,
        location_id: Ulid,
        drafts: &[SpaceDraft],
    ) -> Result<Vec<Space>, EngineError> {
        if drafts.is_empty() {
            return Err(EngineError::invalid("spaces", "at least one space is required"));
        }
        check_batch_size(drafts.len())?;

        let _gate = self.write_gate.read().await;
        let _catalog = self.catalog_lock(location_id).await;
        if self.store.get_location(&location_id).is_none() {
            return Err(EngineError::NotFound(location_id));
        }

        let mut errors = Vec::new();
        let spaces = build_spaces(location_id, drafts, &mut errors);
        if !errors.is_empty() {
            return Err(EngineError::Invalid(errors));
        }

        let mut reservations = Vec::with_capacity(spaces.len());
        for space in &spaces {
            let r = reserve(&self.store.space_keys, space.key(), space.id)
                .map_err(|_| EngineError::DuplicateName(space.name.clone()))?;
            reservations.push(r);
        }

        let event = Event::SpacesCreated {
            location_id,
            spaces: spaces.clone(),
        };
        self.wal_append(&event).await?;
        for space in &spaces {
            self.store.insert_space(space.clone());
        }
        for r in reservations {
            r.commit();
        }
        tracing::info!("{} spaces added to location {location_id}", spaces.len());
        Ok(spaces)
    }

    pub async fn update_location(&self, id: Ulid, patch: LocationPatch) -> Result<Location, EngineError> {
        let _gate = self.write_gate.read().await;
        let _catalog = self.catalog_lock(id).await;
        let current = self.store.get_location(&id).ok_or(EngineError::NotFound(id))?;

        let draft = LocationDraft {
            name: patch.name.unwrap_or(current.name.clone()),
            city: patch.city.unwrap_or(current.city.clone()),
            address: patch.address.unwrap_or(current.address.clone()),
            services: patch.services.unwrap_or(current.services.clone()),
        };
        let mut errors = Vec::new();
        let mut location = build_location("", &draft, &mut errors);
        if !errors.is_empty() {
            return Err(EngineError::Invalid(errors));
        }
        location.id = id;
        if location == current {
            return Ok(current);
        }

        let reservation = if location.key() != current.key() {
            Some(reserve(&self.store.location_keys, location.key(), id).map_err(EngineError::AlreadyExists)?)
        } else {
            None
        };

        let event = Event::LocationUpdated {
            location: location.clone(),
        };
        self.wal_append(&event).await?;
        self.store.update_location(location.clone());
        if let Some(r) = reservation {
            r.commit();
        }
        Ok(location)
    }

    /// Delete a location with all of its spaces and their bookings.
    pub async fn delete_location(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let _catalog = self.catalog_lock(id).await;
        if self.store.get_location(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }

        let mut space_ids = self.store.location_space_ids(&id);
        space_ids.sort();
        let mut guards: Vec<OwnedRwLockWriteGuard<SpaceState>> = Vec::with_capacity(space_ids.len());
        for space_id in &space_ids {
            if let Some(rs) = self.store.get_space(space_id) {
                guards.push(rs.write_owned().await);
            }
        }

        self.wal_append(&Event::LocationDeleted { id }).await?;
        let mut bookings = 0;
        for guard in &mut guards {
            bookings += guard.bookings.len();
            self.store.detach_space(guard);
        }
        self.store.remove_location(&id);
        drop(guards);
        self.forget_catalog_lock(&id);

        tracing::info!(
            "location {id} deleted with {} spaces and {bookings} bookings",
            space_ids.len()
        );
        Ok(())
    }

    pub async fn update_space(&self, id: Ulid, patch: SpacePatch) -> Result<Space, EngineError> {
        let _gate = self.write_gate.read().await;
        let rs = self.space_handle(&id)?;
        let location_id = rs.read().await.space.location_id;
        let _catalog = self.catalog_lock(location_id).await;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::NotFound(id));
        }

        let current = guard.space.clone();
        let draft = SpaceDraft {
            name: patch.name.unwrap_or(current.name.clone()),
            kind: patch.kind.unwrap_or(current.kind.as_str().to_string()),
            capacity: patch.capacity.unwrap_or(i64::from(current.capacity)),
            price_per_hour: patch.price_per_hour.unwrap_or(current.price_per_hour),
        };
        let mut errors = Vec::new();
        let Some(kind) = check_space("", &draft, &mut errors) else {
            return Err(EngineError::Invalid(errors));
        };
        let space = Space {
            id,
            location_id,
            name: draft.name.trim().to_string(),
            kind,
            price_per_hour: draft.price_per_hour,
            capacity: draft.capacity as u32,
        };
        if space == current {
            return Ok(current);
        }

        let reservation = if space.key() != current.key() {
            Some(
                reserve(&self.store.space_keys, space.key(), id)
                    .map_err(|_| EngineError::DuplicateName(space.name.clone()))?,
            )
        } else {
            None
        };

        let event = Event::SpaceUpdated {
            space: space.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        if let Some(r) = reservation {
            r.commit();
        }
        Ok(space)
    }

    /// Delete a space and every booking on it.
    pub async fn delete_space(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let rs = self.space_handle(&id)?;
        let location_id = rs.read().await.space.location_id;
        let _catalog = self.catalog_lock(location_id).await;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::NotFound(id));
        }
        let bookings = guard.bookings.len();
        self.persist_and_apply(&mut guard, &Event::SpaceDeleted { id })
            .await?;
        tracing::info!("space {id} deleted with {bookings} bookings");
        Ok(())
    }

    pub async fn get_space(&self, id: Ulid) -> Result<Space, EngineError> {
        let rs = self.space_handle(&id)?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::NotFound(id));
        }
        Ok(guard.space.clone())
    }

    pub async fn get_location(&self, id: Ulid) -> Result<Location, EngineError> {
        self.store.get_location(&id).ok_or(EngineError::NotFound(id))
    }

    /// Spaces of one location ordered by name.
    pub async fn spaces_for_location(&self, location_id: Ulid) -> Result<Vec<Space>, EngineError> {
        if self.store.get_location(&location_id).is_none() {
            return Err(EngineError::NotFound(location_id));
        }
        let mut spaces = self.live_spaces(location_id).await;
        spaces.sort_by(|a, b| fold(&a.name).cmp(&fold(&b.name)).then_with(|| a.id.cmp(&b.id)));
        Ok(spaces)
    }

    /// Locations matching `filter`, ordered by city then name.
    pub async fn list_locations(&self, filter: &LocationFilter) -> Vec<Location> {
        let city = filter.city.as_deref().map(fold).filter(|c| !c.is_empty());
        let mut out = Vec::new();
        for location in self.store.locations() {
            if let Some(ref city) = city
                && !fold(&location.city).contains(city.as_str())
            {
                continue;
            }
            if !filter
                .services
                .iter()
                .all(|s| location.services.contains(&fold(s)))
            {
                continue;
            }
            if let Some(kind) = filter.kind
                && !self
                    .live_spaces(location.id)
                    .await
                    .iter()
                    .any(|s| s.kind == kind)
            {
                continue;
            }
            out.push(location);
        }
        out.sort_by(|a, b| {
            (fold(&a.city), fold(&a.name), a.id).cmp(&(fold(&b.city), fold(&b.name), b.id))
        });
        out
    }

    async fn live_spaces(&self, location_id: Ulid) -> Vec<Space> {
        let mut spaces = Vec::new();
        for space_id in self.store.location_space_ids(&location_id) {
            if let Some(rs) = self.store.get_space(&space_id) {
                let guard = rs.read().await;
                if !guard.deleted {
                    spaces.push(guard.space.clone());
                }
            }
        }
        spaces
    }
}
