use ulid::Ulid;

use crate::model::*;

use super::Engine;

/// Booking volume and paid revenue of one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceReport {
    pub location_id: Ulid,
    pub location: String,
    pub space_id: Ulid,
    pub space: String,
    /// Every booking on the space, cancelled ones included.
    pub bookings: usize,
    /// Sum of the prices of paid bookings.
    pub revenue: Cents,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub locations: usize,
    pub spaces: usize,
    pub bookings: usize,
}

impl Engine {
    /// One row per space, ordered by location name, then space name.
    pub async fn report(&self) -> Vec<SpaceReport> {
        let mut rows = Vec::new();
        for location in self.store.locations() {
            for space_id in self.store.location_space_ids(&location.id) {
                let Some(rs) = self.store.get_space(&space_id) else {
                    continue;
                };
                let guard = rs.read().await;
                if guard.deleted {
                    continue;
                }
                let revenue = guard
                    .bookings
                    .iter()
                    .filter(|b| b.payment_status == PaymentStatus::Paid)
                    .filter_map(|b| b.price)
                    .sum();
                rows.push(SpaceReport {
                    location_id: location.id,
                    location: location.name.clone(),
                    space_id,
                    space: guard.space.name.clone(),
                    bookings: guard.bookings.len(),
                    revenue,
                });
            }
        }
        rows.sort_by_cached_key(|r| (fold(&r.location), r.location_id, fold(&r.space), r.space_id));
        rows
    }

    pub async fn counts(&self) -> Counts {
        let mut counts = Counts {
            locations: self.store.location_count(),
            ..Counts::default()
        };
        for rs in self.store.space_handles() {
            let guard = rs.read().await;
            if guard.deleted {
                continue;
            }
            counts.spaces += 1;
            counts.bookings += guard.bookings.len();
        }
        counts
    }
}
