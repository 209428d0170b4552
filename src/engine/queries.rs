use std::cmp::Reverse;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn find_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let space_id = self
            .store
            .space_for_booking(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .store
            .get_space(&space_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Every booking owned by `user_id`, most recent start first.
    pub async fn list_by_user(&self, user_id: Ulid) -> Vec<Booking> {
        let mut out = Vec::new();
        for rs in self.store.space_handles() {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().filter(|b| b.user_id == user_id).cloned());
        }
        sort_recent_first(&mut out);
        out
    }

    pub async fn list_by_space(&self, space_id: Ulid, page: Page) -> Result<Vec<Booking>, EngineError> {
        let rs = self
            .store
            .get_space(&space_id)
            .ok_or(EngineError::NotFound(space_id))?;
        let guard = rs.read().await;
        let mut out = guard.bookings.clone();
        drop(guard);
        sort_recent_first(&mut out);
        Ok(paginate(out, page))
    }

    pub async fn list_all(&self, page: Page) -> Vec<Booking> {
        let mut out = Vec::new();
        for rs in self.store.space_handles() {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().cloned());
        }
        sort_recent_first(&mut out);
        paginate(out, page)
    }
}

fn sort_recent_first(bookings: &mut [Booking]) {
    bookings.sort_by_key(|b| (Reverse(b.span.start), b.id));
}

fn paginate(bookings: Vec<Booking>, page: Page) -> Vec<Booking> {
    let limit = page.limit.clamp(1, MAX_PAGE_LIMIT);
    bookings.into_iter().skip(page.offset).take(limit).collect()
}
