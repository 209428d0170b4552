use std::collections::HashSet;

use ulid::Ulid;

use crate::model::*;

use super::conflict::{check_no_conflict, validate_query_window};
use super::{Engine, EngineError};

// ── Availability queries ──────────────────────────────────────────
//
// Read-only and advisory: answers can be stale by the time a create runs,
// which is why `insert_if_free` re-checks under the write lock.

impl Engine {
    pub async fn is_space_free(&self, space_id: Ulid, span: Span) -> Result<bool, EngineError> {
        validate_query_window(&span)?;
        let rs = self.space_handle(&space_id)?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::NotFound(space_id));
        }
        Ok(check_no_conflict(&guard, &span).is_ok())
    }

    /// Spaces with no blocking booking in `span`, optionally restricted to one
    /// location. Ordered by location (city, name), then space name.
    pub async fn available_spaces(
        &self,
        span: Span,
        location_id: Option<Ulid>,
    ) -> Result<Vec<Space>, EngineError> {
        validate_query_window(&span)?;
        let handles = match location_id {
            Some(lid) => self
                .store
                .location_space_ids(&lid)
                .iter()
                .filter_map(|id| self.store.get_space(id))
                .collect(),
            None => self.store.space_handles(),
        };

        let mut free = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            if !guard.deleted && check_no_conflict(&guard, &span).is_ok() {
                free.push(guard.space.clone());
            }
        }

        let mut keyed: Vec<_> = free
            .into_iter()
            .filter_map(|s| {
                let loc = self.store.get_location(&s.location_id)?;
                Some(((fold(&loc.city), fold(&loc.name), loc.id), s))
            })
            .collect();
        keyed.sort_by(|(a, sa), (b, sb)| {
            a.cmp(b)
                .then_with(|| fold(&sa.name).cmp(&fold(&sb.name)))
                .then_with(|| sa.id.cmp(&sb.id))
        });
        Ok(keyed.into_iter().map(|(_, s)| s).collect())
    }

    /// Locations having at least one free space in `span`, ordered by city then name.
    pub async fn available_locations(&self, span: Span) -> Result<Vec<Location>, EngineError> {
        let spaces = self.available_spaces(span, None).await?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for s in spaces {
            if seen.insert(s.location_id)
                && let Some(loc) = self.store.get_location(&s.location_id)
            {
                out.push(loc);
            }
        }
        // available_spaces is already grouped by (city, name, id)
        Ok(out)
    }

    /// The free sub-intervals of `span` on one space, for offering
    /// alternatives after a conflict.
    pub async fn free_windows(&self, space_id: Ulid, span: Span) -> Result<Vec<Span>, EngineError> {
        validate_query_window(&span)?;
        let rs = self.space_handle(&space_id)?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::NotFound(space_id));
        }
        let busy: Vec<Span> = guard.blocking(&span).map(|b| b.span).collect();
        Ok(free_within(&span, busy))
    }
}

/// `query` minus the union of `busy` (which need not be sorted or disjoint).
pub fn free_within(query: &Span, mut busy: Vec<Span>) -> Vec<Span> {
    if busy.is_empty() {
        return vec![*query];
    }
    busy.sort_by_key(|s| s.start);
    let busy = merge_overlapping(&busy);
    subtract_intervals(&[*query], &busy)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` spans from sorted `base`.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        assert_eq!(subtract_intervals(&base, &remove), base);
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 250)];
        assert!(subtract_intervals(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![Span::new(100, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn merge_adjacent_and_nested() {
        let spans = vec![Span::new(0, 100), Span::new(100, 150), Span::new(120, 130), Span::new(200, 300)];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(0, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn merge_empty() {
        assert!(merge_overlapping(&[]).is_empty());
    }

    #[test]
    fn free_within_unsorted_busy() {
        let query = Span::new(0, 1000);
        let busy = vec![Span::new(800, 900), Span::new(100, 200), Span::new(150, 300)];
        assert_eq!(
            free_within(&query, busy),
            vec![Span::new(0, 100), Span::new(300, 800), Span::new(900, 1000)]
        );
    }

    #[test]
    fn free_within_busy_spills_outside_query() {
        let query = Span::new(100, 200);
        let busy = vec![Span::new(50, 120), Span::new(180, 400)];
        assert_eq!(free_within(&query, busy), vec![Span::new(120, 180)]);
    }

    #[test]
    fn free_within_nothing_busy() {
        let query = Span::new(100, 200);
        assert_eq!(free_within(&query, vec![]), vec![query]);
    }
}
