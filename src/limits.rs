use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking may not exceed 31 days.
pub const MAX_SPAN_DURATION_MS: Ms = 31 * 24 * 3_600_000;
/// Availability queries may not exceed a year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_ADDRESS_LEN: usize = 500;
pub const MAX_NOTE_LEN: usize = 1_000;
pub const MAX_SERVICES: usize = 64;
pub const MAX_SERVICE_TAG_LEN: usize = 64;

pub const MAX_SPACES_PER_BATCH: usize = 200;
pub const MAX_BOOKINGS_PER_SPACE: usize = 100_000;
pub const MAX_CAPACITY: u32 = 10_000;
/// 100 000.00 per hour.
pub const MAX_PRICE_PER_HOUR: i64 = 10_000_000;

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 500;
