use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(EngineError::InvalidRange {
            start: span.start,
            end: span.end,
        });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

pub(crate) fn validate_query_window(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidRange {
            start: span.start,
            end: span.end,
        });
    }
    if span.duration_ms() > crate::limits::MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// The single overlap gate. Every non-cancelled booking on the space blocks,
/// whatever its payment state.
pub(crate) fn check_no_conflict(ss: &SpaceState, span: &Span) -> Result<(), EngineError> {
    match ss.blocking(span).next() {
        Some(existing) => Err(EngineError::SlotUnavailable {
            space_id: ss.space.id,
            conflicting: existing.id,
        }),
        None => Ok(()),
    }
}

/// Duration rounded up to whole hours (minimum one) times the hourly rate.
pub(crate) fn compute_price(span: &Span, price_per_hour: Cents) -> Cents {
    let hours = (span.duration_ms() + HOUR_MS - 1) / HOUR_MS;
    hours.max(1) * price_per_hour
}
