use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::{Engine, EngineError};

impl Engine {
    /// The guarded insert. Overlap check and durable append happen under the
    /// space's write lock, so two callers can never both see the slot free.
    pub async fn insert_if_free(&self, booking: Booking) -> Result<Booking, EngineError> {
        validate_span(&booking.span)?;
        if let Some(ref n) = booking.note
            && n.len() > MAX_NOTE_LEN {
                return Err(EngineError::LimitExceeded("note too long"));
            }

        let _gate = self.write_gate.read().await;
        let rs = self.space_handle(&booking.space_id)?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::NotFound(booking.space_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many bookings on space"));
        }

        if let Err(e) = check_no_conflict(&guard, &booking.span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(booking)
    }

    /// Set the payment status. `paid` also confirms the booking. Re-applying
    /// the current status is a no-op and writes nothing.
    pub async fn set_payment_status(
        &self,
        id: Ulid,
        payment_status: PaymentStatus,
    ) -> Result<Booking, EngineError> {
        let _gate = self.write_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let current = guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if current.payment_status == payment_status && current.is_blocking() {
            return Ok(current);
        }
        if current.status == BookingStatus::Cancelled
            || current.payment_status == PaymentStatus::Paid
        {
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
            });
        }

        let event = Event::PaymentStatusSet {
            id,
            space_id: current.space_id,
            payment_status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Mark a booking cancelled; its slot becomes free. Authorization is the
    /// caller's job. Cancelling twice is a no-op.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let _gate = self.write_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let current = guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        if current.status == BookingStatus::Cancelled {
            return Ok(current);
        }

        let event = Event::BookingCancelled {
            id,
            space_id: current.space_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }
}
