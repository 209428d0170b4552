//! Booking lifecycle.
//!
//! ```text
//! pending ──pay──▶ confirmed (paid)
//!    │                 │
//!    └────cancel───────┴──▶ cancelled (terminal, slot freed)
//! ```
//!
//! Every operation here takes the caller's [`AuthContext`] and enforces who
//! may act on a booking; the store methods underneath do not.

use ulid::Ulid;

use crate::model::*;

use super::conflict::{compute_price, now_ms};
use super::{Engine, EngineError};

impl Engine {
    /// Validate, price and insert a booking for the caller. A taken slot comes
    /// back as [`EngineError::SlotUnavailable`].
    pub async fn create_booking(
        &self,
        ctx: &AuthContext,
        space_id: Ulid,
        span: Span,
        note: Option<String>,
    ) -> Result<Booking, EngineError> {
        let span = Span::try_new(span.start, span.end)?;
        let price_per_hour = {
            let rs = self.space_handle(&space_id)?;
            let guard = rs.read().await;
            guard.space.price_per_hour
        };

        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let booking = Booking {
            id: Ulid::new(),
            space_id,
            user_id: ctx.user_id,
            span,
            payment_status: PaymentStatus::Pending,
            status: BookingStatus::Pending,
            created_at: now_ms(),
            price: Some(compute_price(&span, price_per_hour)),
            note,
        };

        let booking = self.insert_if_free(booking).await?;
        tracing::info!(
            "booking {} created on space {} by {} [{}, {})",
            booking.id,
            booking.space_id,
            booking.user_id,
            booking.span.start,
            booking.span.end
        );
        Ok(booking)
    }

    /// Acknowledge payment. Idempotent: paying a paid booking returns it as is.
    ///
    /// `ctx` is `None` when the payment gateway confirms through its webhook.
    pub async fn confirm_payment(
        &self,
        ctx: Option<&AuthContext>,
        booking_id: Ulid,
    ) -> Result<Booking, EngineError> {
        if let Some(ctx) = ctx {
            self.authorize(ctx, booking_id).await?;
        }
        let booking = self
            .set_payment_status(booking_id, PaymentStatus::Paid)
            .await?;
        tracing::info!("booking {booking_id} paid");
        Ok(booking)
    }

    /// Manager/admin override of the payment status, within the same
    /// transition rules as [`Engine::set_payment_status`].
    pub async fn override_payment_status(
        &self,
        ctx: &AuthContext,
        booking_id: Ulid,
        status: PaymentStatus,
    ) -> Result<Booking, EngineError> {
        if !ctx.role.is_elevated() {
            return Err(EngineError::Forbidden(booking_id));
        }
        self.set_payment_status(booking_id, status).await
    }

    /// Cancel on behalf of the owner or a manager/admin.
    pub async fn cancel(&self, ctx: &AuthContext, booking_id: Ulid) -> Result<(), EngineError> {
        self.authorize(ctx, booking_id).await?;
        self.cancel_booking(booking_id).await?;
        tracing::info!("booking {booking_id} cancelled by {}", ctx.user_id);
        Ok(())
    }

    /// Fetch a booking the caller is allowed to see.
    pub async fn booking_for(&self, ctx: &AuthContext, booking_id: Ulid) -> Result<Booking, EngineError> {
        self.authorize(ctx, booking_id).await
    }

    /// Bookings of `user_id` (default: the caller). Only managers/admins may
    /// list someone else's.
    pub async fn bookings_for(
        &self,
        ctx: &AuthContext,
        user_id: Option<Ulid>,
    ) -> Result<Vec<Booking>, EngineError> {
        let target = user_id.unwrap_or(ctx.user_id);
        if target != ctx.user_id && !ctx.role.is_elevated() {
            return Err(EngineError::Forbidden(target));
        }
        Ok(self.list_by_user(target).await)
    }

    async fn authorize(&self, ctx: &AuthContext, booking_id: Ulid) -> Result<Booking, EngineError> {
        let booking = self.find_booking(booking_id).await?;
        if !ctx.may_act_on(booking.user_id) {
            tracing::warn!("user {} denied on booking {booking_id}", ctx.user_id);
            return Err(EngineError::Forbidden(booking_id));
        }
        Ok(booking)
    }
}
