use crate::error::BookingError;
use crate::models::{Actor, Booking, BookingStatus, CreditSource};
use crate::policy::{BookingPolicy, CancellationOutcome};
use crate::settlement::{self, AgreementRegistry, RentalAgreement, Settlement};
use crate::store::BookingStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use studio_catalog::{
    CapacityTracker, ClassSession, Reservation, SeatSnapshot, SessionSlot, SessionStatus,
};
use studio_core::{Clock, Notifier};
use studio_ledger::{CreditLedger, LedgerReason, Membership};
use studio_shared::BookingEvent;
use studio_waitlist::HoldPolicy;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives bookings through their lifecycle.
///
/// Every mutation of a session's seats, waitlist or bookings happens while
/// holding that session's lock. Ledger operations take the membership lock
/// inside it, never the other way round.
pub struct BookingManager {
    pub(crate) capacity: CapacityTracker,
    pub(crate) ledger: CreditLedger,
    pub(crate) bookings: BookingStore,
    agreements: AgreementRegistry,
    policy: BookingPolicy,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
}

impl BookingManager {
    pub fn new(policy: BookingPolicy, clock: Arc<dyn Clock>, notifier: Notifier) -> Self {
        Self {
            capacity: CapacityTracker::new(policy.lock_timeout),
            ledger: CreditLedger::new(policy.lock_timeout),
            bookings: BookingStore::new(),
            agreements: AgreementRegistry::new(),
            policy,
            clock,
            notifier,
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn schedule_session(&self, session: ClassSession) -> Result<(), BookingError> {
        if !session.is_scheduled() {
            return Err(BookingError::SessionLocked(format!(
                "session {} is {:?}",
                session.id, session.status
            )));
        }
        let session_id = session.id;
        self.capacity.register(session)?;
        info!(%session_id, "Session scheduled");
        Ok(())
    }

    pub fn open_membership(&self, membership: Membership) -> Result<(), BookingError> {
        let membership_id = membership.id;
        self.ledger.open(membership, self.clock.now())?;
        debug!(%membership_id, "Membership opened");
        Ok(())
    }

    pub fn register_agreement(&self, agreement: RentalAgreement) {
        info!(agreement_id = %agreement.id, teacher_id = %agreement.teacher_id, "Rental agreement registered");
        self.agreements.register(agreement);
    }

    /// Book a seat, or join the waitlist when the session is full and
    /// `allow_waitlist` is set.
    pub async fn create_booking(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        source: CreditSource,
        allow_waitlist: bool,
    ) -> Result<Booking, BookingError> {
        if let CreditSource::DropIn { authorization } = &source {
            if !authorization.is_approved() {
                return Err(BookingError::PaymentDeclined(authorization.reference.clone()));
            }
        }

        let mut slot = self.capacity.lock(&session_id).await?;
        let now = self.clock.now();
        ensure_bookable(&slot.session, now)?;
        ensure_drop_in_covered(&slot.session, &source)?;

        if self.bookings.active_for(&session_id, &user_id).is_some() {
            return Err(BookingError::AlreadyBooked { user_id, session_id });
        }
        if let CreditSource::Membership { membership_id } = &source {
            let membership = self.ledger.membership(membership_id).await?;
            if membership.owner_id != user_id {
                return Err(BookingError::NotOwner(*membership_id));
            }
        }

        match slot.try_reserve()? {
            Reservation::Reserved => {
                let mut booking = Booking::new(session_id, user_id, source, BookingStatus::Booked, now);
                booking.amount_paid_cents = amount_paid(&slot.session, &booking.source);

                if let Some(membership_id) = booking.membership_id() {
                    let credits = slot.session.credits_required();
                    if let Err(e) = self.ledger.debit(&membership_id, &booking.id, credits, now).await {
                        debug!(%session_id, %user_id, "Debit failed, releasing reserved seat: {}", e);
                        self.free_seat(&mut slot, now)?;
                        return Err(e.into());
                    }
                }

                if let Err(e) = self.bookings.insert(booking.clone()) {
                    self.roll_back_reservation(&mut slot, &booking, now).await?;
                    return Err(e);
                }

                info!(booking_id = %booking.id, %session_id, %user_id, "Booking confirmed");
                self.notifier.emit(BookingEvent::BookingConfirmed {
                    booking_id: booking.id,
                    session_id,
                    user_id,
                    timestamp: now,
                });
                Ok(booking)
            }
            Reservation::Full if !allow_waitlist => Err(BookingError::Full(session_id)),
            Reservation::Full => {
                let mut booking = Booking::new(session_id, user_id, source, BookingStatus::Waitlisted, now);
                let position = slot.waitlist.enqueue(user_id, booking.id, now)?;
                booking.waitlist_position = Some(position);

                if let Err(e) = self.bookings.insert(booking.clone()) {
                    slot.waitlist.leave(&user_id)?;
                    return Err(e);
                }

                info!(booking_id = %booking.id, %session_id, %user_id, position, "Joined waitlist");
                self.notifier.emit(BookingEvent::Waitlisted {
                    booking_id: booking.id,
                    session_id,
                    user_id,
                    position,
                    timestamp: now,
                });
                Ok(booking)
            }
        }
    }

    /// Transition: Booked | CheckedIn → Cancelled | LateCancelled
    pub async fn cancel_booking(
        &self,
        booking_id: &Uuid,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let session_id = self.get_booking(booking_id)?.session_id;
        let mut slot = self.capacity.lock(&session_id).await?;
        let booking = self.get_booking(booking_id)?;

        if let Actor::Member(user_id) = actor {
            if user_id != booking.user_id {
                return Err(BookingError::NotOwner(*booking_id));
            }
        }
        if !matches!(booking.status, BookingStatus::Booked | BookingStatus::CheckedIn) {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Cancelled,
            });
        }
        if !slot.session.is_scheduled() || slot.session.has_ended(now) {
            return Err(BookingError::SessionLocked(format!("session {} is closed", session_id)));
        }
        // Members cannot cancel a class in progress; staff can
        if actor != Actor::Staff && slot.session.has_started(now) {
            return Err(BookingError::SessionLocked(format!("session {} has started", session_id)));
        }

        let outcome = self.policy.cancellation.evaluate(&booking, &slot.session, now);
        if let Some(membership_id) = booking.membership_id() {
            match outcome {
                CancellationOutcome::OnTime => {
                    self.ledger
                        .credit(&membership_id, booking_id, LedgerReason::CancelRefund, now)
                        .await?;
                }
                CancellationOutcome::Late => {
                    self.ledger
                        .record_forfeit(&membership_id, booking_id, LedgerReason::LateCancelForfeit, now)
                        .await?;
                }
            }
        }

        let status = match outcome {
            CancellationOutcome::OnTime => BookingStatus::Cancelled,
            CancellationOutcome::Late => BookingStatus::LateCancelled,
        };
        let cancelled = self.bookings.transition(
            booking_id,
            &[BookingStatus::Booked, BookingStatus::CheckedIn],
            status,
            now,
            |_| {},
        )?;
        let promoted = self.free_seat(&mut slot, now)?;

        info!(%booking_id, %session_id, ?outcome, promoted, "Booking cancelled");
        self.notifier.emit(BookingEvent::CancellationProcessed {
            booking_id: *booking_id,
            session_id,
            user_id: cancelled.user_id,
            late: outcome == CancellationOutcome::Late,
            refunded: outcome == CancellationOutcome::OnTime,
            timestamp: now,
        });
        Ok(cancelled)
    }

    /// Transition: Booked → CheckedIn. Checking in twice is a no-op.
    pub async fn check_in(&self, booking_id: &Uuid) -> Result<Booking, BookingError> {
        let session_id = self.get_booking(booking_id)?.session_id;
        let slot = self.capacity.lock(&session_id).await?;
        let now = self.clock.now();
        let booking = self.get_booking(booking_id)?;

        match booking.status {
            BookingStatus::CheckedIn => return Ok(booking),
            BookingStatus::Booked => {}
            other => {
                return Err(BookingError::InvalidTransition {
                    from: other,
                    to: BookingStatus::CheckedIn,
                })
            }
        }
        if !slot.session.is_scheduled() || !self.policy.checkin_open(&slot.session, now) {
            return Err(BookingError::SessionLocked(format!(
                "check-in is not open for session {}",
                session_id
            )));
        }

        let checked_in = self.bookings.transition(
            booking_id,
            &[BookingStatus::Booked],
            BookingStatus::CheckedIn,
            now,
            |b| b.checked_in_at = Some(now),
        )?;

        info!(%booking_id, %session_id, "Checked in");
        self.notifier.emit(BookingEvent::CheckedIn {
            booking_id: *booking_id,
            session_id,
            user_id: checked_in.user_id,
            timestamp: now,
        });
        Ok(checked_in)
    }

    /// Transition: CheckedIn → Booked, for staff correcting a mistaken check-in
    pub async fn undo_check_in(&self, booking_id: &Uuid) -> Result<Booking, BookingError> {
        let session_id = self.get_booking(booking_id)?.session_id;
        let slot = self.capacity.lock(&session_id).await?;
        let now = self.clock.now();
        let booking = self.get_booking(booking_id)?;

        if booking.status != BookingStatus::CheckedIn {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Booked,
            });
        }
        if !slot.session.is_scheduled() || slot.session.has_ended(now) {
            return Err(BookingError::SessionLocked(format!("session {} is closed", session_id)));
        }

        let booked = self.bookings.transition(
            booking_id,
            &[BookingStatus::CheckedIn],
            BookingStatus::Booked,
            now,
            |b| b.checked_in_at = None,
        )?;

        info!(%booking_id, %session_id, "Check-in undone");
        self.notifier.emit(BookingEvent::CheckInUndone {
            booking_id: *booking_id,
            session_id,
            user_id: booked.user_id,
            timestamp: now,
        });
        Ok(booked)
    }

    /// Transition: WaitlistOffered → Booked
    ///
    /// An offer whose hold has lapsed is expired on the spot and the seat
    /// moves to the next waiting user.
    pub async fn accept_waitlist_offer(
        &self,
        booking_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let session_id = self.get_booking(booking_id)?.session_id;
        let mut slot = self.capacity.lock(&session_id).await?;
        let booking = self.get_booking(booking_id)?;

        if booking.status != BookingStatus::WaitlistOffered {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Booked,
            });
        }
        let hold_expires_at = booking.hold_expires_at.ok_or_else(|| {
            BookingError::InvariantViolation(format!("offer {} has no hold expiry", booking_id))
        })?;

        if HoldPolicy::is_expired(hold_expires_at, now) {
            self.expire_offer_locked(&mut slot, booking_id, now)?;
            return Err(BookingError::OfferExpired(*booking_id));
        }
        ensure_bookable(&slot.session, now)?;

        // A failed debit leaves the offer standing until its hold runs out
        if let Some(membership_id) = booking.membership_id() {
            self.ledger
                .debit(&membership_id, booking_id, slot.session.credits_required(), now)
                .await?;
        }

        let amount = amount_paid(&slot.session, &booking.source);
        let confirmed = self.bookings.transition(
            booking_id,
            &[BookingStatus::WaitlistOffered],
            BookingStatus::Booked,
            now,
            |b| b.amount_paid_cents = amount,
        )?;

        info!(%booking_id, %session_id, "Waitlist offer accepted");
        self.notifier.emit(BookingEvent::BookingConfirmed {
            booking_id: *booking_id,
            session_id,
            user_id: confirmed.user_id,
            timestamp: now,
        });
        Ok(confirmed)
    }

    /// Transition: Waitlisted → Cancelled
    pub async fn leave_waitlist(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Booking, BookingError> {
        let mut slot = self.capacity.lock(session_id).await?;
        let now = self.clock.now();

        let entry = slot.waitlist.leave(user_id)?;
        let left = self.bookings.transition(
            &entry.booking_id,
            &[BookingStatus::Waitlisted],
            BookingStatus::Cancelled,
            now,
            |_| {},
        )?;

        info!(booking_id = %left.id, %session_id, %user_id, "Left waitlist");
        self.notifier.emit(BookingEvent::WaitlistLeft {
            booking_id: left.id,
            session_id: *session_id,
            user_id: *user_id,
            timestamp: now,
        });
        Ok(left)
    }

    /// Staff resize. Seats opened by growing the room go to the waitlist.
    pub async fn resize_capacity(
        &self,
        session_id: &Uuid,
        new_capacity: u32,
    ) -> Result<SeatSnapshot, BookingError> {
        let mut slot = self.capacity.lock(session_id).await?;
        let now = self.clock.now();

        slot.resize(new_capacity)?;
        let promoted = self.promote_waiting(&mut slot, now);

        info!(%session_id, new_capacity, promoted, "Capacity changed");
        Ok(slot.snapshot())
    }

    /// Split a co-op booking's revenue under the teacher's agreement in
    /// effect on the class date.
    pub async fn settle_coop_booking(&self, booking_id: &Uuid) -> Result<Settlement, BookingError> {
        let session_id = self.get_booking(booking_id)?.session_id;
        let session = self.capacity.lock(&session_id).await?.session.clone();
        let booking = self.get_booking(booking_id)?;
        let now = self.clock.now();

        if !session.is_coop() {
            return Err(BookingError::NotCoop(session_id));
        }
        let amount_paid_cents = match booking.status {
            BookingStatus::Cancelled => 0,
            BookingStatus::CheckedIn | BookingStatus::LateCancelled | BookingStatus::NoShow => {
                booking.amount_paid_cents.unwrap_or(0)
            }
            BookingStatus::Booked | BookingStatus::Waitlisted | BookingStatus::WaitlistOffered => {
                return Err(BookingError::NotSettleable(*booking_id));
            }
        };

        let class_date = session.start_time.date_naive();
        let agreement = self
            .agreements
            .effective_for(&session.teacher_id, class_date)
            .ok_or_else(|| {
                BookingError::AgreementNotEffective(format!(
                    "teacher {} on {}",
                    session.teacher_id, class_date
                ))
            })?;

        let settled = settlement::settle(&booking, &agreement, amount_paid_cents)?;

        info!(
            %booking_id,
            agreement_id = %agreement.id,
            studio_share_cents = settled.studio_share_cents,
            teacher_share_cents = settled.teacher_share_cents,
            "Co-op booking settled"
        );
        self.notifier.emit(BookingEvent::CoopSettled {
            booking_id: *booking_id,
            session_id,
            studio_share_cents: settled.studio_share_cents,
            teacher_share_cents: settled.teacher_share_cents,
            timestamp: now,
        });
        Ok(settled)
    }

    /// Studio cancels the class: every seat holder is refunded and the
    /// waitlist is cleared.
    ///
    /// The session is marked cancelled before any refund, so a run cut short
    /// by a `Busy` membership can be repeated. The repeat picks up the seat
    /// holders that are left.
    pub async fn cancel_session(&self, session_id: &Uuid) -> Result<Vec<Booking>, BookingError> {
        let mut slot = self.capacity.lock(session_id).await?;
        let now = self.clock.now();

        let status = slot.session.status;
        match status {
            SessionStatus::Scheduled => slot.session.status = SessionStatus::CancelledByStudio,
            SessionStatus::CancelledByStudio if self.has_seat_holders(session_id) => {
                warn!(%session_id, "Resuming interrupted studio cancellation");
            }
            status => {
                return Err(BookingError::SessionLocked(format!(
                    "session {} is {:?}",
                    session_id, status
                )))
            }
        }
        self.cancel_session_locked(&mut slot, now).await
    }

    pub(crate) async fn cancel_session_locked(
        &self,
        slot: &mut SessionSlot,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let session_id = slot.session.id;
        let mut affected = Vec::new();
        // Drain first so freed seats are not offered out
        for entry in slot.waitlist.drain() {
            match self.bookings.transition(
                &entry.booking_id,
                &[BookingStatus::Waitlisted],
                BookingStatus::Cancelled,
                now,
                |_| {},
            ) {
                Ok(booking) => affected.push(booking),
                Err(e) => warn!(booking_id = %entry.booking_id, "Skipping stale waitlist entry: {}", e),
            }
        }

        for booking in self.bookings.for_session(&session_id) {
            if !booking.status.holds_seat() {
                continue;
            }
            let outcome = self.policy.cancellation.evaluate(&booking, &slot.session, now);
            if booking.status != BookingStatus::WaitlistOffered && outcome == CancellationOutcome::OnTime {
                if let Some(membership_id) = booking.membership_id() {
                    if let Err(e) = self
                        .ledger
                        .credit(&membership_id, &booking.id, LedgerReason::CancelRefund, now)
                        .await
                    {
                        warn!(
                            %session_id,
                            booking_id = %booking.id,
                            done = affected.len(),
                            "Studio cancellation interrupted, retry to finish: {}", e
                        );
                        return Err(e.into());
                    }
                }
            }
            let cancelled = self.bookings.transition(
                &booking.id,
                &[BookingStatus::Booked, BookingStatus::CheckedIn, BookingStatus::WaitlistOffered],
                BookingStatus::Cancelled,
                now,
                |_| {},
            )?;
            self.free_seat(slot, now)?;
            self.notifier.emit(BookingEvent::CancellationProcessed {
                booking_id: cancelled.id,
                session_id,
                user_id: cancelled.user_id,
                late: false,
                refunded: true,
                timestamp: now,
            });
            affected.push(cancelled);
        }

        info!(%session_id, affected = affected.len(), "Session cancelled by studio");
        self.notifier.emit(BookingEvent::SessionCancelled {
            session_id,
            affected_bookings: affected.len(),
            timestamp: now,
        });
        Ok(affected)
    }

    pub(crate) fn has_seat_holders(&self, session_id: &Uuid) -> bool {
        self.bookings
            .for_session(session_id)
            .iter()
            .any(|b| b.status.holds_seat())
    }

    /// Close out a session that has ended. Returns the number of no-shows.
    pub async fn complete_session(&self, session_id: &Uuid) -> Result<usize, BookingError> {
        let mut slot = self.capacity.lock(session_id).await?;
        let now = self.clock.now();
        self.complete_locked(&mut slot, now).await
    }

    pub(crate) async fn complete_locked(
        &self,
        slot: &mut SessionSlot,
        now: DateTime<Utc>,
    ) -> Result<usize, BookingError> {
        let session_id = slot.session.id;
        match slot.session.status {
            SessionStatus::Completed => return Ok(0),
            SessionStatus::CancelledByStudio => {
                return Err(BookingError::SessionLocked(format!("session {} was cancelled", session_id)))
            }
            SessionStatus::Scheduled => {}
        }
        if !slot.session.has_ended(now) {
            return Err(BookingError::SessionLocked(format!("session {} has not ended", session_id)));
        }

        for entry in slot.waitlist.drain() {
            if let Err(e) = self.bookings.transition(
                &entry.booking_id,
                &[BookingStatus::Waitlisted],
                BookingStatus::Cancelled,
                now,
                |_| {},
            ) {
                warn!(booking_id = %entry.booking_id, "Skipping stale waitlist entry: {}", e);
            }
        }

        let mut no_shows = 0;
        for booking in self.bookings.for_session(&session_id) {
            match booking.status {
                BookingStatus::Booked => {
                    if let Some(membership_id) = booking.membership_id() {
                        self.ledger
                            .record_forfeit(&membership_id, &booking.id, LedgerReason::NoShowForfeit, now)
                            .await?;
                    }
                    self.bookings.transition(
                        &booking.id,
                        &[BookingStatus::Booked],
                        BookingStatus::NoShow,
                        now,
                        |_| {},
                    )?;
                    self.free_seat(slot, now)?;
                    no_shows += 1;
                    self.notifier.emit(BookingEvent::NoShowRecorded {
                        booking_id: booking.id,
                        session_id,
                        user_id: booking.user_id,
                        timestamp: now,
                    });
                }
                BookingStatus::WaitlistOffered => {
                    self.bookings.transition(
                        &booking.id,
                        &[BookingStatus::WaitlistOffered],
                        BookingStatus::Cancelled,
                        now,
                        |_| {},
                    )?;
                    self.free_seat(slot, now)?;
                    self.notifier.emit(BookingEvent::WaitlistOfferExpired {
                        booking_id: booking.id,
                        session_id,
                        user_id: booking.user_id,
                        timestamp: now,
                    });
                }
                _ => {}
            }
        }

        slot.session.status = SessionStatus::Completed;
        info!(%session_id, no_shows, "Session completed");
        Ok(no_shows)
    }

    /// Expire one offer if its hold has lapsed. Returns `None` when the offer
    /// was already resolved, otherwise how many users were promoted into the
    /// freed seat.
    pub(crate) fn expire_offer_locked(
        &self,
        slot: &mut SessionSlot,
        booking_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<usize>, BookingError> {
        let Some(booking) = self.bookings.get(booking_id) else {
            return Ok(None);
        };
        let lapsed = booking
            .hold_expires_at
            .map_or(false, |at| HoldPolicy::is_expired(at, now));
        if booking.status != BookingStatus::WaitlistOffered || !lapsed {
            return Ok(None);
        }

        self.bookings.transition(
            booking_id,
            &[BookingStatus::WaitlistOffered],
            BookingStatus::Cancelled,
            now,
            |_| {},
        )?;
        info!(%booking_id, session_id = %booking.session_id, "Waitlist offer expired");
        self.notifier.emit(BookingEvent::WaitlistOfferExpired {
            booking_id: *booking_id,
            session_id: booking.session_id,
            user_id: booking.user_id,
            timestamp: now,
        });

        Ok(Some(self.free_seat(slot, now)?))
    }

    /// Undo a reserved and debited seat whose booking was never recorded.
    /// The seat goes back first; a failed refund is left for reconciliation.
    pub(crate) async fn roll_back_reservation(
        &self,
        slot: &mut SessionSlot,
        booking: &Booking,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        self.free_seat(slot, now)?;
        if let Some(membership_id) = booking.membership_id() {
            if let Err(e) = self
                .ledger
                .credit(&membership_id, &booking.id, LedgerReason::CancelRefund, now)
                .await
            {
                error!(
                    booking_id = %booking.id,
                    %membership_id,
                    "Refund of unrecorded booking failed, manual reconciliation required: {}", e
                );
            }
        }
        Ok(())
    }

    /// Give a seat back and offer freed seats down the waitlist
    fn free_seat(&self, slot: &mut SessionSlot, now: DateTime<Utc>) -> Result<usize, BookingError> {
        match slot.release() {
            Ok(true) => Ok(self.promote_waiting(slot, now)),
            Ok(false) => Ok(0),
            Err(e) => {
                error!(
                    session_id = %slot.session.id,
                    "Seat release failed, manual reconciliation required: {}", e
                );
                Err(e.into())
            }
        }
    }

    /// Offer open seats to waiting users in position order. Stale entries
    /// are skipped until a live offer is made or the queue is empty.
    fn promote_waiting(&self, slot: &mut SessionSlot, now: DateTime<Utc>) -> usize {
        let mut promoted = 0;
        let session_id = slot.session.id;
        // No offers once the class is under way
        if !slot.session.is_scheduled() || slot.session.has_started(now) {
            return 0;
        }

        while slot.seats.available() > 0 && !slot.waitlist.is_empty() {
            match slot.try_reserve() {
                Ok(Reservation::Reserved) => {}
                other => {
                    error!(%session_id, ?other, "Could not reserve a seat for promotion");
                    break;
                }
            }
            let Some(entry) = slot.waitlist.promote_next() else {
                if let Err(e) = slot.seats.release() {
                    error!(%session_id, "Seat release failed, manual reconciliation required: {}", e);
                }
                break;
            };

            let hold_expires_at = self.policy.hold.expires_at(now);
            let offered = self.bookings.transition(
                &entry.booking_id,
                &[BookingStatus::Waitlisted],
                BookingStatus::WaitlistOffered,
                now,
                |b| b.hold_expires_at = Some(hold_expires_at),
            );

            match offered {
                Ok(booking) => {
                    promoted += 1;
                    info!(booking_id = %booking.id, %session_id, %hold_expires_at, "Waitlist offer issued");
                    self.notifier.emit(BookingEvent::WaitlistOfferIssued {
                        booking_id: booking.id,
                        session_id,
                        user_id: booking.user_id,
                        hold_expires_at,
                    });
                }
                Err(e) => {
                    warn!(booking_id = %entry.booking_id, "Skipping stale waitlist entry: {}", e);
                    if let Err(e) = slot.seats.release() {
                        error!(%session_id, "Seat release failed, manual reconciliation required: {}", e);
                        break;
                    }
                }
            }
        }
        promoted
    }

    pub fn get_booking(&self, booking_id: &Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get(booking_id)
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))
    }

    pub fn bookings_for_session(&self, session_id: &Uuid) -> Vec<Booking> {
        self.bookings.for_session(session_id)
    }

    pub async fn waitlist_position(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Option<u64>, BookingError> {
        Ok(self.capacity.lock(session_id).await?.waitlist.position_of(user_id))
    }

    pub async fn seat_snapshot(&self, session_id: &Uuid) -> Result<SeatSnapshot, BookingError> {
        Ok(self.capacity.snapshot(session_id).await?)
    }

    pub async fn session(&self, session_id: &Uuid) -> Result<ClassSession, BookingError> {
        Ok(self.capacity.lock(session_id).await?.session.clone())
    }

    /// Cross-check the seat count against the bookings that hold a seat
    pub async fn audit_session(&self, session_id: &Uuid) -> Result<SeatSnapshot, BookingError> {
        let slot = self.capacity.lock(session_id).await?;
        let snapshot = slot.snapshot();
        let holders = self
            .bookings
            .for_session(session_id)
            .iter()
            .filter(|b| b.status.holds_seat())
            .count() as u32;

        if holders != snapshot.booked || snapshot.booked > snapshot.capacity {
            error!(
                %session_id,
                holders,
                booked = snapshot.booked,
                capacity = snapshot.capacity,
                "Seat count does not match bookings"
            );
            return Err(BookingError::InvariantViolation(format!(
                "session {}: {} seat holders, {} booked, capacity {}",
                session_id, holders, snapshot.booked, snapshot.capacity
            )));
        }
        Ok(snapshot)
    }
}

fn ensure_bookable(session: &ClassSession, now: DateTime<Utc>) -> Result<(), BookingError> {
    if !session.is_scheduled() {
        return Err(BookingError::SessionLocked(format!(
            "session {} is {:?}",
            session.id, session.status
        )));
    }
    if session.has_started(now) {
        return Err(BookingError::SessionLocked(format!("session {} has started", session.id)));
    }
    Ok(())
}

/// A co-op drop-in must be authorized for at least the class's drop-in price
fn ensure_drop_in_covered(session: &ClassSession, source: &CreditSource) -> Result<(), BookingError> {
    if let (Some(coop), CreditSource::DropIn { authorization }) = (&session.coop, source) {
        if authorization.amount_cents < coop.drop_in_price_cents {
            return Err(BookingError::PaymentDeclined(format!(
                "{}: authorized {} below drop-in price {}",
                authorization.reference, authorization.amount_cents, coop.drop_in_price_cents
            )));
        }
    }
    Ok(())
}

/// Drop-ins pay the authorized amount; members of a co-op class pay the
/// member price. Plain studio classes carry no per-booking amount.
fn amount_paid(session: &ClassSession, source: &CreditSource) -> Option<i64> {
    match source {
        CreditSource::DropIn { authorization } => Some(authorization.amount_cents),
        CreditSource::Membership { .. } => session.coop.as_ref().map(|c| c.member_price_cents),
    }
}
