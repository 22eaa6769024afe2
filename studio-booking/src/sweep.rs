use crate::error::BookingError;
use crate::manager::BookingManager;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use studio_catalog::{CapacityError, SessionStatus};
use tracing::{debug, warn};
use uuid::Uuid;

/// What one sweep pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub offers_expired: usize,
    pub users_promoted: usize,
    pub sessions_completed: usize,
    pub no_shows: usize,
    pub cancellations_resumed: usize,
    /// Sessions whose lock was contended; picked up on the next pass
    pub skipped_busy: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }

    fn merge(&mut self, other: SweepReport) {
        self.offers_expired += other.offers_expired;
        self.users_promoted += other.users_promoted;
        self.sessions_completed += other.sessions_completed;
        self.no_shows += other.no_shows;
        self.cancellations_resumed += other.cancellations_resumed;
        self.skipped_busy += other.skipped_busy;
    }
}

impl BookingManager {
    /// Expire every offer whose hold has lapsed and cascade the freed seats.
    ///
    /// Safe to run from several workers at once: each offer is claimed
    /// inside its session's lock, so it expires exactly once.
    pub async fn expire_offers(&self, now: DateTime<Utc>) -> Result<SweepReport, BookingError> {
        let mut report = SweepReport::default();
        let mut by_session: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
        for (session_id, booking_id) in self.bookings.expired_offers(now) {
            by_session.entry(session_id).or_default().push(booking_id);
        }

        for (session_id, booking_ids) in by_session {
            let mut slot = match self.capacity.lock(&session_id).await {
                Ok(slot) => slot,
                Err(CapacityError::Busy(_)) => {
                    warn!(%session_id, "Session busy, deferring offer expiry");
                    report.skipped_busy += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for booking_id in booking_ids {
                if let Some(promoted) = self.expire_offer_locked(&mut slot, &booking_id, now)? {
                    report.offers_expired += 1;
                    report.users_promoted += promoted;
                }
            }
        }

        if !report.is_empty() {
            debug!(?report, "Offer expiry sweep finished");
        }
        Ok(report)
    }

    /// Complete every scheduled session that has ended, recording no-shows.
    /// Also finishes studio cancellations that stopped partway.
    pub async fn sweep_no_shows(&self, now: DateTime<Utc>) -> Result<SweepReport, BookingError> {
        let mut report = SweepReport::default();

        for session_id in self.capacity.session_ids() {
            let mut slot = match self.capacity.lock(&session_id).await {
                Ok(slot) => slot,
                Err(CapacityError::Busy(_)) => {
                    warn!(%session_id, "Session busy, deferring no-show sweep");
                    report.skipped_busy += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let status = slot.session.status;
            match status {
                SessionStatus::Scheduled if slot.session.has_ended(now) => {
                    report.no_shows += self.complete_locked(&mut slot, now).await?;
                    report.sessions_completed += 1;
                }
                SessionStatus::CancelledByStudio if self.has_seat_holders(&session_id) => {
                    match self.cancel_session_locked(&mut slot, now).await {
                        Ok(_) => report.cancellations_resumed += 1,
                        Err(e) if e.is_retryable() => {
                            warn!(%session_id, "Studio cancellation still blocked: {}", e);
                            report.skipped_busy += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ => {}
            }
        }

        if !report.is_empty() {
            debug!(?report, "No-show sweep finished");
        }
        Ok(report)
    }

    /// One worker tick: offer expiry first, then session close-out
    pub async fn run_sweeps(&self, now: DateTime<Utc>) -> Result<SweepReport, BookingError> {
        let mut report = self.expire_offers(now).await?;
        report.merge(self.sweep_no_shows(now).await?);
        Ok(report)
    }
}
