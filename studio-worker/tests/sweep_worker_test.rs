use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use studio_booking::{Actor, BookingManager, BookingPolicy, BookingStatus, CreditSource};
use studio_catalog::ClassSession;
use studio_core::{ManualClock, Notifier};
use studio_ledger::Membership;
use studio_worker::{start_sweep_worker, sweep_once};
use tokio::sync::watch;
use uuid::Uuid;

fn setup() -> (Arc<BookingManager>, Arc<ManualClock>, ClassSession) {
    let base = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(base));
    let manager = Arc::new(BookingManager::new(
        BookingPolicy::default(),
        clock.clone(),
        Notifier::default(),
    ));
    let session = ClassSession::new(base + Duration::hours(6), 45, 1, "Studio C", Uuid::new_v4());
    manager.schedule_session(session.clone()).unwrap();
    (manager, clock, session)
}

fn member(manager: &BookingManager) -> (Uuid, Uuid) {
    let user_id = Uuid::new_v4();
    let now = manager.now();
    let membership = Membership::credit_pack(user_id, 4, now - Duration::days(1), now + Duration::days(30));
    let membership_id = membership.id;
    manager.open_membership(membership).unwrap();
    (user_id, membership_id)
}

#[tokio::test]
async fn test_sweep_once_expires_offer_and_records_no_shows() {
    let (manager, clock, session) = setup();
    let first = member(&manager);
    let second = member(&manager);

    let held = manager
        .create_booking(first.0, session.id, CreditSource::membership(first.1), true)
        .await
        .unwrap();
    let queued = manager
        .create_booking(second.0, session.id, CreditSource::membership(second.1), true)
        .await
        .unwrap();
    manager
        .cancel_booking(&held.id, Actor::Member(first.0), manager.now())
        .await
        .unwrap();
    assert_eq!(manager.get_booking(&queued.id).unwrap().status, BookingStatus::WaitlistOffered);

    clock.advance(Duration::minutes(20));
    let report = sweep_once(&manager).await.unwrap();
    assert_eq!(report.offers_expired, 1);
    assert_eq!(manager.get_booking(&queued.id).unwrap().status, BookingStatus::Cancelled);

    clock.set(session.end_time());
    let report = sweep_once(&manager).await.unwrap();
    assert_eq!(report.sessions_completed, 1);
    assert_eq!(report.no_shows, 0);
}

#[tokio::test]
async fn test_worker_runs_until_shutdown() {
    let (manager, clock, session) = setup();
    let (user_id, membership_id) = member(&manager);
    let booking = manager
        .create_booking(user_id, session.id, CreditSource::membership(membership_id), false)
        .await
        .unwrap();

    clock.set(session.end_time() + Duration::minutes(5));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = start_sweep_worker(manager.clone(), std::time::Duration::from_millis(10), shutdown_rx);

    let mut recorded = false;
    for _ in 0..100 {
        if manager.get_booking(&booking.id).unwrap().status == BookingStatus::NoShow {
            recorded = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(recorded);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
