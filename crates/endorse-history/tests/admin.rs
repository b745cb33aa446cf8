//! Admin corrections: overwrites, backdated periods, deletions, verification.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use endorse_core::{verify_totals, EntityType, FixedClock, HistoryKey, IntegrityViolation};
use endorse_db::MemoryHistoryRepository;
use endorse_history::{BackdatedPeriod, HistoryError, HistoryService, RetryPolicy, TotalsOverride};
use uuid::Uuid;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

fn key() -> HistoryKey {
    HistoryKey::new("user-1", EntityType::Business, "biz-1")
}

fn setup() -> (HistoryService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(day(30)));
    let repo = Arc::new(MemoryHistoryRepository::with_clock(clock.clone()));
    (
        HistoryService::new(repo, clock.clone(), RetryPolicy::none()),
        clock,
    )
}

fn closed(start: i64, end: i64, position: i32) -> BackdatedPeriod {
    BackdatedPeriod {
        start_date: day(start),
        end_date: Some(day(end)),
        start_position: position,
    }
}

#[tokio::test]
async fn backdated_closed_periods_recompute_totals() {
    let (service, _clock) = setup();
    let admin = service.admin();

    admin
        .insert_backdated_period(&key(), "Bakery", closed(0, 5, 3))
        .await
        .unwrap();
    let history = admin
        .insert_backdated_period(&key(), "Bakery", closed(10, 17, 8))
        .await
        .unwrap();

    assert_eq!(history.periods.len(), 2);
    assert_eq!(history.total_days_endorsed, 12);
    assert_eq!(history.total_days_in_top5, 5);
    assert_eq!(history.total_days_in_top10, 12);
    assert!(!history.is_currently_endorsed);
    assert!(verify_totals(&history).is_ok());
}

#[tokio::test]
async fn deleting_a_period_recomputes_from_the_rest() {
    let (service, _clock) = setup();
    let admin = service.admin();
    admin
        .insert_backdated_period(&key(), "Bakery", closed(0, 5, 1))
        .await
        .unwrap();
    let before = admin
        .insert_backdated_period(&key(), "Bakery", closed(10, 17, 1))
        .await
        .unwrap();
    assert_eq!(before.total_days_endorsed, 12);

    let after = admin
        .delete_period(before.id, before.periods[0].id)
        .await
        .unwrap();
    assert_eq!(after.periods.len(), 1);
    assert_eq!(after.total_days_endorsed, 7);
    assert_eq!(after.total_days_in_top5, 7);
}

#[tokio::test]
async fn deleting_the_active_period_clears_current_fields() {
    let (service, _clock) = setup();
    let history = service
        .start_period(&key(), "Bakery", 2, None)
        .await
        .unwrap();
    let active_id = history.periods[0].id;

    let after = service
        .admin()
        .delete_period(history.id, active_id)
        .await
        .unwrap();
    assert!(after.periods.is_empty());
    assert!(!after.is_currently_endorsed);
    assert!(after.current_position.is_none());
    assert!(after.current_period_start_date.is_none());
}

#[tokio::test]
async fn deleting_unknown_ids_is_not_found() {
    let (service, _clock) = setup();
    let history = service
        .start_period(&key(), "Bakery", 2, None)
        .await
        .unwrap();

    let err = service
        .admin()
        .delete_period(history.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::NotFound(_)), "got {err:?}");

    let err = service
        .admin()
        .delete_period(Uuid::new_v4(), history.periods[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn backdated_open_period_becomes_active() {
    let (service, clock) = setup();
    let history = service
        .admin()
        .insert_backdated_period(
            &key(),
            "Bakery",
            BackdatedPeriod {
                start_date: day(20),
                end_date: None,
                start_position: 4,
            },
        )
        .await
        .unwrap();

    assert!(history.is_currently_endorsed);
    assert_eq!(history.current_position, Some(4));
    assert_eq!(history.current_period_start_date, Some(day(20)));
    assert_eq!(history.total_days_endorsed, 0);

    clock.set(day(25));
    let snapshot = service.get_cumulative_days(&key()).await.unwrap();
    assert_eq!(snapshot.total_days_endorsed, 5);
    assert_eq!(snapshot.total_days_in_top5, 5);
}

#[tokio::test]
async fn backdated_open_period_while_active_is_rejected() {
    let (service, _clock) = setup();
    service
        .start_period(&key(), "Bakery", 1, None)
        .await
        .unwrap();

    let err = service
        .admin()
        .insert_backdated_period(
            &key(),
            "Bakery",
            BackdatedPeriod {
                start_date: day(1),
                end_date: None,
                start_position: 2,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Validation(_)), "got {err:?}");

    let stored = service.get_history(&key()).await.unwrap();
    assert_eq!(stored.periods.len(), 1);
}

#[tokio::test]
async fn backdated_closed_period_while_active_keeps_active_fields() {
    let (service, _clock) = setup();
    service
        .start_period(&key(), "Bakery", 1, None)
        .await
        .unwrap();

    let history = service
        .admin()
        .insert_backdated_period(&key(), "Bakery", closed(0, 4, 6))
        .await
        .unwrap();
    assert_eq!(history.periods.len(), 2);
    assert!(history.is_currently_endorsed);
    assert_eq!(history.current_position, Some(1));
    assert_eq!(history.total_days_endorsed, 4);
    assert!(verify_totals(&history).is_ok());
}

#[tokio::test]
async fn backdated_period_input_is_validated() {
    let (service, _clock) = setup();
    let admin = service.admin();

    let err = admin
        .insert_backdated_period(&key(), "Bakery", closed(5, 4, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Validation(_)));

    let err = admin
        .insert_backdated_period(&key(), "Bakery", closed(1, 4, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Validation(_)));

    assert!(service.get_all_endorsement_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn overwritten_totals_are_flagged_until_the_next_close() {
    let (service, clock) = setup();
    let admin = service.admin();
    let history = admin
        .insert_backdated_period(&key(), "Bakery", closed(0, 5, 1))
        .await
        .unwrap();

    let overwritten = admin
        .overwrite_totals(
            history.id,
            TotalsOverride {
                total_days_endorsed: Some(100),
                ..TotalsOverride::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(overwritten.total_days_endorsed, 100);
    assert_eq!(overwritten.total_days_in_top5, 5, "unset fields are kept");

    let err = admin.verify(history.id).await.unwrap_err();
    let HistoryError::Integrity(report) = err else {
        panic!("expected integrity error, got {err:?}");
    };
    assert!(report.violations.iter().any(|v| matches!(
        v,
        IntegrityViolation::TotalMismatch {
            field: "total_days_endorsed",
            stored: 100,
            derived: 5,
        }
    )));
    assert_eq!(admin.verify_all().await.unwrap().len(), 1);

    service.start_period(&key(), "Bakery", 1, None).await.unwrap();
    clock.set(day(32));
    let recomputed = service.end_period(&key(), None).await.unwrap().unwrap();
    assert_eq!(recomputed.total_days_endorsed, 7);
    admin.verify(history.id).await.unwrap();
    assert!(admin.verify_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn overwrite_on_unknown_history_is_not_found() {
    let (service, _clock) = setup();
    let err = service
        .admin()
        .overwrite_totals(
            Uuid::new_v4(),
            TotalsOverride {
                total_days_in_top10: Some(1),
                ..TotalsOverride::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::NotFound(_)));
}
