use almanac_core::db::establish_connection;
use almanac_core::error::CoreError;
use almanac_core::models::{Event, NewEventData, UpdateEventData};
use almanac_core::pattern::{Frequency, NewRuleData, RecurrenceRule};
use almanac_core::repository::{
    EventRepository, OccurrenceRepository, RuleRepository, SqliteRepository,
};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper function to create a test database
async fn setup_test_db() -> (SqliteRepository, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    (SqliteRepository::new(pool), temp_dir)
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// Helper function to create a test rule
async fn create_test_rule(repo: &SqliteRepository, frequency: Frequency) -> RecurrenceRule {
    repo.add_rule(NewRuleData {
        name: format!("{} rule", frequency),
        description: None,
        frequency,
        params: "".to_string(),
    })
    .await
    .expect("Failed to create test rule")
}

/// Helper function to create a day-long monthly event starting 2008-01-01
async fn create_monthly_event(repo: &SqliteRepository) -> Event {
    let rule = create_test_rule(repo, Frequency::Monthly).await;
    repo.add_event(NewEventData {
        title: "Monthly Event".to_string(),
        start: utc(2008, 1, 1, 0, 0),
        end: utc(2008, 1, 2, 0, 0),
        rule_id: Some(rule.id),
        ..Default::default()
    })
    .await
    .expect("Failed to create test event")
}

#[tokio::test]
async fn test_recurring_event_reconciliation_workflow() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;

    let occurrences = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    assert_eq!(occurrences.len(), 2);
    assert_eq!(occurrences[0].start, utc(2008, 2, 1, 0, 0));
    assert_eq!(occurrences[1].start, utc(2008, 3, 1, 0, 0));

    // Move the February occurrence to the 15th.
    let moved = repo
        .move_occurrence(
            &occurrences[0].key(),
            utc(2008, 2, 15, 0, 0),
            utc(2008, 2, 16, 0, 0),
        )
        .await
        .unwrap();
    assert!(moved.moved());
    assert_eq!(moved.original_start, utc(2008, 2, 1, 0, 0));

    // A fresh reconciled fetch substitutes the persisted override at the
    // generated slot's position, even though its current start moved past
    // the window used here.
    let reconciled = repo
        .event_occurrences(event.id, utc(2008, 2, 1, 0, 0), utc(2008, 2, 10, 0, 0))
        .await
        .unwrap();
    assert_eq!(reconciled.len(), 1);
    assert_eq!(reconciled[0].start, utc(2008, 2, 15, 0, 0));
    assert_eq!(reconciled[0].original_start, utc(2008, 2, 1, 0, 0));
    assert!(reconciled[0].moved());

    // The March occurrence is untouched.
    let wide = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    assert_eq!(wide.len(), 2);
    assert!(wide[0].moved());
    assert!(!wide[1].moved());
}

#[tokio::test]
async fn test_cancel_uncancel_workflow() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;

    let occurrences = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    let key = occurrences[0].key();

    let cancelled = repo.cancel_occurrence(&key).await.unwrap();
    assert!(cancelled.cancelled);

    // Cancelled occurrences remain in the reconciled sequence.
    let reconciled = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    assert_eq!(reconciled.len(), 2);
    assert!(reconciled[0].cancelled);

    let restored = repo.uncancel_occurrence(&key).await.unwrap();
    assert!(!restored.cancelled);
    assert_eq!(restored.key(), key);

    let reconciled = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    assert!(!reconciled[0].cancelled);
}

#[tokio::test]
async fn test_reconciled_fetch_sees_all_committed_overrides() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;

    let occurrences = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    repo.move_occurrence(
        &occurrences[0].key(),
        utc(2008, 2, 15, 0, 0),
        utc(2008, 2, 16, 0, 0),
    )
    .await
    .unwrap();
    repo.cancel_occurrence(&occurrences[1].key()).await.unwrap();

    // A single reconciled fetch reflects every committed write at once.
    let reconciled = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    assert_eq!(reconciled.len(), 2);
    assert!(reconciled[0].moved());
    assert!(reconciled[1].cancelled);
    assert_eq!(repo.fetch_overrides(event.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_one_shot_event_occurrences() {
    let (repo, _temp_dir) = setup_test_db().await;

    let event = repo
        .add_event(NewEventData {
            title: "One-shot".to_string(),
            start: utc(2008, 1, 5, 8, 0),
            end: utc(2008, 1, 5, 9, 0),
            ..Default::default()
        })
        .await
        .unwrap();

    let inside = repo
        .event_occurrences(event.id, utc(2008, 1, 1, 0, 0), utc(2008, 2, 1, 0, 0))
        .await
        .unwrap();
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].start, event.start);

    let outside = repo
        .event_occurrences(event.id, utc(2008, 2, 1, 0, 0), utc(2008, 3, 1, 0, 0))
        .await
        .unwrap();
    assert!(outside.is_empty());
}

#[tokio::test]
async fn test_remove_override_restores_generated_slot() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;

    let occurrences = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    let key = occurrences[0].key();

    repo.move_occurrence(&key, utc(2008, 2, 15, 0, 0), utc(2008, 2, 16, 0, 0))
        .await
        .unwrap();
    repo.remove_override(&key).await.unwrap();

    let reconciled = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    assert_eq!(reconciled[0].start, utc(2008, 2, 1, 0, 0));
    assert!(!reconciled[0].moved());

    // Removing it again is an error.
    let result = repo.remove_override(&key).await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_save_override_upserts_by_identity() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;

    let occurrences = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();

    let mut occurrence = occurrences[0].clone();
    occurrence.move_to(utc(2008, 2, 10, 0, 0), utc(2008, 2, 11, 0, 0));
    repo.save_override(&occurrence).await.unwrap();

    occurrence.move_to(utc(2008, 2, 20, 0, 0), utc(2008, 2, 21, 0, 0));
    occurrence.description = Some("moved again".to_string());
    repo.save_override(&occurrence).await.unwrap();

    let overrides = repo.fetch_overrides(event.id).await.unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].start, utc(2008, 2, 20, 0, 0));
    assert_eq!(overrides[0].description, Some("moved again".to_string()));
}

#[tokio::test]
async fn test_delete_event_removes_overrides() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;

    let occurrences = repo
        .event_occurrences(event.id, utc(2008, 1, 24, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    repo.move_occurrence(
        &occurrences[0].key(),
        utc(2008, 2, 15, 0, 0),
        utc(2008, 2, 16, 0, 0),
    )
    .await
    .unwrap();
    assert_eq!(repo.fetch_overrides(event.id).await.unwrap().len(), 1);

    repo.delete_event(event.id).await.unwrap();

    assert!(repo.find_event_by_id(event.id).await.unwrap().is_none());
    assert!(repo.fetch_overrides(event.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_rule_clears_event_reference() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;
    let rule_id = event.rule_id.unwrap();

    assert_eq!(repo.find_events_by_rule(rule_id).await.unwrap().len(), 1);

    repo.delete_rule(rule_id).await.unwrap();

    let reloaded = repo.find_event_by_id(event.id).await.unwrap().unwrap();
    assert!(reloaded.rule_id.is_none());

    // Without its rule, the event is back to a single occurrence.
    let occurrences = repo
        .event_occurrences(event.id, utc(2008, 1, 1, 0, 0), utc(2008, 3, 2, 0, 0))
        .await
        .unwrap();
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].start, event.start);
}

#[tokio::test]
async fn test_update_event_fields() {
    let (repo, _temp_dir) = setup_test_db().await;
    let event = create_monthly_event(&repo).await;

    let updated = repo
        .update_event(
            event.id,
            UpdateEventData {
                title: Some("Renamed".to_string()),
                end_recurring: Some(Some(utc(2008, 6, 1, 0, 0))),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.end_recurring, Some(utc(2008, 6, 1, 0, 0)));

    // Clearing the bound via the inner None.
    let cleared = repo
        .update_event(
            event.id,
            UpdateEventData {
                end_recurring: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.end_recurring.is_none());
}

#[tokio::test]
async fn test_missing_event_is_not_found() {
    let (repo, _temp_dir) = setup_test_db().await;

    let result = repo
        .event_occurrences(Uuid::now_v7(), utc(2008, 1, 1, 0, 0), utc(2008, 2, 1, 0, 0))
        .await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_add_event_rejects_missing_rule() {
    let (repo, _temp_dir) = setup_test_db().await;

    let result = repo
        .add_event(NewEventData {
            title: "Broken".to_string(),
            start: utc(2008, 1, 1, 0, 0),
            end: utc(2008, 1, 2, 0, 0),
            rule_id: Some(Uuid::now_v7()),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_add_event_rejects_invalid_timezone() {
    let (repo, _temp_dir) = setup_test_db().await;

    let result = repo
        .add_event(NewEventData {
            title: "Bad zone".to_string(),
            start: utc(2008, 1, 1, 0, 0),
            end: utc(2008, 1, 2, 0, 0),
            timezone: Some("Not/A_Zone".to_string()),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(CoreError::InvalidTimezone(_))));
}
