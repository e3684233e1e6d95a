//! Tests for activity administration and the delete cascade.

mod common;

use common::{at, camp, move_to, other_event, Hook, HookedStore};
use rollcall_core::engine::{compute_engagement, ActivityAdmin, Reconciler, TransitionProcessor};
use rollcall_core::error::ErrorCode;
use rollcall_core::model::{ActivityDraft, ActivityId, Location};
use rollcall_core::store::AttendanceStore;

// ============================================================================
// Create / Update
// ============================================================================

#[tokio::test]
async fn test_create_activity_trims_input() {
    let camp = camp().await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let crafts = admin
        .create_activity(
            camp.event_id(),
            ActivityDraft::new("  Crafts ", " Barn ").with_description("Beads and paint"),
        )
        .await
        .unwrap();

    assert_eq!(crafts.name, "Crafts");
    assert_eq!(crafts.location, "Barn");
    assert_eq!(camp.store.fetch_activity(crafts.id).await.unwrap(), Some(crafts));
}

#[tokio::test]
async fn test_duplicate_name_rejected_case_insensitively() {
    let camp = camp().await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let error = admin
        .create_activity(camp.event_id(), ActivityDraft::new(" ARCHERY", "Range"))
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::DuplicateRecord);
    assert!(error.user_message().contains("already exists"));
    assert_eq!(camp.store.fetch_activities(camp.event_id()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_same_name_allowed_in_other_event() {
    let camp = camp().await;
    let (winter, _, _) = other_event(&camp.store).await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let created = admin
        .create_activity(winter.id, ActivityDraft::new("Canoe", "Pool"))
        .await
        .unwrap();
    assert_eq!(created.event_id, winter.id);
}

#[tokio::test]
async fn test_name_and_location_are_required() {
    let camp = camp().await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let missing_name = admin
        .create_activity(camp.event_id(), ActivityDraft::new("   ", "Barn"))
        .await
        .unwrap_err();
    let missing_location = admin
        .create_activity(camp.event_id(), ActivityDraft::new("Crafts", ""))
        .await
        .unwrap_err();

    assert_eq!(missing_name.code(), ErrorCode::ValidationError);
    assert_eq!(missing_location.code(), ErrorCode::ValidationError);
}

#[tokio::test]
async fn test_rename_onto_existing_name_rejected() {
    let camp = camp().await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let error = admin
        .update_activity(camp.event_id(), camp.canoe.id, ActivityDraft::new("archery", "Lake Front"))
        .await
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::DuplicateRecord);

    // Changing only the case of its own name is fine.
    let renamed = admin
        .update_activity(camp.event_id(), camp.canoe.id, ActivityDraft::new("CANOE", "Dock 2"))
        .await
        .unwrap();
    assert_eq!(renamed.id, camp.canoe.id);
    assert_eq!(renamed.location, "Dock 2");
}

#[tokio::test]
async fn test_update_unknown_activity_is_not_found() {
    let camp = camp().await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let error = admin
        .update_activity(camp.event_id(), ActivityId::new(), ActivityDraft::new("Kayak", "Lake"))
        .await
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::ActivityNotFound);
}

// ============================================================================
// Delete Cascade
// ============================================================================

#[tokio::test]
async fn test_delete_cascades_to_roster_and_ledger() {
    let camp = camp().await;
    let processor = TransitionProcessor::new(camp.store.clone());
    let admin = ActivityAdmin::new(camp.store.clone());
    let archery = Location::Activity(camp.archery.id);
    let canoe = Location::Activity(camp.canoe.id);

    processor.record_transition(camp.event_id(), camp.grace.id, archery, Some(at(1))).await.unwrap();
    processor.record_transition(camp.event_id(), camp.sam.id, archery, Some(at(2))).await.unwrap();
    processor.record_transition(camp.event_id(), camp.ana.id, archery, Some(at(3))).await.unwrap();
    processor.record_transition(camp.event_id(), camp.ana.id, canoe, Some(at(4))).await.unwrap();

    let activities = camp.store.fetch_activities(camp.event_id()).await.unwrap();
    let canoe_visits_before = compute_engagement(&camp.ledger().await, &activities).count(camp.canoe.id);

    let report = admin.delete_activity(camp.event_id(), camp.archery.id).await.unwrap();

    assert!(report.removed);
    assert_eq!(report.purged_entries, 3);
    assert_eq!(report.displaced.len(), 2);
    assert!(report.displaced.contains(&camp.grace.id));
    assert!(report.displaced.contains(&camp.sam.id));

    assert_eq!(camp.location_of(camp.grace.id).await, Location::Unassigned);
    assert_eq!(camp.location_of(camp.sam.id).await, Location::Unassigned);
    assert_eq!(camp.location_of(camp.ana.id).await, canoe);

    let ledger = camp.ledger().await;
    assert!(ledger.iter().all(|e| e.activity_id != Some(camp.archery.id)));
    assert!(camp.store.fetch_activity(camp.archery.id).await.unwrap().is_none());

    let activities = camp.store.fetch_activities(camp.event_id()).await.unwrap();
    assert_eq!(
        compute_engagement(&ledger, &activities).count(camp.canoe.id),
        canoe_visits_before
    );

    Reconciler::new(camp.store.clone()).verify(camp.event_id()).await.unwrap();
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let camp = camp().await;
    let processor = TransitionProcessor::new(camp.store.clone());
    let admin = ActivityAdmin::new(camp.store.clone());

    processor
        .record_transition(camp.event_id(), camp.grace.id, Location::Activity(camp.canoe.id), Some(at(1)))
        .await
        .unwrap();

    admin.delete_activity(camp.event_id(), camp.canoe.id).await.unwrap();
    let ledger_after_first = camp.ledger().await;

    let again = admin.delete_activity(camp.event_id(), camp.canoe.id).await.unwrap();
    assert!(!again.removed);
    assert!(again.displaced.is_empty());
    assert_eq!(again.purged_entries, 0);
    assert_eq!(camp.ledger().await, ledger_after_first);
}

#[tokio::test]
async fn test_delete_retried_after_outage_completes() {
    let camp = camp().await;
    let processor = TransitionProcessor::new(camp.store.clone());
    let admin = ActivityAdmin::new(camp.store.clone());

    processor
        .record_transition(camp.event_id(), camp.sam.id, Location::Activity(camp.canoe.id), Some(at(1)))
        .await
        .unwrap();

    camp.store.set_available(false);
    let error = admin.delete_activity(camp.event_id(), camp.canoe.id).await.unwrap_err();
    camp.store.set_available(true);
    assert!(error.is_retryable());
    assert!(camp.store.fetch_activity(camp.canoe.id).await.unwrap().is_some());

    let report = admin.delete_activity(camp.event_id(), camp.canoe.id).await.unwrap();
    assert!(report.removed);
    assert_eq!(camp.location_of(camp.sam.id).await, Location::Unassigned);
    Reconciler::new(camp.store.clone()).verify(camp.event_id()).await.unwrap();
}

#[tokio::test]
async fn test_checkout_wins_over_future_stamp() {
    let camp = camp().await;
    let processor = TransitionProcessor::new(camp.store.clone());
    let admin = ActivityAdmin::new(camp.store.clone());

    // A station with a clock far ahead of ours.
    let far_future = chrono::Utc::now() + chrono::Duration::days(365);
    processor
        .record_transition(camp.event_id(), camp.ana.id, Location::Activity(camp.archery.id), Some(far_future))
        .await
        .unwrap();

    admin.delete_activity(camp.event_id(), camp.archery.id).await.unwrap();

    assert_eq!(camp.location_of(camp.ana.id).await, Location::Unassigned);
    Reconciler::new(camp.store.clone()).verify(camp.event_id()).await.unwrap();
}

#[tokio::test]
async fn test_check_in_during_delete_is_refused() {
    let camp = camp().await;
    TransitionProcessor::new(camp.store.clone())
        .record_transition(camp.event_id(), camp.grace.id, Location::Activity(camp.archery.id), Some(at(1)))
        .await
        .unwrap();

    // Sam scans into Archery after the checkout pass, before the purge.
    let store = HookedStore::new(
        camp.store.clone(),
        Hook::PurgeActivityEntries,
        move_to(camp.event_id(), camp.sam.id, Location::Activity(camp.archery.id), 50),
    );
    let report = ActivityAdmin::new(store.clone())
        .delete_activity(camp.event_id(), camp.archery.id)
        .await
        .unwrap();

    let refused = store.fired().unwrap().unwrap_err();
    assert_eq!(refused.code(), ErrorCode::ActivityNotFound);
    assert_eq!(report.displaced, vec![camp.grace.id]);
    assert!(report.removed);
    assert_eq!(camp.location_of(camp.sam.id).await, Location::Unassigned);
    assert_eq!(camp.location_of(camp.grace.id).await, Location::Unassigned);
    assert!(camp.ledger().await.iter().all(|e| e.activity_id != Some(camp.archery.id)));
    Reconciler::new(camp.store.clone()).verify(camp.event_id()).await.unwrap();
}

#[tokio::test]
async fn test_check_in_just_before_close_is_checked_out() {
    let camp = camp().await;

    let store = HookedStore::new(
        camp.store.clone(),
        Hook::CloseActivity,
        move_to(camp.event_id(), camp.sam.id, Location::Activity(camp.archery.id), 50),
    );
    let report = ActivityAdmin::new(store.clone())
        .delete_activity(camp.event_id(), camp.archery.id)
        .await
        .unwrap();

    assert!(store.fired().unwrap().unwrap().applied);
    assert_eq!(report.displaced, vec![camp.sam.id]);
    assert_eq!(camp.location_of(camp.sam.id).await, Location::Unassigned);
    assert!(camp.store.fetch_activity(camp.archery.id).await.unwrap().is_none());
    Reconciler::new(camp.store.clone()).verify(camp.event_id()).await.unwrap();
}

#[tokio::test]
async fn test_closed_activity_stays_closed_until_delete_is_retried() {
    let camp = camp().await;
    let processor = TransitionProcessor::new(camp.store.clone());

    assert!(camp.store.close_activity(camp.event_id(), camp.archery.id).await.unwrap());
    let error = processor
        .record_transition(camp.event_id(), camp.ana.id, Location::Activity(camp.archery.id), None)
        .await
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::ActivityNotFound);
    assert!(camp.ledger().await.is_empty());

    // Other activities keep accepting check-ins.
    processor
        .record_transition(camp.event_id(), camp.ana.id, Location::Activity(camp.canoe.id), None)
        .await
        .unwrap();

    let report = ActivityAdmin::new(camp.store.clone())
        .delete_activity(camp.event_id(), camp.archery.id)
        .await
        .unwrap();
    assert!(report.removed);
}

#[tokio::test]
async fn test_delete_activity_from_other_event_rejected() {
    let camp = camp().await;
    let (_, winter_archery, _) = other_event(&camp.store).await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let error = admin.delete_activity(camp.event_id(), winter_archery.id).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::InvalidEvent);
    assert!(camp.store.fetch_activity(winter_archery.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_bulk_delete_stops_at_first_failure() {
    let camp = camp().await;
    let (_, winter_archery, _) = other_event(&camp.store).await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let error = admin
        .delete_activities(camp.event_id(), &[camp.archery.id, winter_archery.id, camp.canoe.id])
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::InvalidEvent);
    assert_eq!(error.details().context.get("completed"), Some(&serde_json::json!(1)));
    assert!(camp.store.fetch_activity(camp.archery.id).await.unwrap().is_none());
    assert!(camp.store.fetch_activity(camp.canoe.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_bulk_delete_all() {
    let camp = camp().await;
    let admin = ActivityAdmin::new(camp.store.clone());

    let reports = admin
        .delete_activities(camp.event_id(), &[camp.archery.id, camp.canoe.id])
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(camp.store.fetch_activities(camp.event_id()).await.unwrap().is_empty());
}

// ============================================================================
// Participants
// ============================================================================

#[tokio::test]
async fn test_remove_participant_purges_history() {
    let camp = camp().await;
    let processor = TransitionProcessor::new(camp.store.clone());
    let admin = ActivityAdmin::new(camp.store.clone());

    processor
        .record_transition(camp.event_id(), camp.grace.id, Location::Activity(camp.archery.id), Some(at(1)))
        .await
        .unwrap();
    processor
        .record_transition(camp.event_id(), camp.sam.id, Location::Activity(camp.archery.id), Some(at(2)))
        .await
        .unwrap();

    let purged = admin.remove_participant(camp.event_id(), camp.grace.id).await.unwrap();

    assert_eq!(purged, 1);
    assert!(camp.store.fetch_participant(camp.grace.id).await.unwrap().is_none());
    let ledger = camp.ledger().await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].participant_id, camp.sam.id);
}
