//! Engine behaviour: submission, moderation, votes, reputation and entities

mod helpers;

use helpers::*;
use tagtrust_common::events::TagTrustEvent;
use tagtrust_common::{
    ledger, EntityRef, Error, ReputationEventType, TagStatus, TrustLevel, VoteDirection,
};
use tagtrust_server::engine::{EngineSettings, AUTO_APPROVAL_ACTOR};

fn event_types(view: &tagtrust_server::engine::ReputationView) -> Vec<ReputationEventType> {
    view.events.iter().map(|e| e.event_type).collect()
}

// =============================================================================
// Submission and approval
// =============================================================================

#[tokio::test]
async fn test_first_approval_scores_neutral_votes() {
    let app = TestApp::new().await;

    let tag = app.submit("u1", "photo-p", "Jane Doe").await;
    assert_eq!(tag.status, TagStatus::Pending);
    assert!(approx(tag.confidence, 0.5));

    let view = app.engine.reputation_of("u1").await.unwrap();
    assert_eq!(view.record.pending_tags, 1);
    assert!(approx(view.record.reputation_score, 0.5));

    let approved = app.engine.approve_tag(tag.id, ADMIN).await.unwrap();
    assert_eq!(approved.status, TagStatus::Approved);
    assert_eq!(approved.decided_by.as_deref(), Some(ADMIN));
    assert!(approved.decided_at.is_some());

    let view = app.engine.reputation_of("u1").await.unwrap();
    assert_eq!(view.record.approved_tags, 1);
    assert_eq!(view.record.pending_tags, 0);
    assert!(approx(view.record.reputation_score, 0.85));
    assert_eq!(view.record.trust_level, TrustLevel::New);
    assert_eq!(
        event_types(&view),
        vec![ReputationEventType::TagSubmitted, ReputationEventType::TagApproved]
    );

    let last = view.events.last().unwrap();
    assert!(approx(last.score_before, 0.5));
    assert!(approx(last.score_after, 0.85));
}

#[tokio::test]
async fn test_four_approvals_reach_learning() {
    let app = TestApp::new().await;
    app.approved_history("u1", 4).await;

    let record = app.engine.reputation_of("u1").await.unwrap().record;
    assert_eq!(record.approved_tags, 4);
    assert!(approx(record.reputation_score, 0.85));
    assert_eq!(record.trust_level, TrustLevel::Learning);
    assert!(!record.auto_approve);
}

#[tokio::test]
async fn test_trusted_user_is_auto_approved() {
    let app = TestApp::new().await;
    app.approved_history("pro", 10).await;

    let record = app.engine.reputation_of("pro").await.unwrap().record;
    assert_eq!(record.trust_level, TrustLevel::Trusted);
    assert!(record.auto_approve);

    let tag = app.submit("pro", "photo-q", "John Roe").await;
    assert_eq!(tag.status, TagStatus::Approved);
    assert_eq!(tag.decided_by.as_deref(), Some(AUTO_APPROVAL_ACTOR));

    let view = app.engine.reputation_of("pro").await.unwrap();
    assert_eq!(view.record.approved_tags, 11);
    assert_eq!(view.record.pending_tags, 0);
    let types = event_types(&view);
    assert_eq!(
        &types[types.len() - 2..],
        &[ReputationEventType::TagSubmitted, ReputationEventType::TagApproved]
    );
    assert_eq!(view.events.last().unwrap().metadata["decided_by"], AUTO_APPROVAL_ACTOR);
}

#[tokio::test]
async fn test_reject_records_reason_and_counts() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;

    let rejected = app
        .engine
        .reject_tag(tag.id, ADMIN, Some("  not in the photo  ".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, TagStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("not in the photo"));

    let record = app.engine.reputation_of("u1").await.unwrap().record;
    assert_eq!(record.rejected_tags, 1);
    assert_eq!(record.pending_tags, 0);
    // 0.7 * 0 + 0.3 * 0.5
    assert!(approx(record.reputation_score, 0.15));
}

#[tokio::test]
async fn test_second_decision_is_refused() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;
    app.engine.approve_tag(tag.id, ADMIN).await.unwrap();

    let again = app.engine.reject_tag(tag.id, ADMIN, None).await;
    assert!(matches!(again, Err(Error::AlreadyDecided(_))));

    let record = app.engine.reputation_of("u1").await.unwrap().record;
    assert_eq!(record.approved_tags, 1);
    assert_eq!(record.rejected_tags, 0);
}

#[tokio::test]
async fn test_duplicate_open_tag_is_refused() {
    let app = TestApp::new().await;
    let first = app.submit("u1", "photo-p", "Jane Doe").await;

    let dup = app
        .engine
        .submit_tag(new_tag("photo-p", "  jane   DOE. "), "u1")
        .await;
    assert!(matches!(dup, Err(Error::Duplicate(_))));

    // A different submitter may tag the same name
    app.submit("u2", "photo-p", "Jane Doe").await;

    // Once rejected, the triple is free again
    app.engine.reject_tag(first.id, ADMIN, None).await.unwrap();
    let retry = app.submit("u1", "photo-p", "Jane Doe").await;
    assert_eq!(retry.status, TagStatus::Pending);

    let record = app.engine.reputation_of("u1").await.unwrap().record;
    assert_eq!(record.pending_tags, 1);
    assert_eq!(record.rejected_tags, 1);
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected() {
    let app = TestApp::new().await;

    let empty_name = app.engine.submit_tag(new_tag("photo-p", "   "), "u1").await;
    assert!(matches!(empty_name, Err(Error::Validation(_))));

    let empty_content = app.engine.submit_tag(new_tag(" ", "Jane"), "u1").await;
    assert!(matches!(empty_content, Err(Error::Validation(_))));

    let long_name = "x".repeat(201);
    let too_long = app.engine.submit_tag(new_tag("photo-p", &long_name), "u1").await;
    assert!(matches!(too_long, Err(Error::Validation(_))));

    // Nothing was recorded for the failed attempts
    let view = app.engine.reputation_of("u1").await.unwrap();
    assert!(view.events.is_empty());
}

// =============================================================================
// Withdrawal
// =============================================================================

#[tokio::test]
async fn test_withdraw_reverses_pending_and_votes() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;
    app.engine
        .cast_vote(tag.id, "voter", VoteDirection::Up)
        .await
        .unwrap();

    let not_owner = app.engine.withdraw_tag(tag.id, "someone-else").await;
    assert!(matches!(not_owner, Err(Error::NotOwner(_))));

    let withdrawal = app.engine.withdraw_tag(tag.id, "u1").await.unwrap();
    assert_eq!(withdrawal.upvotes_removed, 1);
    assert_eq!(withdrawal.downvotes_removed, 0);

    assert!(matches!(
        app.engine.get_tag(tag.id).await,
        Err(Error::NotFound(_))
    ));

    let view = app.engine.reputation_of("u1").await.unwrap();
    assert_eq!(view.record.pending_tags, 0);
    assert_eq!(view.record.upvotes_received, 0);
    assert_eq!(
        event_types(&view).last(),
        Some(&ReputationEventType::TagWithdrawn)
    );
    assert_eq!(view.events.last().unwrap().metadata["upvotes_removed"], 1);

    // The triple can be submitted again
    app.submit("u1", "photo-p", "Jane Doe").await;
}

#[tokio::test]
async fn test_withdraw_decided_tag_is_refused() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;
    app.engine.approve_tag(tag.id, ADMIN).await.unwrap();

    let result = app.engine.withdraw_tag(tag.id, "u1").await;
    assert!(matches!(result, Err(Error::AlreadyDecided(_))));
}

// =============================================================================
// Voting
// =============================================================================

#[tokio::test]
async fn test_vote_updates_confidence_and_submitter() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;

    let outcome = app
        .engine
        .cast_vote(tag.id, "v1", VoteDirection::Up)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert_eq!((outcome.upvotes, outcome.downvotes), (1, 0));
    assert!(approx(outcome.confidence, 2.0 / 3.0));

    let record = app.engine.reputation_of("u1").await.unwrap().record;
    assert_eq!(record.upvotes_received, 1);
    // No decided tags yet: score stays at the neutral prior
    assert!(approx(record.reputation_score, 0.5));
}

#[tokio::test]
async fn test_revote_replaces_previous_vote() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;

    app.engine
        .cast_vote(tag.id, "v1", VoteDirection::Up)
        .await
        .unwrap();
    let flipped = app
        .engine
        .cast_vote(tag.id, "v1", VoteDirection::Down)
        .await
        .unwrap();
    assert_eq!((flipped.upvotes, flipped.downvotes), (0, 1));
    assert!(approx(flipped.confidence, 1.0 / 3.0));

    let repeat = app
        .engine
        .cast_vote(tag.id, "v1", VoteDirection::Down)
        .await
        .unwrap();
    assert!(!repeat.changed);
    assert_eq!((repeat.upvotes, repeat.downvotes), (0, 1));

    // One row per voter; the flip keeps the original creation time
    let mut conn = app.engine.db().acquire().await.unwrap();
    let vote = tagtrust_server::db::votes::get_vote(&mut conn, tag.id, "v1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(vote.direction, VoteDirection::Down);
    assert_eq!(vote.voter_id, "v1");
    assert!(vote.updated_at > vote.created_at);
    drop(conn);

    let view = app.engine.reputation_of("u1").await.unwrap();
    assert_eq!(view.record.upvotes_received, 0);
    assert_eq!(view.record.downvotes_received, 1);
    let vote_events = view
        .events
        .iter()
        .filter(|e| e.event_type == ReputationEventType::VoteReceived)
        .count();
    assert_eq!(vote_events, 2);
}

#[tokio::test]
async fn test_vote_rules() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;

    let own = app.engine.cast_vote(tag.id, "u1", VoteDirection::Up).await;
    assert!(matches!(own, Err(Error::Forbidden(_))));

    app.engine.reject_tag(tag.id, ADMIN, None).await.unwrap();
    let on_rejected = app.engine.cast_vote(tag.id, "v1", VoteDirection::Up).await;
    assert!(matches!(on_rejected, Err(Error::AlreadyDecided(_))));

    let missing = app
        .engine
        .cast_vote(uuid::Uuid::new_v4(), "v1", VoteDirection::Up)
        .await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

// =============================================================================
// Trust changes
// =============================================================================

#[tokio::test]
async fn test_downgrade_stops_auto_approval_but_keeps_history() {
    let app = TestApp::new().await;
    let history = app.approved_history("pro", 10).await;
    assert!(app.engine.reputation_of("pro").await.unwrap().record.auto_approve);

    let early = app.submit("pro", "photo-early", "Early Bird").await;
    assert_eq!(early.status, TagStatus::Approved);

    // All received votes negative: 0.7 * 1 + 0.3 * 0 = 0.7 < 0.8
    app.engine
        .cast_vote(history[0].id, "critic", VoteDirection::Down)
        .await
        .unwrap();
    let record = app.engine.reputation_of("pro").await.unwrap().record;
    assert_eq!(record.trust_level, TrustLevel::Learning);
    assert!(!record.auto_approve);

    let later = app.submit("pro", "photo-later", "Late Comer").await;
    assert_eq!(later.status, TagStatus::Pending);

    // Past auto-approvals are not revisited
    let early = app.engine.get_tag(early.id).await.unwrap();
    assert_eq!(early.status, TagStatus::Approved);
}

#[tokio::test]
async fn test_trust_override_pins_level() {
    let app = TestApp::new().await;

    let record = app
        .engine
        .set_trust_override("newbie", Some(TrustLevel::Trusted), ADMIN)
        .await
        .unwrap();
    assert_eq!(record.trust_level, TrustLevel::Trusted);
    assert!(record.auto_approve);

    let tag = app.submit("newbie", "photo-p", "Jane Doe").await;
    assert_eq!(tag.status, TagStatus::Approved);

    let cleared = app
        .engine
        .set_trust_override("newbie", None, ADMIN)
        .await
        .unwrap();
    assert_eq!(cleared.trust_override, None);
    assert_eq!(cleared.trust_level, TrustLevel::New);

    // Clearing again appends nothing
    let before = app.engine.reputation_of("newbie").await.unwrap().events.len();
    app.engine
        .set_trust_override("newbie", None, ADMIN)
        .await
        .unwrap();
    let after = app.engine.reputation_of("newbie").await.unwrap().events.len();
    assert_eq!(before, after);
}

// =============================================================================
// Moderation queue
// =============================================================================

#[tokio::test]
async fn test_queue_orders_lowest_confidence_first() {
    let app = TestApp::new().await;
    let neutral = app.submit("u1", "photo-a", "Neutral").await;
    let liked = app.submit("u2", "photo-b", "Liked").await;
    let disliked = app.submit("u3", "photo-c", "Disliked").await;

    app.engine
        .cast_vote(liked.id, "v1", VoteDirection::Up)
        .await
        .unwrap();
    app.engine
        .cast_vote(disliked.id, "v1", VoteDirection::Down)
        .await
        .unwrap();

    let page = app.engine.list_queue(TagStatus::Pending, 1).await.unwrap();
    let order: Vec<_> = page.tags.iter().map(|e| e.tag.id).collect();
    assert_eq!(order, vec![disliked.id, neutral.id, liked.id]);
    assert!(approx(page.tags[0].priority, 2.0 / 3.0));
    assert_eq!(page.pagination.total_results, 3);
}

#[tokio::test]
async fn test_queue_ties_break_by_age() {
    let app = TestApp::new().await;
    let first = app.submit("u1", "photo-a", "One").await;
    let second = app.submit("u2", "photo-b", "Two").await;

    let page = app.engine.list_queue(TagStatus::Pending, 1).await.unwrap();
    let order: Vec<_> = page.tags.iter().map(|e| e.tag.id).collect();
    assert_eq!(order, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_decided_tags_are_browsable() {
    let app = TestApp::new().await;
    let a = app.submit("u1", "photo-a", "One").await;
    let b = app.submit("u2", "photo-b", "Two").await;
    app.engine.approve_tag(a.id, ADMIN).await.unwrap();
    app.engine.approve_tag(b.id, ADMIN).await.unwrap();

    let approved = app.engine.list_queue(TagStatus::Approved, 1).await.unwrap();
    let order: Vec<_> = approved.tags.iter().map(|e| e.tag.id).collect();
    assert_eq!(order, vec![b.id, a.id]);

    let pending = app.engine.list_queue(TagStatus::Pending, 1).await.unwrap();
    assert!(pending.tags.is_empty());
    assert_eq!(pending.pagination.total_pages, 0);
}

#[tokio::test]
async fn test_queue_pagination() {
    let app = TestApp::with_settings(tagtrust_server::engine::EngineSettings {
        max_lock_wait_ms: 5000,
        page_size: 2,
    })
    .await;
    for i in 0..5 {
        app.submit(&format!("u{}", i), &format!("photo-{}", i), "Name").await;
    }

    let page = app.engine.list_queue(TagStatus::Pending, 3).await.unwrap();
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.tags.len(), 1);
}

#[tokio::test]
async fn test_batch_approve_reports_each_tag() {
    let app = TestApp::new().await;
    let a = app.submit("u1", "photo-a", "One").await;
    let b = app.submit("u2", "photo-b", "Two").await;
    app.engine.reject_tag(b.id, ADMIN, None).await.unwrap();
    let missing = uuid::Uuid::new_v4();

    let outcome = app
        .engine
        .batch_approve(&[a.id, b.id, missing], ADMIN)
        .await
        .unwrap();
    assert_eq!(outcome.approved, 1);
    assert_eq!(outcome.failed, 2);
    assert!(outcome.results[0].approved);
    assert!(!outcome.results[1].approved);
    assert!(outcome.results[2].error.is_some());

    let empty = app.engine.batch_approve(&[], ADMIN).await;
    assert!(matches!(empty, Err(Error::Validation(_))));
}

// =============================================================================
// Visibility
// =============================================================================

#[tokio::test]
async fn test_listing_visibility() {
    let app = TestApp::new().await;
    let approved = app.submit("u1", "photo-p", "Jane Doe").await;
    app.engine.approve_tag(approved.id, ADMIN).await.unwrap();
    let pending = app.submit("u2", "photo-p", "John Roe").await;
    let rejected = app.submit("u2", "photo-p", "Jon Row").await;
    app.engine.reject_tag(rejected.id, ADMIN, None).await.unwrap();

    use tagtrust_server::engine::Viewer;
    let anonymous = app
        .engine
        .list_tags_for_content("photo-p", Viewer::Anonymous)
        .await
        .unwrap();
    assert_eq!(anonymous.len(), 1);

    let owner = app
        .engine
        .list_tags_for_content("photo-p", Viewer::User("u2"))
        .await
        .unwrap();
    assert_eq!(owner.len(), 2);
    assert!(owner.iter().any(|t| t.id == pending.id));
    assert!(owner.iter().all(|t| t.id != rejected.id));

    let stranger = app
        .engine
        .list_tags_for_content("photo-p", Viewer::User("u3"))
        .await
        .unwrap();
    assert_eq!(stranger.len(), 1);

    let admin = app
        .engine
        .list_tags_for_content("photo-p", Viewer::Admin)
        .await
        .unwrap();
    assert_eq!(admin.len(), 3);
}

// =============================================================================
// Entity directory
// =============================================================================

#[tokio::test]
async fn test_entity_promoted_after_two_submitters_agree() {
    let app = TestApp::new().await;
    let mut events = app.engine.event_bus().subscribe();

    let first = app.submit("alice", "photo-1", "Jane Doe").await;
    let second = app.submit("bob", "photo-2", "jane doe.").await;

    app.engine.approve_tag(first.id, ADMIN).await.unwrap();
    let lookup = app.engine.lookup_entities("Jane Doe").await.unwrap();
    assert!(lookup.exact.is_none());

    app.engine.approve_tag(second.id, ADMIN).await.unwrap();
    let lookup = app.engine.lookup_entities("JANE DOE").await.unwrap();
    let entity = lookup.exact.expect("entity promoted");
    assert_eq!(entity.canonical_name, "Jane Doe");
    assert_eq!(entity.supporting_submitters, 2);

    for id in [first.id, second.id] {
        let tag = app.engine.get_tag(id).await.unwrap();
        assert!(matches!(tag.entity, EntityRef::Resolved { entity_id, .. } if entity_id == entity.id));
    }

    // Later submissions resolve immediately
    let third = app.submit("carol", "photo-3", "Jane  Doe").await;
    assert!(matches!(third.entity, EntityRef::Resolved { .. }));

    let mut promoted = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, TagTrustEvent::EntityPromoted { .. }) {
            promoted = true;
        }
    }
    assert!(promoted);
}

#[tokio::test]
async fn test_same_submitter_twice_does_not_promote() {
    let app = TestApp::new().await;
    let a = app.submit("alice", "photo-1", "Jane Doe").await;
    let b = app.submit("alice", "photo-2", "Jane Doe").await;
    app.engine.approve_tag(a.id, ADMIN).await.unwrap();
    app.engine.approve_tag(b.id, ADMIN).await.unwrap();

    let lookup = app.engine.lookup_entities("jane doe").await.unwrap();
    assert!(lookup.exact.is_none());
}

#[tokio::test]
async fn test_lookup_suggests_close_names() {
    let app = TestApp::new().await;
    for user in ["alice", "bob"] {
        let tag = app.submit(user, &format!("photo-{}", user), "Jane Doe").await;
        app.engine.approve_tag(tag.id, ADMIN).await.unwrap();
    }

    let lookup = app.engine.lookup_entities("Jane Do").await.unwrap();
    assert!(lookup.exact.is_none());
    assert_eq!(lookup.suggestions.len(), 1);
    assert_eq!(lookup.suggestions[0].entity.canonical_name, "Jane Doe");

    let far = app.engine.lookup_entities("Zebra Crossing").await.unwrap();
    assert!(far.suggestions.is_empty());
}

// =============================================================================
// Replay
// =============================================================================

#[tokio::test]
async fn test_records_equal_replay_of_their_events() {
    let app = TestApp::new().await;
    app.approved_history("u1", 3).await;
    let pending = app.submit("u1", "photo-x", "Withdrawn Soon").await;
    app.engine
        .cast_vote(pending.id, "v1", VoteDirection::Down)
        .await
        .unwrap();
    app.engine.withdraw_tag(pending.id, "u1").await.unwrap();
    let rejected = app.submit("u1", "photo-y", "Wrong").await;
    app.engine.reject_tag(rejected.id, ADMIN, None).await.unwrap();
    app.engine
        .set_trust_override("u1", Some(TrustLevel::Expert), ADMIN)
        .await
        .unwrap();

    let view = app.engine.reputation_of("u1").await.unwrap();
    let replayed = ledger::replay("u1", &view.events).unwrap();
    assert_eq!(replayed, view.record);

    let report = app.engine.reconcile(false).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.users_checked, 1);
}

#[tokio::test]
async fn test_reconcile_detects_and_repairs_drift() {
    let app = TestApp::new().await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;
    app.engine
        .cast_vote(tag.id, "v1", VoteDirection::Up)
        .await
        .unwrap();

    sqlx::query("UPDATE reputation_records SET approved_tags = 7 WHERE user_id = 'u1'")
        .execute(app.engine.db())
        .await
        .unwrap();
    sqlx::query("UPDATE tags SET upvotes = 5")
        .execute(app.engine.db())
        .await
        .unwrap();

    let report = app.engine.reconcile(false).await.unwrap();
    assert_eq!(report.drifted_users.len(), 1);
    let replayed = report.drifted_users[0].replayed.as_ref().unwrap();
    assert_eq!(replayed.approved_tags, 0);
    assert!(report.drifted_users[0].replay_error.is_none());
    assert_eq!(report.drifted_tags.len(), 1);
    assert_eq!(report.drifted_tags[0].counted_upvotes, 1);

    let repaired = app.engine.reconcile(true).await.unwrap();
    assert!(repaired.repaired);
    assert_eq!(repaired.drifted_users.len(), 1);

    let after = app.engine.reconcile(false).await.unwrap();
    assert!(after.is_clean());
    assert_eq!(app.engine.get_tag(tag.id).await.unwrap().upvotes, 1);
}

#[tokio::test]
async fn test_unreplayable_log_does_not_stop_reconciliation() {
    let app = TestApp::new().await;
    app.submit("good", "photo-g", "Jane Doe").await;
    app.submit("zbad", "photo-z", "John Roe").await;

    // Two approvals for a user with one pending tag cannot be folded
    for _ in 0..2 {
        sqlx::query(
            r#"
            INSERT INTO reputation_events (
                user_id, event_type, score_before, score_after, trust_before, trust_after,
                metadata, created_at
            )
            VALUES ('zbad', 'tag_approved', 0.5, 0.5, 'new', 'new', '{}', ?)
            "#,
        )
        .bind(chrono::Utc::now())
        .execute(app.engine.db())
        .await
        .unwrap();
    }
    sqlx::query("UPDATE reputation_records SET approved_tags = 3 WHERE user_id = 'good'")
        .execute(app.engine.db())
        .await
        .unwrap();

    let report = app.engine.reconcile(false).await.unwrap();
    assert_eq!(report.users_checked, 2);
    assert_eq!(report.drifted_users.len(), 2);

    let bad = report
        .drifted_users
        .iter()
        .find(|d| d.user_id == "zbad")
        .unwrap();
    assert!(bad.replayed.is_none());
    assert!(bad.replay_error.as_deref().unwrap().contains("went negative"));

    let good = report
        .drifted_users
        .iter()
        .find(|d| d.user_id == "good")
        .unwrap();
    assert!(good.replay_error.is_none());
    assert_eq!(good.replayed.as_ref().unwrap().approved_tags, 0);

    // Repair fixes the foldable user and leaves the broken log alone
    let repaired = app.engine.reconcile(true).await.unwrap();
    assert_eq!(repaired.drifted_users.len(), 2);
    let after = app.engine.reconcile(false).await.unwrap();
    assert_eq!(after.drifted_users.len(), 1);
    assert_eq!(after.drifted_users[0].user_id, "zbad");
    assert_eq!(
        app.engine.reputation_of("good").await.unwrap().record.approved_tags,
        0
    );
}

#[tokio::test]
async fn test_decision_rolls_back_when_database_stays_locked() {
    let app = TestApp::with_settings(EngineSettings {
        max_lock_wait_ms: 300,
        page_size: 50,
    })
    .await;
    let tag = app.submit("u1", "photo-p", "Jane Doe").await;

    // Another writer holds the database write lock for the whole attempt
    let mut blocker = app.engine.db().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *blocker)
        .await
        .unwrap();

    let result = app.engine.approve_tag(tag.id, ADMIN).await;
    assert!(matches!(result, Err(Error::Transient(_))));

    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);

    let stored = app.engine.get_tag(tag.id).await.unwrap();
    assert_eq!(stored.status, TagStatus::Pending);
    let view = app.engine.reputation_of("u1").await.unwrap();
    assert_eq!(view.record.pending_tags, 1);
    assert_eq!(view.record.approved_tags, 0);
    assert_eq!(event_types(&view), vec![ReputationEventType::TagSubmitted]);
}
