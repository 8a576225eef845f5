//! End-to-end choice cycle tests against the mock narrator.
//!
//! Run with: `cargo test -p infinovel-core --test choice_flow`

use infinovel_core::chapter::OPENING_CHAPTER_ID;
use infinovel_core::ledger::Percentage;
use infinovel_core::resolver::{path_id, ResolutionSource};
use infinovel_core::session::{ChapterPhase, GameSession, LoadMode, SaveMode, Services};
use infinovel_core::stats::Stat;
use infinovel_core::store::{MemoryStore, Namespace};
use infinovel_core::testing::{
    assert_chapter, assert_phase, assert_stat, FlakyStore, MockNarrator, MockReply, TestHarness,
    TEST_UID,
};
use infinovel_core::{Identity, SessionError};
use std::sync::Arc;

// =============================================================================
// BASIC FLOW
// =============================================================================

#[tokio::test]
async fn test_full_cycle_updates_everything() {
    let mut harness = TestHarness::new().await;
    harness.expect_chapter(MockNarrator::chapter("The Clock Tower"));
    harness.start().await.unwrap();

    let outcome = harness.session.choose("to_clock_tower").await.unwrap();

    assert_eq!(outcome.choice.choice_id, "to_clock_tower");
    assert_eq!(outcome.percentage, Percentage::NotAvailable);
    assert_eq!(outcome.source, ResolutionSource::Generated);
    assert_chapter(&harness, "The Clock Tower");
    assert_phase(&harness, &ChapterPhase::AwaitingProceed);

    let history = harness.session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].chapter_id, OPENING_CHAPTER_ID);
    assert_eq!(history[0].choice_text, outcome.choice.text);
    assert!(!history[0].automatic);

    let slot = harness.saved_slot().await.expect("auto-save should have run");
    assert_eq!(slot.current_chapter_state.unwrap().title, "The Clock Tower");
    assert_eq!(slot.user_path_history.len(), 1);
}

#[tokio::test]
async fn test_gains_accumulate_into_stat_points() {
    let mut harness = TestHarness::new().await;
    for title in ["One", "Two", "Three", "Four"] {
        harness.expect_chapter(MockNarrator::chapter(title));
    }
    harness.start().await.unwrap();
    assert_stat(&harness, Stat::Intelligence, 4);

    harness.choose_and_proceed("to_clock_tower").await.unwrap();
    // press_on grants one point of Intelligence progress each time
    harness.choose_and_proceed("press_on").await.unwrap();
    harness.choose_and_proceed("press_on").await.unwrap();
    assert_stat(&harness, Stat::Intelligence, 4);
    assert_eq!(harness.session.stats().intelligence_accumulation, 2);

    let outcome = harness.choose_and_proceed("press_on").await.unwrap();
    assert_stat(&harness, Stat::Intelligence, 5);
    assert_eq!(harness.session.stats().intelligence_accumulation, 0);
    assert_eq!(outcome.improved_stats(), vec![(Stat::Intelligence, 5)]);
}

#[tokio::test]
async fn test_locked_choices_are_visible_but_rejected() {
    let mut harness = TestHarness::new().await;
    harness.expect_chapter(MockNarrator::chapter("The Gate"));
    harness.start().await.unwrap();
    harness.choose_and_proceed("to_clock_tower").await.unwrap();

    let views = harness.session.choices();
    assert_eq!(views.len(), 2);
    let locked = views.iter().find(|v| v.choice_id == "force_through").unwrap();
    assert!(!locked.available);
    assert!(locked.hint.contains("Strength 8"));

    let err = harness.session.choose("force_through").await.unwrap_err();
    assert!(matches!(err, SessionError::ChoiceLocked(_)));
    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(harness.narrator.calls(), 1);
}

#[tokio::test]
async fn test_strong_character_can_take_gated_choice() {
    let mut harness = TestHarness::new().await;
    harness
        .expect_chapter(MockNarrator::chapter("The Gate"))
        .expect_chapter(MockNarrator::chapter("Beyond"));
    harness
        .allocate(infinovel_core::stats::Allocation::new(8, 1, 1))
        .unwrap();
    harness.session.confirm_allocation().unwrap();
    harness.session.proceed_to_choices().unwrap();

    harness.choose_and_proceed("to_clock_tower").await.unwrap();
    harness.choose_and_proceed("force_through").await.unwrap();
    assert_stat(&harness, Stat::Strength, 10);
    assert_chapter(&harness, "Beyond");
}

// =============================================================================
// SHARED CACHE AND LEDGER
// =============================================================================

#[tokio::test]
async fn test_second_player_reads_cached_chapter() {
    let store = Arc::new(MemoryStore::new());
    let narrator = Arc::new(MockNarrator::new(vec![MockNarrator::chapter("Shared")]));
    let services = Services::new(store.clone(), narrator.clone());

    let mut first = GameSession::new(services.clone(), Some(Identity::anonymous("first"))).await;
    let mut second = GameSession::new(services, Some(Identity::anonymous("second"))).await;
    for session in [&mut first, &mut second] {
        session.adjust_allocation(Stat::Agility, 10).unwrap();
        session.confirm_allocation().unwrap();
        session.proceed_to_choices().unwrap();
    }

    let a = first.choose("to_clock_tower").await.unwrap();
    let b = second.choose("to_clock_tower").await.unwrap();

    assert_eq!(a.source, ResolutionSource::Generated);
    assert_eq!(b.source, ResolutionSource::Cache);
    assert_eq!(a.chapter, b.chapter);
    assert_eq!(narrator.calls(), 1);

    // The second player sees the share before their own selection
    assert_eq!(a.percentage, Percentage::NotAvailable);
    assert_eq!(b.percentage.to_string(), "100.0");

    let stats = first.choice_stats().await;
    assert!(stats.is_empty(), "new chapter has no selections yet");

    let cache = Namespace::default().chapter_cache();
    assert_eq!(store.count(&cache).await, 1);
    let key = path_id(OPENING_CHAPTER_ID, "to_clock_tower");
    assert!(infinovel_core::store::DocumentStore::get(store.as_ref(), &cache, &key)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_ledger_percentages_across_players() {
    let store = Arc::new(MemoryStore::new());
    let services = Services::new(store, Arc::new(MockNarrator::new(Vec::new())));

    let picks = ["to_clock_tower", "to_clock_tower", "research_grayson_background"];
    let mut last = None;
    for (i, pick) in picks.iter().enumerate() {
        let mut session =
            GameSession::new(services.clone(), Some(Identity::anonymous(format!("p{i}")))).await;
        session.adjust_allocation(Stat::Strength, 10).unwrap();
        session.confirm_allocation().unwrap();
        session.proceed_to_choices().unwrap();
        last = Some(session.choose(pick).await.unwrap());
    }

    // Third player: research had 0 of 2 prior selections
    assert_eq!(last.unwrap().percentage.to_string(), "0.0");

    let mut viewer = GameSession::new(services, None).await;
    viewer.adjust_allocation(Stat::Strength, 10).unwrap();
    let stats = viewer.choice_stats().await;
    assert_eq!(stats["to_clock_tower"].count, 2);
    assert_eq!(stats["to_clock_tower"].percentage.to_string(), "66.7");
    assert_eq!(stats["research_grayson_background"].percentage.to_string(), "33.3");
    assert_eq!(stats["investigate_lab_thoroughly"].count, 0);
}

// =============================================================================
// DEGRADED PATHS
// =============================================================================

#[tokio::test]
async fn test_generation_failure_degrades_and_is_not_cached() {
    let store = Arc::new(MemoryStore::new());
    let mut harness = TestHarness::with_store(store.clone(), MockNarrator::failing()).await;
    harness.start().await.unwrap();

    let outcome = harness.session.choose("to_clock_tower").await.unwrap();
    assert_eq!(outcome.source, ResolutionSource::Degraded);
    assert_chapter(&harness, "Generation Failed");
    assert!(harness.session.chapter().is_ending());
    assert_eq!(store.count(&Namespace::default().chapter_cache()).await, 0);

    // The selection itself still counted
    assert_eq!(harness.session.history().len(), 1);
}

#[tokio::test]
async fn test_retry_after_failure_generates_fresh() {
    let store = Arc::new(MemoryStore::new());
    let narrator = MockNarrator::scripted(vec![
        MockReply::Failure("overloaded".to_string()),
        MockReply::Chapter(MockNarrator::chapter("Second Try")),
    ]);
    let mut harness = TestHarness::with_store(store, narrator).await;
    harness.start().await.unwrap();

    harness.session.choose("to_clock_tower").await.unwrap();
    assert_chapter(&harness, "Generation Failed");

    harness.session.restart().await.unwrap();
    harness.start().await.unwrap();
    let outcome = harness.session.choose("to_clock_tower").await.unwrap();
    assert_eq!(outcome.source, ResolutionSource::Generated);
    assert_chapter(&harness, "Second Try");
}

#[tokio::test]
async fn test_failed_generation_keeps_last_good_save() {
    let narrator = MockNarrator::scripted(vec![
        MockReply::Chapter(MockNarrator::chapter("Good Chapter")),
        MockReply::Failure("overloaded".to_string()),
    ]);
    let mut harness = TestHarness::with_narrator(narrator).await;
    harness.start().await.unwrap();

    harness.session.choose("to_clock_tower").await.unwrap();
    harness.session.save(SaveMode::Manual).await.unwrap();
    let stats_at_save = *harness.session.stats();

    harness.session.proceed_to_choices().unwrap();
    let outcome = harness.session.choose("press_on").await.unwrap();
    assert_eq!(outcome.source, ResolutionSource::Degraded);
    assert_chapter(&harness, "Generation Failed");

    // The dead end was not auto-saved over the good chapter
    let slot = harness.saved_slot().await.unwrap();
    assert_eq!(slot.current_chapter_state.unwrap().title, "Good Chapter");
    assert_eq!(slot.user_path_history.len(), 1);

    assert!(harness.session.load(LoadMode::Manual).await.unwrap());
    assert_chapter(&harness, "Good Chapter");
    assert_phase(&harness, &ChapterPhase::AwaitingProceed);
    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(*harness.session.stats(), stats_at_save);
}

#[tokio::test]
async fn test_ledger_outage_does_not_block_choice() {
    let store = Arc::new(FlakyStore::new());
    store.fail_collection(Namespace::default().choice_stats());
    let services = Services::new(store.clone(), Arc::new(MockNarrator::new(vec![
        MockNarrator::chapter("Unbothered"),
    ])));

    let mut session = GameSession::new(services, Some(Identity::anonymous(TEST_UID))).await;
    session.adjust_allocation(Stat::Intelligence, 10).unwrap();
    session.confirm_allocation().unwrap();
    session.proceed_to_choices().unwrap();

    let outcome = session.choose("to_clock_tower").await.unwrap();
    assert_eq!(outcome.percentage, Percentage::NotAvailable);
    assert_eq!(session.chapter().title, "Unbothered");
    assert!(session.choice_stats().await.is_empty());
}

#[tokio::test]
async fn test_storage_outage_still_advances_story() {
    let store = Arc::new(FlakyStore::new());
    let services = Services::new(store.clone(), Arc::new(MockNarrator::new(vec![
        MockNarrator::chapter("Offline"),
    ])));
    let mut session = GameSession::new(services, Some(Identity::anonymous(TEST_UID))).await;
    session.adjust_allocation(Stat::Intelligence, 10).unwrap();
    session.confirm_allocation().unwrap();
    session.proceed_to_choices().unwrap();

    store.fail_everything();
    let outcome = session.choose("to_clock_tower").await.unwrap();
    assert_eq!(outcome.source, ResolutionSource::Generated);
    assert_eq!(session.chapter().title, "Offline");

    let err = session
        .save(SaveMode::Manual)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), infinovel_core::ErrorKind::Transient);
}
