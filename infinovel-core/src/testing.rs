//! Testing utilities for the story engine.
//!
//! This module provides tools for integration testing:
//! - `MockNarrator` for deterministic chapters without API calls
//! - `FlakyStore` for simulating storage outages
//! - `TestHarness` for scripted play sessions
//! - Assertion helpers for verifying session state

use crate::chapter::Chapter;
use crate::narrator::{ChapterDraft, ChapterGenerator, ChoiceDraft, GenerationError, GenerationRequest};
use crate::persist::{Identity, SaveRepository, SaveSlot};
use crate::session::{ChapterPhase, ChoiceOutcome, GameSession, Services, SessionError};
use crate::stats::{Allocation, Stat, StatGain};
use crate::store::{DocumentStore, MemoryStore, Namespace, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Uid of the player every harness signs in as.
pub const TEST_UID: &str = "test-reader";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A scripted reply from the mock narrator.
#[derive(Debug, Clone)]
pub enum MockReply {
    Chapter(ChapterDraft),
    Failure(String),
}

/// A chapter generator that returns scripted drafts.
///
/// Once the script runs out every call gets a generic continuing chapter
/// whose id is left to the path, so distinct branches stay distinct.
pub struct MockNarrator {
    script: Mutex<VecDeque<MockReply>>,
    always_fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockNarrator {
    /// Create a mock narrator that returns `drafts` in order.
    pub fn new(drafts: Vec<ChapterDraft>) -> Self {
        Self::scripted(drafts.into_iter().map(MockReply::Chapter).collect())
    }

    /// Create a mock narrator from a mixed script of chapters and failures.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            always_fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A narrator whose every call fails.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Sleep before answering (use with a paused tokio clock).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue(&self, draft: ChapterDraft) {
        lock(&self.script).push_back(MockReply::Chapter(draft));
    }

    pub fn queue_failure(&self, message: impl Into<String>) {
        lock(&self.script).push_back(MockReply::Failure(message.into()));
    }

    /// Number of generate calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        lock(&self.requests).last().cloned()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    /// A two-choice chapter titled `title`.
    ///
    /// `press_on` is open to everyone and builds Intelligence progress;
    /// `force_through` needs Strength 8 and raises Strength.
    pub fn chapter(title: &str) -> ChapterDraft {
        let id = title
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("_");

        ChapterDraft {
            chapter_id: Some(id),
            title: title.to_string(),
            content: vec![
                format!("{title}. The gaslights gutter as the fog rolls in."),
                "Somewhere a clock strikes, and the trail grows warmer.".to_string(),
            ],
            is_timed_choice: false,
            time_limit: None,
            choices: vec![
                ChoiceDraft {
                    text: "Press on carefully.".to_string(),
                    choice_id: "press_on".to_string(),
                    required_stats: None,
                    stat_gain: Some(StatGain::default().with_accumulation(Stat::Intelligence, 1)),
                    skill_check: None,
                },
                ChoiceDraft {
                    text: "Force your way through.".to_string(),
                    choice_id: "force_through".to_string(),
                    required_stats: Some(BTreeMap::from([("strength".to_string(), 8)])),
                    stat_gain: Some(StatGain::default().with_increase(Stat::Strength, 1)),
                    skill_check: None,
                },
            ],
        }
    }

    /// Like [`MockNarrator::chapter`] but with a countdown of `seconds`.
    pub fn timed_chapter(title: &str, seconds: i64) -> ChapterDraft {
        ChapterDraft {
            is_timed_choice: true,
            time_limit: Some(seconds),
            ..Self::chapter(title)
        }
    }

    /// A chapter with no choices.
    pub fn ending(title: &str) -> ChapterDraft {
        ChapterDraft {
            choices: Vec::new(),
            ..Self::chapter(title)
        }
    }

    fn continuing() -> ChapterDraft {
        ChapterDraft {
            chapter_id: None,
            ..Self::chapter("The Story Continues")
        }
    }
}

#[async_trait]
impl ChapterGenerator for MockNarrator {
    async fn generate(&self, request: &GenerationRequest) -> Result<ChapterDraft, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail {
            return Err(GenerationError::Unavailable("mock narrator is failing".to_string()));
        }

        let reply = lock(&self.script).pop_front();
        match reply {
            Some(MockReply::Chapter(draft)) => Ok(draft),
            Some(MockReply::Failure(message)) => Err(GenerationError::Unavailable(message)),
            None => Ok(Self::continuing()),
        }
    }
}

/// A memory store that can be told to fail.
///
/// Failures are per collection, or everywhere with [`FlakyStore::fail_everything`].
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `collection` fail.
    pub fn fail_collection(&self, collection: impl Into<String>) {
        lock(&self.failing).insert(collection.into());
    }

    pub fn fail_everything(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail_all.store(false, Ordering::SeqCst);
        lock(&self.failing).clear();
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, collection: &str) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) || lock(&self.failing).contains(collection) {
            Err(StoreError::Unavailable(format!("{collection} is unreachable")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.check(collection)?;
        self.inner.get(collection, key).await
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.check(collection)?;
        self.inner.set(collection, key, value).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.check(collection)?;
        self.inner.delete(collection, key).await
    }
}

/// Test harness for running play sessions against a memory store.
pub struct TestHarness {
    /// The backing store.
    pub store: Arc<MemoryStore>,
    /// The mock narrator.
    pub narrator: Arc<MockNarrator>,
    /// The session under test, signed in as [`TEST_UID`].
    pub session: GameSession,
}

impl TestHarness {
    /// Create a harness whose narrator has no script.
    pub async fn new() -> Self {
        Self::with_narrator(MockNarrator::new(Vec::new())).await
    }

    pub async fn with_narrator(narrator: MockNarrator) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), narrator).await
    }

    /// Create a harness over an existing store, e.g. to resume a save.
    pub async fn with_store(store: Arc<MemoryStore>, narrator: MockNarrator) -> Self {
        let narrator = Arc::new(narrator);
        let services = Services::new(store.clone(), narrator.clone());
        let session = GameSession::new(services, Some(Identity::anonymous(TEST_UID))).await;
        Self {
            store,
            narrator,
            session,
        }
    }

    /// Services over a fresh memory store and an unscripted narrator.
    pub fn services() -> Services {
        Services::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockNarrator::new(Vec::new())),
        )
    }

    /// Distribute creation points without confirming.
    pub fn allocate(&mut self, allocation: Allocation) -> Result<(), SessionError> {
        for stat in Stat::all() {
            let amount = allocation.get(stat) as i32;
            if amount > 0 {
                self.session.adjust_allocation(stat, amount)?;
            }
        }
        Ok(())
    }

    /// Create a 4/3/3 character and show the opening choices.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.allocate(Allocation::new(4, 3, 3))?;
        self.session.confirm_allocation()?;
        self.session.proceed_to_choices()
    }

    /// Queue a chapter for the next generation.
    pub fn expect_chapter(&mut self, draft: ChapterDraft) -> &mut Self {
        self.narrator.queue(draft);
        self
    }

    /// Choose, then reveal the next chapter's choices.
    pub async fn choose_and_proceed(&mut self, choice_id: &str) -> Result<ChoiceOutcome, SessionError> {
        let outcome = self.session.choose(choice_id).await?;
        if !self.session.chapter().is_ending() {
            self.session.proceed_to_choices()?;
        }
        Ok(outcome)
    }

    /// The player's stored save slot.
    pub async fn saved_slot(&self) -> Option<SaveSlot> {
        SaveRepository::new(self.store.clone(), Namespace::default())
            .load_save(TEST_UID)
            .await
            .ok()
            .flatten()
    }

    pub fn chapter(&self) -> &Chapter {
        self.session.chapter()
    }

    pub fn chapter_title(&self) -> &str {
        &self.session.chapter().title
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session is in `expected` phase (countdowns compared by kind only).
#[track_caller]
pub fn assert_phase(harness: &TestHarness, expected: &ChapterPhase) {
    let actual = harness.session.phase();
    let same = match (actual, expected) {
        (ChapterPhase::Countdown(_), ChapterPhase::Countdown(_)) => true,
        _ => actual == expected,
    };
    assert!(same, "Expected phase {expected:?}, got {actual:?}");
}

/// Assert the current chapter has this title.
#[track_caller]
pub fn assert_chapter(harness: &TestHarness, title: &str) {
    assert_eq!(
        harness.chapter_title(),
        title,
        "Expected chapter '{title}', got '{}'",
        harness.chapter_title()
    );
}

/// Assert a stat's current value.
#[track_caller]
pub fn assert_stat(harness: &TestHarness, stat: Stat, value: u32) {
    let actual = harness.session.stats().get(stat);
    assert_eq!(actual, value, "Expected {stat} {value}, got {actual}");
}
