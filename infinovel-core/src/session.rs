//! GameSession - the primary public API for playing a story.
//!
//! A session owns the player's state (stats, current chapter, path history)
//! and moves it through [`ChapterPhase`] only via the named transitions
//! below. Selecting a choice always runs the same cycle, whether the player
//! clicked or a countdown expired:
//!
//! 1. stop the countdown
//! 2. apply the choice's stat gain
//! 3. record the selection in the popularity ledger and append to history
//! 4. resolve the next chapter (cache or generator)
//! 5. auto-save

use crate::chapter::{Chapter, Choice, PathHistoryEntry};
use crate::config::{Config, ConfigError};
use crate::countdown::{Countdown, Tick};
use crate::gate::{choice_views, is_available, ChoiceView, GateError};
use crate::ledger::{ChoiceShare, Ledger, Percentage};
use crate::narrator::ChapterGenerator;
use crate::persist::{FeedbackEntry, Identity, PersistError, Profile, SaveRepository, SaveSlot};
use crate::quota::{QuotaError, QuotaKind, QuotaLimits};
use crate::resolver::{Resolution, ResolutionSource, Resolver, DEFAULT_GENERATION_TIMEOUT};
use crate::stats::{AllocationError, CharacterStats, PointAllocation, Stat};
use crate::store::{DocumentStore, Namespace, StoreError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Chapter id recorded on feedback sent before any chapter is known.
pub const INITIAL_FEEDBACK_CHAPTER: &str = "initial_load";

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("Feedback is empty")]
    EmptyFeedback,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("No saved story found")]
    NoSaveFound,

    #[error("Unknown choice '{0}'")]
    UnknownChoice(String),

    #[error("Choice '{0}' requires higher stats")]
    ChoiceLocked(String),

    #[error("Cannot {action} while {phase}")]
    WrongPhase {
        action: &'static str,
        phase: &'static str,
    },

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// How a [`SessionError`] should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The player can fix it (retry differently, wait, sign in).
    UserCorrectable,
    /// Infrastructure hiccup; retrying may work.
    Transient,
    /// Upstream data broke a contract the engine relies on.
    ContractViolation,
    /// Can't continue; exit.
    Fatal,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Allocation(_)
            | SessionError::Quota(_)
            | SessionError::EmptyFeedback
            | SessionError::NotSignedIn
            | SessionError::NoSaveFound
            | SessionError::UnknownChoice(_)
            | SessionError::ChoiceLocked(_)
            | SessionError::WrongPhase { .. } => ErrorKind::UserCorrectable,
            SessionError::Persist(PersistError::Store(_)) => ErrorKind::Transient,
            SessionError::Persist(_) | SessionError::Gate(_) => ErrorKind::ContractViolation,
            SessionError::Config(_) => ErrorKind::Fatal,
        }
    }

    /// Text safe to show the player. Never includes raw backend errors.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Allocation(AllocationError::IncompleteAllocation { remaining }) => {
                format!("You still have {remaining} stat point(s) to assign.")
            }
            SessionError::Allocation(AllocationError::OverAllocated { excess }) => {
                format!("You assigned {excess} point(s) too many.")
            }
            SessionError::Quota(QuotaError::QuotaExceeded { kind, limit }) => {
                format!("You have reached your {kind} limit ({limit}).")
            }
            SessionError::EmptyFeedback => "Please write some feedback first.".to_string(),
            SessionError::NotSignedIn => "Sign in to save, load or send feedback.".to_string(),
            SessionError::NoSaveFound => "No saved story was found.".to_string(),
            SessionError::UnknownChoice(id) => format!("There is no choice '{id}' here."),
            SessionError::ChoiceLocked(_) => {
                "Your character isn't capable of that yet.".to_string()
            }
            SessionError::WrongPhase { action, .. } => format!("You can't {action} right now."),
            SessionError::Persist(PersistError::Store(_)) => {
                "Couldn't reach storage. Please try again.".to_string()
            }
            SessionError::Persist(_) => {
                "Your saved story couldn't be read by this version.".to_string()
            }
            SessionError::Gate(_) => {
                "Time ran out and the story has no way forward.".to_string()
            }
            SessionError::Config(e) => format!("Configuration problem: {e}"),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Persist(PersistError::Store(err))
    }
}

/// Where the session is within the current chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterPhase {
    /// Distributing the initial stat points.
    CreatingCharacter,
    /// Reading the chapter; choices are not shown yet.
    AwaitingProceed,
    /// Choices are shown, no timer.
    Presenting,
    /// Choices are shown and a timer is running.
    Countdown(Countdown),
    /// A choice is being resolved.
    Resolving,
    /// A countdown expired with no fallback.
    Stalled,
}

impl ChapterPhase {
    pub fn name(&self) -> &'static str {
        match self {
            ChapterPhase::CreatingCharacter => "creating a character",
            ChapterPhase::AwaitingProceed => "reading",
            ChapterPhase::Presenting => "choosing",
            ChapterPhase::Countdown(_) => "choosing against the clock",
            ChapterPhase::Resolving => "the next chapter is being written",
            ChapterPhase::Stalled => "the story is halted",
        }
    }

    /// Whether a choice may be submitted.
    pub fn accepts_choice(&self) -> bool {
        matches!(self, ChapterPhase::Presenting | ChapterPhase::Countdown(_))
    }
}

/// Whether a save counts against the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Manual,
    /// After each chapter; never counted or limited.
    Auto,
}

/// Whether a load counts against the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Manual,
    /// Silent resume on sign-in; never counted or limited.
    Startup,
}

/// Collaborators a session needs.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub generator: Arc<dyn ChapterGenerator>,
    pub namespace: Namespace,
    pub generation_timeout: Duration,
}

impl Services {
    pub fn new(store: Arc<dyn DocumentStore>, generator: Arc<dyn ChapterGenerator>) -> Self {
        Self {
            store,
            generator,
            namespace: Namespace::default(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    /// Services configured from startup configuration.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn ChapterGenerator>,
    ) -> Self {
        Self {
            store,
            generator,
            namespace: config.namespace(),
            generation_timeout: config.generation_timeout,
        }
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }
}

/// Result of one selection cycle.
#[derive(Debug, Clone)]
pub struct ChoiceOutcome {
    pub choice: Choice,
    /// Share of players who had made this choice before.
    pub percentage: Percentage,
    /// Selected by an expired countdown.
    pub automatic: bool,
    pub stats_before: CharacterStats,
    pub stats_after: CharacterStats,
    pub source: ResolutionSource,
    pub chapter: Chapter,
}

impl ChoiceOutcome {
    /// Stats that rose during this cycle, with their new values.
    pub fn improved_stats(&self) -> Vec<(Stat, u32)> {
        Stat::all()
            .into_iter()
            .filter(|&s| self.stats_after.get(s) > self.stats_before.get(s))
            .map(|s| (s, self.stats_after.get(s)))
            .collect()
    }
}

/// What a countdown tick did to the session.
#[derive(Debug, Clone)]
pub enum SessionTick {
    /// No countdown is running.
    Idle,
    Counting { remaining: u32 },
    /// Time ran out and the fallback choice was taken.
    AutoChosen(Box<ChoiceOutcome>),
}

/// A play session for one (optionally signed-in) player.
pub struct GameSession {
    identity: Option<Identity>,
    profile: Option<Profile>,
    repository: SaveRepository,
    ledger: Ledger,
    resolver: Resolver,
    stats: CharacterStats,
    allocation: PointAllocation,
    chapter: Chapter,
    history: Vec<PathHistoryEntry>,
    phase: ChapterPhase,
}

impl GameSession {
    /// Start a fresh session at character creation.
    ///
    /// For signed-in players the profile is created or refreshed; a failure
    /// there is logged and retried when a quota is next needed.
    pub async fn new(services: Services, identity: Option<Identity>) -> Self {
        let repository = SaveRepository::new(services.store.clone(), services.namespace.clone());
        let ledger = Ledger::new(services.store.clone(), &services.namespace);
        let resolver = Resolver::new(services.store, services.generator, &services.namespace)
            .with_timeout(services.generation_timeout);

        let profile = match &identity {
            Some(identity) => match repository.ensure_profile(identity).await {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(uid = %identity.uid, error = %e, "failed to load profile");
                    None
                }
            },
            None => None,
        };

        Self {
            identity,
            profile,
            repository,
            ledger,
            resolver,
            stats: CharacterStats::baseline(),
            allocation: PointAllocation::default(),
            chapter: Chapter::opening(),
            history: Vec::new(),
            phase: ChapterPhase::CreatingCharacter,
        }
    }

    // ========================================================================
    // Character creation
    // ========================================================================

    /// Move points into or out of a stat. Returns whether the step was allowed.
    pub fn adjust_allocation(&mut self, stat: Stat, delta: i32) -> Result<bool, SessionError> {
        self.require_phase("allocate stat points", |p| {
            matches!(p, ChapterPhase::CreatingCharacter)
        })?;
        Ok(self.allocation.adjust(stat, delta))
    }

    /// Finish character creation. The pool must be fully spent.
    pub fn confirm_allocation(&mut self) -> Result<CharacterStats, SessionError> {
        self.require_phase("confirm stats", |p| {
            matches!(p, ChapterPhase::CreatingCharacter)
        })?;
        self.stats = self.allocation.finish()?;
        self.phase = ChapterPhase::AwaitingProceed;
        info!(stats = %self.stats.summary(), "character created");
        Ok(self.stats)
    }

    // ========================================================================
    // Reading and choosing
    // ========================================================================

    /// Reveal the current chapter's choices, starting its countdown if timed.
    pub fn proceed_to_choices(&mut self) -> Result<(), SessionError> {
        self.require_phase("show the choices", |p| {
            matches!(p, ChapterPhase::AwaitingProceed)
        })?;

        let mut countdown = Countdown::new();
        self.phase = if countdown.start(&self.chapter) {
            debug!(chapter = %self.chapter.chapter_id, seconds = self.chapter.time_limit, "countdown started");
            ChapterPhase::Countdown(countdown)
        } else {
            ChapterPhase::Presenting
        };
        Ok(())
    }

    /// Select a choice of the current chapter and advance the story.
    pub async fn choose(&mut self, choice_id: &str) -> Result<ChoiceOutcome, SessionError> {
        self.require_phase("choose", ChapterPhase::accepts_choice)?;

        let choice = self
            .chapter
            .find_choice(choice_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownChoice(choice_id.to_string()))?;
        if !is_available(&choice, &self.stats) {
            return Err(SessionError::ChoiceLocked(choice.choice_id));
        }

        Ok(self.run_cycle(choice, false).await)
    }

    /// Advance a running countdown by one second.
    ///
    /// On expiry the fallback choice goes through the same cycle as a manual
    /// selection. With no fallback the story halts and the contract
    /// violation is returned.
    pub async fn tick(&mut self) -> Result<SessionTick, SessionError> {
        let ChapterPhase::Countdown(countdown) = &mut self.phase else {
            return Ok(SessionTick::Idle);
        };

        match countdown.tick(&self.chapter.choices) {
            Tick::Inactive => Ok(SessionTick::Idle),
            Tick::Running { remaining } => Ok(SessionTick::Counting { remaining }),
            Tick::Expired(choice) => {
                info!(choice = %choice.choice_id, "time ran out, taking default choice");
                let outcome = self.run_cycle(choice, true).await;
                Ok(SessionTick::AutoChosen(Box::new(outcome)))
            }
            Tick::Stalled => {
                let chapter_id = self.chapter.chapter_id.clone();
                error!(chapter = %chapter_id, "countdown expired with no default choice");
                self.chapter = Chapter::story_halted();
                self.phase = ChapterPhase::Stalled;
                Err(GateError::NoFallbackAvailable { chapter_id }.into())
            }
        }
    }

    async fn run_cycle(&mut self, choice: Choice, automatic: bool) -> ChoiceOutcome {
        if let ChapterPhase::Countdown(countdown) = &mut self.phase {
            countdown.cancel();
        }
        self.phase = ChapterPhase::Resolving;

        let stats_before = self.stats;
        if let Some(gain) = &choice.stat_gain {
            self.stats = self.stats.apply_gain(gain);
        }

        let percentage = self.ledger.select(&self.chapter, &choice).await;
        self.history.push(PathHistoryEntry::new(
            &self.chapter,
            &choice,
            percentage,
            automatic,
        ));

        let Resolution { chapter, source, .. } =
            self.resolver.resolve(&self.chapter, &choice, &self.stats).await;
        self.chapter = chapter;
        self.phase = ChapterPhase::AwaitingProceed;

        // A degraded chapter is a dead end; keep the last good save loadable
        if source == ResolutionSource::Degraded {
            debug!("skipping auto-save after failed generation");
        } else if let Err(e) = self.save(SaveMode::Auto).await {
            warn!(error = %e, "auto-save failed");
        }

        ChoiceOutcome {
            choice,
            percentage,
            automatic,
            stats_before,
            stats_after: self.stats,
            source,
            chapter: self.chapter.clone(),
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save progress. Manual saves are quota-limited and counted.
    ///
    /// Auto-saves without a signed-in player are skipped silently.
    pub async fn save(&mut self, mode: SaveMode) -> Result<(), SessionError> {
        let Some(identity) = self.identity.clone() else {
            return match mode {
                SaveMode::Auto => {
                    debug!("not signed in, skipping auto-save");
                    Ok(())
                }
                SaveMode::Manual => Err(SessionError::NotSignedIn),
            };
        };

        if mode == SaveMode::Manual {
            self.require_phase("save", |p| {
                !matches!(p, ChapterPhase::CreatingCharacter | ChapterPhase::Resolving)
            })?;
            let profile = self.profile_for_quota(&identity).await?;
            QuotaLimits::for_account(profile.is_vip).check(QuotaKind::Save, profile.save_count)?;
        }

        let slot = SaveSlot::new(&self.chapter, self.stats, &self.history);
        self.repository.write_save(&identity.uid, &slot).await?;

        if mode == SaveMode::Manual {
            if let Some(profile) = self.profile.as_mut() {
                self.repository
                    .record_manual_save(&identity.uid, profile)
                    .await?;
            }
            info!(uid = %identity.uid, chapter = %self.chapter.chapter_id, "progress saved");
        } else {
            debug!(uid = %identity.uid, chapter = %self.chapter.chapter_id, "auto-saved");
        }
        Ok(())
    }

    /// Restore the saved story. Returns whether anything was restored.
    ///
    /// Manual loads are quota-limited and fail when there is no save; the
    /// startup load just reports `false`.
    pub async fn load(&mut self, mode: LoadMode) -> Result<bool, SessionError> {
        let Some(identity) = self.identity.clone() else {
            return match mode {
                LoadMode::Startup => Ok(false),
                LoadMode::Manual => Err(SessionError::NotSignedIn),
            };
        };

        if mode == LoadMode::Manual {
            let profile = self.profile_for_quota(&identity).await?;
            QuotaLimits::for_account(profile.is_vip).check(QuotaKind::Load, profile.load_count)?;
        }

        let slot = self.repository.load_save(&identity.uid).await?;
        let Some((chapter, slot)) = slot.and_then(|s| s.current_chapter_state.clone().map(|c| (c, s)))
        else {
            return match mode {
                LoadMode::Startup => Ok(false),
                LoadMode::Manual => Err(SessionError::NoSaveFound),
            };
        };

        self.chapter = chapter;
        self.stats = slot.character_stats;
        self.history = slot.user_path_history;
        self.allocation.reset();
        self.phase = ChapterPhase::AwaitingProceed;

        if mode == LoadMode::Manual {
            if let Some(profile) = self.profile.as_mut() {
                self.repository
                    .record_manual_load(&identity.uid, profile)
                    .await?;
            }
        }
        info!(uid = %identity.uid, chapter = %self.chapter.chapter_id, ?mode, "progress loaded");
        Ok(true)
    }

    /// Start over: baseline stats, opening chapter, empty history.
    ///
    /// For signed-in players the save slot is deleted and both quota
    /// counters reset.
    pub async fn restart(&mut self) -> Result<(), SessionError> {
        self.stats = CharacterStats::baseline();
        self.allocation.reset();
        self.chapter = Chapter::opening();
        self.history.clear();
        self.phase = ChapterPhase::CreatingCharacter;

        if let Some(identity) = self.identity.clone() {
            self.repository.delete_save(&identity.uid).await?;
            let mut profile = self.profile_for_quota(&identity).await?;
            self.repository
                .record_restart(&identity.uid, &mut profile)
                .await?;
            self.profile = Some(profile);
            info!(uid = %identity.uid, "story restarted");
        }
        Ok(())
    }

    /// Send feedback about the current chapter. Returns the stored entry's key.
    pub async fn submit_feedback(&self, text: &str) -> Result<String, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyFeedback);
        }
        let identity = self.identity.as_ref().ok_or(SessionError::NotSignedIn)?;

        let chapter_id = if self.chapter.chapter_id.is_empty() {
            INITIAL_FEEDBACK_CHAPTER.to_string()
        } else {
            self.chapter.chapter_id.clone()
        };
        let entry = FeedbackEntry {
            user_id: identity.uid.clone(),
            feedback_text: text.to_string(),
            chapter_id,
            timestamp: Utc::now(),
        };

        let key = self.repository.append_feedback(&entry).await?;
        info!(uid = %identity.uid, chapter = %entry.chapter_id, "feedback received");
        Ok(key)
    }

    async fn profile_for_quota(&mut self, identity: &Identity) -> Result<Profile, SessionError> {
        if let Some(profile) = &self.profile {
            return Ok(profile.clone());
        }
        let profile = self.repository.ensure_profile(identity).await?;
        self.profile = Some(profile.clone());
        Ok(profile)
    }

    fn require_phase(
        &self,
        action: &'static str,
        allowed: impl Fn(&ChapterPhase) -> bool,
    ) -> Result<(), SessionError> {
        if allowed(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::WrongPhase {
                action,
                phase: self.phase.name(),
            })
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// How players split across the current chapter's choices.
    pub async fn choice_stats(&self) -> HashMap<String, ChoiceShare> {
        self.ledger.snapshot(&self.chapter.unique_id()).await
    }

    /// Current chapter's choices, gated against the character.
    pub fn choices(&self) -> Vec<ChoiceView> {
        choice_views(&self.chapter, &self.stats)
    }

    pub fn history(&self) -> &[PathHistoryEntry] {
        &self.history
    }

    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn stats(&self) -> &CharacterStats {
        &self.stats
    }

    pub fn phase(&self) -> &ChapterPhase {
        &self.phase
    }

    pub fn allocation(&self) -> &PointAllocation {
        &self.allocation
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Manual saves and loads left, if signed in with a known profile.
    pub fn quota_remaining(&self) -> Option<(u32, u32)> {
        let profile = self.profile.as_ref()?;
        let limits = QuotaLimits::for_account(profile.is_vip);
        Some((
            limits.remaining(QuotaKind::Save, profile.save_count),
            limits.remaining(QuotaKind::Load, profile.load_count),
        ))
    }

    /// Seconds left on the running countdown.
    pub fn countdown_remaining(&self) -> Option<u32> {
        match &self.phase {
            ChapterPhase::Countdown(countdown) => countdown.remaining(),
            _ => None,
        }
    }

    /// Whether the story has reached a chapter with no way forward.
    pub fn is_finished(&self) -> bool {
        self.chapter.is_ending() && !matches!(self.phase, ChapterPhase::CreatingCharacter)
    }
}
