//! Headless story interface for programmatic use.
//!
//! This module provides a simplified interface for playing stories without
//! a terminal front end. It's designed for:
//! - Automated testing with real AI chapters
//! - Agents or scripts walking the story tree
//! - Warming the shared chapter cache
//!
//! # Example
//!
//! ```ignore
//! use infinovel_core::headless::{HeadlessConfig, HeadlessGame};
//!
//! let mut game = HeadlessGame::new(HeadlessConfig::quick_start(), services).await?;
//! let steps = game.auto_play(5).await?;
//! println!("{}", game.render_transcript());
//! ```

use crate::chapter::Chapter;
use crate::ledger::Percentage;
use crate::persist::Identity;
use crate::resolver::ResolutionSource;
use crate::session::{ChapterPhase, ChoiceOutcome, GameSession, LoadMode, Services, SessionError, SessionTick};
use crate::stats::{
    allocate_creation_points, Allocation, CharacterStats, Stat, INITIAL_STAT_POINTS,
};
use std::fmt::Write as _;
use tracing::info;

/// How [`HeadlessGame::auto_play`] picks among available choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChoiceStrategy {
    /// Always the first available choice.
    #[default]
    FirstAvailable,
    /// Cycle through the available choices step by step.
    Rotate,
}

/// Configuration for a headless session.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Creation points per stat.
    pub allocation: Allocation,
    /// Signed-in player, if any.
    pub identity: Option<Identity>,
    /// Resume the player's save instead of creating a character.
    pub resume: bool,
    pub strategy: ChoiceStrategy,
}

impl HeadlessConfig {
    /// Anonymous one-off player with an even 4/3/3 spread.
    pub fn quick_start() -> Self {
        Self {
            allocation: Allocation::new(4, 3, 3),
            identity: None,
            resume: false,
            strategy: ChoiceStrategy::FirstAvailable,
        }
    }

    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = allocation;
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Resume the save of the configured identity when one exists.
    pub fn resuming(mut self) -> Self {
        self.resume = true;
        self
    }

    pub fn with_strategy(mut self, strategy: ChoiceStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// An entry in the story transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// Step number, starting at 1.
    pub step: usize,
    pub chapter_title: String,
    pub choice_text: String,
    pub percentage: Percentage,
    pub automatic: bool,
    pub source: ResolutionSource,
    pub next_title: String,
}

/// A story that can be played programmatically.
///
/// This wraps `GameSession` with a simpler interface for automated use.
pub struct HeadlessGame {
    session: GameSession,
    strategy: ChoiceStrategy,
    /// Transcript of all choices made.
    transcript: Vec<TranscriptEntry>,
}

impl HeadlessGame {
    /// Start a session and get it to the point of choosing.
    pub async fn new(config: HeadlessConfig, services: Services) -> Result<Self, SessionError> {
        let mut session = GameSession::new(services, config.identity).await;

        let resumed = config.resume && session.load(LoadMode::Startup).await?;
        if !resumed {
            allocate_creation_points(
                &CharacterStats::baseline(),
                &config.allocation,
                INITIAL_STAT_POINTS,
            )?;
            for stat in Stat::all() {
                let amount = config.allocation.get(stat);
                if amount > 0 {
                    session.adjust_allocation(stat, amount as i32)?;
                }
            }
            session.confirm_allocation()?;
        }

        Ok(Self {
            session,
            strategy: config.strategy,
            transcript: Vec::new(),
        })
    }

    /// Choose `choice_id` in the current chapter.
    pub async fn choose(&mut self, choice_id: &str) -> Result<ChoiceOutcome, SessionError> {
        if matches!(self.session.phase(), ChapterPhase::AwaitingProceed) {
            self.session.proceed_to_choices()?;
        }
        let title = self.session.chapter().title.clone();
        let outcome = self.session.choose(choice_id).await?;
        self.record(title, &outcome);
        Ok(outcome)
    }

    /// Let the current countdown run out, taking the default choice.
    pub async fn wait_out_countdown(&mut self) -> Result<Option<ChoiceOutcome>, SessionError> {
        if matches!(self.session.phase(), ChapterPhase::AwaitingProceed) {
            self.session.proceed_to_choices()?;
        }
        let title = self.session.chapter().title.clone();
        loop {
            match self.session.tick().await? {
                SessionTick::Idle => return Ok(None),
                SessionTick::Counting { .. } => continue,
                SessionTick::AutoChosen(outcome) => {
                    self.record(title, &outcome);
                    return Ok(Some(*outcome));
                }
            }
        }
    }

    /// Keep choosing until the story ends or `max_steps` choices are made.
    ///
    /// Returns the number of choices made.
    pub async fn auto_play(&mut self, max_steps: usize) -> Result<usize, SessionError> {
        let mut steps = 0;
        while steps < max_steps && !self.session.chapter().is_ending() {
            if matches!(self.session.phase(), ChapterPhase::AwaitingProceed) {
                self.session.proceed_to_choices()?;
            }

            let available: Vec<String> = self
                .session
                .choices()
                .into_iter()
                .filter(|c| c.available)
                .map(|c| c.choice_id)
                .collect();
            if available.is_empty() {
                break;
            }

            let pick = match self.strategy {
                ChoiceStrategy::FirstAvailable => &available[0],
                ChoiceStrategy::Rotate => &available[steps % available.len()],
            };
            self.choose(pick).await?;
            steps += 1;
        }

        info!(steps, chapter = %self.session.chapter().chapter_id, "auto-play finished");
        Ok(steps)
    }

    fn record(&mut self, chapter_title: String, outcome: &ChoiceOutcome) {
        self.transcript.push(TranscriptEntry {
            step: self.transcript.len() + 1,
            chapter_title,
            choice_text: outcome.choice.text.clone(),
            percentage: outcome.percentage,
            automatic: outcome.automatic,
            source: outcome.source,
            next_title: outcome.chapter.title.clone(),
        });
    }

    // ========================================================================
    // Story State Queries
    // ========================================================================

    pub fn chapter(&self) -> &Chapter {
        self.session.chapter()
    }

    pub fn stats(&self) -> &CharacterStats {
        self.session.stats()
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    /// Get the transcript of all choices.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// The transcript as readable text, one block per step.
    pub fn render_transcript(&self) -> String {
        let mut out = String::new();
        for entry in &self.transcript {
            let _ = writeln!(out, "{}. {}", entry.step, entry.chapter_title);
            let _ = writeln!(
                out,
                "   > {}{} ({} chose this)",
                entry.choice_text,
                if entry.automatic { " [timed out]" } else { "" },
                entry.percentage.label()
            );
            let _ = writeln!(out, "   -> {} [{:?}]", entry.next_title, entry.source);
        }
        out
    }

    /// Get the underlying session for advanced use.
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Get mutable access to the underlying session.
    pub fn session_mut(&mut self) -> &mut GameSession {
        &mut self.session
    }
}
