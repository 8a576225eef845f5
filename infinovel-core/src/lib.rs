//! Choice-resolution engine for AI-generated interactive fiction.
//!
//! This crate provides:
//! - Character stats with threshold-based growth
//! - Stat-gated choices and timed-choice countdowns
//! - A shared chapter cache so every player on a branch reads the same chapter
//! - A popularity ledger of how often each choice is taken
//! - Quota-limited save slots and feedback over a pluggable document store
//! - Chapter generation with Claude
//!
//! # Quick Start
//!
//! ```ignore
//! use infinovel_core::{ClaudeNarrator, Config, FileStore, GameSession, Identity, Services, Stat};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let narrator = ClaudeNarrator::new(claude::Claude::new(&config.api_key)?, config.narrator_config());
//!     let services = Services::from_config(&config, Arc::new(FileStore::new(&config.data_dir)), Arc::new(narrator));
//!
//!     let mut session = GameSession::new(services, Some(Identity::anonymous("reader"))).await;
//!     session.adjust_allocation(Stat::Intelligence, 10)?;
//!     session.confirm_allocation()?;
//!     session.proceed_to_choices()?;
//!
//!     let outcome = session.choose("to_clock_tower").await?;
//!     println!("{}", outcome.chapter.text());
//!     Ok(())
//! }
//! ```

pub mod chapter;
pub mod config;
pub mod countdown;
pub mod gate;
pub mod headless;
pub mod ledger;
pub mod narrator;
pub mod persist;
pub mod quota;
pub mod resolver;
pub mod session;
pub mod stats;
pub mod store;
pub mod testing;

// Re-export for convenience
pub use infinovel_macros::Schema;

// Primary public API
pub use chapter::{Chapter, Choice, PathHistoryEntry, SkillCheck};
pub use config::{Config, ConfigError};
pub use headless::{ChoiceStrategy, HeadlessConfig, HeadlessGame};
pub use ledger::{Percentage, Rarity};
pub use narrator::{ChapterGenerator, ClaudeNarrator, NarratorConfig};
pub use persist::Identity;
pub use session::{
    ChapterPhase, ChoiceOutcome, ErrorKind, GameSession, LoadMode, SaveMode, Services,
    SessionError, SessionTick,
};
pub use stats::{CharacterStats, Stat, StatGain};
pub use store::{DocumentStore, FileStore, MemoryStore, Namespace};
pub use testing::{MockNarrator, TestHarness};
