//! Per-user persistence: the save slot, the account profile and the
//! feedback log.
//!
//! Everything goes through a [`DocumentStore`]; this module owns the
//! document shapes and the collection layout.

use crate::chapter::{Chapter, PathHistoryEntry};
use crate::stats::CharacterStats;
use crate::store::{get_typed, set_typed, DocumentStore, Namespace, StoreError, PROFILE_KEY, SAVE_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save document version.
pub const SAVE_VERSION: u32 = 1;

fn current_version() -> u32 {
    SAVE_VERSION
}

/// The authenticated account playing, as supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub is_anonymous: bool,
    pub email: Option<String>,
}

impl Identity {
    pub fn anonymous(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            is_anonymous: true,
            email: None,
        }
    }

    pub fn registered(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            is_anonymous: false,
            email: Some(email.into()),
        }
    }
}

/// A user's single save slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSlot {
    /// Saves written before versioning are treated as the current version.
    #[serde(default = "current_version")]
    pub version: u32,

    /// Chapter the player was reading. A save without one is not resumable.
    #[serde(default)]
    pub current_chapter_state: Option<Chapter>,

    /// Missing stats load as the baseline.
    #[serde(default)]
    pub character_stats: CharacterStats,

    #[serde(default)]
    pub user_path_history: Vec<PathHistoryEntry>,

    pub last_saved_at: DateTime<Utc>,
}

impl SaveSlot {
    pub fn new(chapter: &Chapter, stats: CharacterStats, history: &[PathHistoryEntry]) -> Self {
        Self {
            version: SAVE_VERSION,
            current_chapter_state: Some(chapter.clone()),
            character_stats: stats,
            user_path_history: history.to_vec(),
            last_saved_at: Utc::now(),
        }
    }
}

/// Account profile: quota counters and sign-in bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub load_count: u32,
    #[serde(default)]
    pub save_count: u32,
    #[serde(default, rename = "isVIP")]
    pub is_vip: bool,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_save_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_load_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restart_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// A fresh profile for a first sign-in.
    pub fn new(identity: &Identity) -> Self {
        let now = Utc::now();
        Self {
            load_count: 0,
            save_count: 0,
            is_vip: false,
            is_anonymous: identity.is_anonymous,
            email: identity.email.clone(),
            created_at: now,
            last_login_at: Some(now),
            last_save_at: None,
            last_load_at: None,
            last_restart_at: None,
        }
    }
}

/// One piece of player feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub user_id: String,
    pub feedback_text: String,
    pub chapter_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Typed access to a user's persisted documents.
#[derive(Clone)]
pub struct SaveRepository {
    store: Arc<dyn DocumentStore>,
    namespace: Namespace,
}

impl SaveRepository {
    pub fn new(store: Arc<dyn DocumentStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Load the save slot, rejecting saves from another format version.
    pub async fn load_save(&self, uid: &str) -> Result<Option<SaveSlot>, PersistError> {
        let Some(raw) = self.store.get(&self.namespace.saves(uid), SAVE_KEY).await? else {
            return Ok(None);
        };
        let slot: SaveSlot = serde_json::from_value(raw)?;

        if slot.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: slot.version,
            });
        }

        debug!(uid, history = slot.user_path_history.len(), "loaded save slot");
        Ok(Some(slot))
    }

    pub async fn write_save(&self, uid: &str, slot: &SaveSlot) -> Result<(), PersistError> {
        set_typed(self.store.as_ref(), &self.namespace.saves(uid), SAVE_KEY, slot).await?;
        debug!(uid, chapter = ?slot.current_chapter_state.as_ref().map(|c| &c.chapter_id), "wrote save slot");
        Ok(())
    }

    pub async fn delete_save(&self, uid: &str) -> Result<(), PersistError> {
        self.store.delete(&self.namespace.saves(uid), SAVE_KEY).await?;
        Ok(())
    }

    pub async fn load_profile(&self, uid: &str) -> Result<Option<Profile>, PersistError> {
        Ok(get_typed(self.store.as_ref(), &self.namespace.profile(uid), PROFILE_KEY).await?)
    }

    /// Load the profile, creating it on first sign-in and stamping the login time.
    pub async fn ensure_profile(&self, identity: &Identity) -> Result<Profile, PersistError> {
        let collection = self.namespace.profile(&identity.uid);

        match self.load_profile(&identity.uid).await? {
            Some(mut profile) => {
                profile.last_login_at = Some(Utc::now());
                profile.is_anonymous = identity.is_anonymous;
                if identity.email.is_some() {
                    profile.email = identity.email.clone();
                }
                self.store
                    .merge(
                        &collection,
                        PROFILE_KEY,
                        json!({
                            "lastLoginAt": profile.last_login_at,
                            "isAnonymous": profile.is_anonymous,
                            "email": profile.email,
                        }),
                    )
                    .await?;
                Ok(profile)
            }
            None => {
                let profile = Profile::new(identity);
                set_typed(self.store.as_ref(), &collection, PROFILE_KEY, &profile).await?;
                info!(uid = %identity.uid, anonymous = identity.is_anonymous, "created profile");
                Ok(profile)
            }
        }
    }

    /// Count one manual save.
    pub async fn record_manual_save(&self, uid: &str, profile: &mut Profile) -> Result<(), PersistError> {
        profile.save_count += 1;
        profile.last_save_at = Some(Utc::now());
        self.store
            .merge(
                &self.namespace.profile(uid),
                PROFILE_KEY,
                json!({"saveCount": profile.save_count, "lastSaveAt": profile.last_save_at}),
            )
            .await?;
        Ok(())
    }

    /// Count one manual load.
    pub async fn record_manual_load(&self, uid: &str, profile: &mut Profile) -> Result<(), PersistError> {
        profile.load_count += 1;
        profile.last_load_at = Some(Utc::now());
        self.store
            .merge(
                &self.namespace.profile(uid),
                PROFILE_KEY,
                json!({"loadCount": profile.load_count, "lastLoadAt": profile.last_load_at}),
            )
            .await?;
        Ok(())
    }

    /// Zero both counters after a restart.
    pub async fn record_restart(&self, uid: &str, profile: &mut Profile) -> Result<(), PersistError> {
        profile.load_count = 0;
        profile.save_count = 0;
        profile.last_restart_at = Some(Utc::now());
        self.store
            .merge(
                &self.namespace.profile(uid),
                PROFILE_KEY,
                json!({
                    "loadCount": 0,
                    "saveCount": 0,
                    "isVIP": profile.is_vip,
                    "lastRestartAt": profile.last_restart_at,
                }),
            )
            .await?;
        Ok(())
    }

    /// Append feedback to the shared log, returning its key.
    pub async fn append_feedback(&self, entry: &FeedbackEntry) -> Result<String, PersistError> {
        let key = self
            .store
            .append(&self.namespace.feedback(), serde_json::to_value(entry)?)
            .await?;
        Ok(key)
    }
}
