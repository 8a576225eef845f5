//! Branch popularity ledger.
//!
//! One tally document per chapter, shared by every player, counts how often
//! each choice was picked. Selecting a choice first reads the share that
//! choice had *before* this selection, then records the selection.
//!
//! Updates are read-then-write without a transaction; concurrent players can
//! lose each other's increments, which only skews a cosmetic statistic.

use crate::chapter::{Chapter, Choice};
use crate::store::{get_typed, set_typed, DocumentStore, Namespace, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sentinel shown when no share can be computed.
pub const NOT_AVAILABLE: &str = "N/A";

/// A choice's share of a chapter's selections, kept to one decimal place.
///
/// Serialized as the display string: `"42.9"` or `"N/A"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Percentage {
    NotAvailable,
    /// Tenths of a percent, 0..=1000.
    Share(u32),
}

impl Percentage {
    /// `100 * count / total`, rounded half-up to one decimal.
    pub fn of(count: u64, total: u64) -> Self {
        if total == 0 {
            return Percentage::NotAvailable;
        }
        let tenths = (count.min(total) * 1000 + total / 2) / total;
        Percentage::Share(tenths as u32)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Percentage::NotAvailable => None,
            Percentage::Share(tenths) => Some(f64::from(*tenths) / 10.0),
        }
    }

    /// Display form for players: `"42.9%"`, or `"N/A"` without a sign.
    pub fn label(&self) -> String {
        match self {
            Percentage::NotAvailable => NOT_AVAILABLE.to_string(),
            Percentage::Share(_) => format!("{self}%"),
        }
    }

    pub fn rarity(&self) -> Option<Rarity> {
        let value = self.value()?;
        Some(if value < 30.0 {
            Rarity::Unique
        } else if value > 70.0 {
            Rarity::Common
        } else {
            Rarity::Balanced
        })
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percentage::NotAvailable => f.write_str(NOT_AVAILABLE),
            Percentage::Share(tenths) => write!(f, "{}.{}", tenths / 10, tenths % 10),
        }
    }
}

impl From<Percentage> for String {
    fn from(p: Percentage) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for Percentage {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let s = s.trim();
        if s == NOT_AVAILABLE {
            return Ok(Percentage::NotAvailable);
        }
        let value: f64 = s
            .trim_end_matches('%')
            .parse()
            .map_err(|_| format!("invalid percentage: {s}"))?;
        if !(0.0..=100.0).contains(&value) {
            return Err(format!("percentage out of range: {s}"));
        }
        Ok(Percentage::Share((value * 10.0).round() as u32))
    }
}

/// How common a path is among players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rarity {
    /// Fewer than 30% of players chose this.
    Unique,
    Balanced,
    /// More than 70% of players chose this.
    Common,
}

impl Rarity {
    pub fn label(&self) -> &'static str {
        match self {
            Rarity::Unique => "unique path",
            Rarity::Balanced => "balanced path",
            Rarity::Common => "common path",
        }
    }
}

/// Selection count for one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceCount {
    pub choice_id: String,
    pub text: String,
    #[serde(default)]
    pub total_count: u64,
}

/// Selection counts for every choice of one chapter.
///
/// `total_selections_for_chapter` always equals the sum of the counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceTally {
    pub chapter_title: String,
    pub chapter_content_preview: String,
    pub choices: Vec<ChoiceCount>,
    #[serde(default)]
    pub total_selections_for_chapter: u64,
    pub last_updated: DateTime<Utc>,
}

impl ChoiceTally {
    /// A fresh tally listing every choice of `chapter` at zero.
    pub fn for_chapter(chapter: &Chapter) -> Self {
        Self {
            chapter_title: chapter.title.clone(),
            chapter_content_preview: chapter.content_preview(),
            choices: chapter
                .choices
                .iter()
                .map(|c| ChoiceCount {
                    choice_id: c.choice_id.clone(),
                    text: c.text.clone(),
                    total_count: 0,
                })
                .collect(),
            total_selections_for_chapter: 0,
            last_updated: Utc::now(),
        }
    }

    /// Count one selection of `choice`, adding it if the tally doesn't list it yet.
    pub fn record(&mut self, choice: &Choice) {
        match self
            .choices
            .iter_mut()
            .find(|c| c.choice_id == choice.choice_id)
        {
            Some(entry) => entry.total_count += 1,
            None => self.choices.push(ChoiceCount {
                choice_id: choice.choice_id.clone(),
                text: choice.text.clone(),
                total_count: 1,
            }),
        }
        self.total_selections_for_chapter += 1;
        self.last_updated = Utc::now();
    }

    pub fn count_of(&self, choice_id: &str) -> u64 {
        self.choices
            .iter()
            .find(|c| c.choice_id == choice_id)
            .map(|c| c.total_count)
            .unwrap_or(0)
    }

    pub fn percentage_for(&self, choice_id: &str) -> Percentage {
        Percentage::of(self.count_of(choice_id), self.total_selections_for_chapter)
    }

    /// Whether the aggregate matches the per-choice counts.
    pub fn is_consistent(&self) -> bool {
        self.choices.iter().map(|c| c.total_count).sum::<u64>()
            == self.total_selections_for_chapter
    }
}

/// Count and share of one choice in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceShare {
    pub count: u64,
    pub percentage: Percentage,
}

/// Shared popularity ledger backed by a document store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>, namespace: &Namespace) -> Self {
        Self {
            store,
            collection: namespace.choice_stats(),
        }
    }

    /// The stored tally for a chapter, if any player has reached it.
    pub async fn tally(&self, chapter_unique_id: &str) -> Result<Option<ChoiceTally>, StoreError> {
        get_typed(self.store.as_ref(), &self.collection, chapter_unique_id).await
    }

    /// Current share of `choice_id`, `N/A` when the chapter has no selections.
    pub async fn percentage_for(
        &self,
        chapter_unique_id: &str,
        choice_id: &str,
    ) -> Result<Percentage, StoreError> {
        Ok(self
            .tally(chapter_unique_id)
            .await?
            .map(|tally| tally.percentage_for(choice_id))
            .unwrap_or(Percentage::NotAvailable))
    }

    /// Count one selection of `choice` in `chapter`.
    pub async fn record_selection(
        &self,
        chapter_unique_id: &str,
        chapter: &Chapter,
        choice: &Choice,
    ) -> Result<(), StoreError> {
        let mut tally = self
            .tally(chapter_unique_id)
            .await?
            .unwrap_or_else(|| ChoiceTally::for_chapter(chapter));
        tally.record(choice);
        set_typed(self.store.as_ref(), &self.collection, chapter_unique_id, &tally).await
    }

    /// Read the choice's prior share, then record the selection.
    ///
    /// Never fails: store errors are logged and the share degrades to `N/A`.
    pub async fn select(&self, chapter: &Chapter, choice: &Choice) -> Percentage {
        let chapter_id = chapter.unique_id();

        let percentage = match self.percentage_for(&chapter_id, &choice.choice_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(chapter = %chapter_id, error = %e, "failed to read choice statistics");
                Percentage::NotAvailable
            }
        };

        if let Err(e) = self.record_selection(&chapter_id, chapter, choice).await {
            warn!(chapter = %chapter_id, error = %e, "failed to record choice selection");
        } else {
            debug!(chapter = %chapter_id, choice = %choice.choice_id, %percentage, "recorded selection");
        }

        percentage
    }

    /// Count and share of every choice of a chapter. Empty on failure.
    pub async fn snapshot(&self, chapter_unique_id: &str) -> HashMap<String, ChoiceShare> {
        let tally = match self.tally(chapter_unique_id).await {
            Ok(Some(tally)) => tally,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                warn!(chapter = %chapter_unique_id, error = %e, "failed to read choice statistics");
                return HashMap::new();
            }
        };

        tally
            .choices
            .iter()
            .map(|c| {
                (
                    c.choice_id.clone(),
                    ChoiceShare {
                        count: c.total_count,
                        percentage: tally.percentage_for(&c.choice_id),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryStore::new()), &Namespace::default())
    }

    #[test]
    fn test_percentage_formatting() {
        assert_eq!(Percentage::of(0, 0).to_string(), "N/A");
        assert_eq!(Percentage::of(1, 3).to_string(), "33.3");
        assert_eq!(Percentage::of(2, 3).to_string(), "66.7");
        assert_eq!(Percentage::of(3, 3).to_string(), "100.0");
        assert_eq!(Percentage::of(0, 4).to_string(), "0.0");
    }

    #[test]
    fn test_percentage_label() {
        assert_eq!(Percentage::NotAvailable.label(), "N/A");
        assert_eq!(Percentage::of(2, 3).label(), "66.7%");
        assert_eq!(Percentage::of(0, 4).label(), "0.0%");
    }

    #[test]
    fn test_percentage_serde() {
        let json = serde_json::to_string(&Percentage::of(1, 8)).unwrap();
        assert_eq!(json, "\"12.5\"");
        let back: Percentage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Percentage::Share(125));

        let na: Percentage = serde_json::from_str("\"N/A\"").unwrap();
        assert_eq!(na, Percentage::NotAvailable);
        assert!(serde_json::from_str::<Percentage>("\"lots\"").is_err());
    }

    #[test]
    fn test_rarity_bands() {
        assert_eq!(Percentage::of(1, 4).rarity(), Some(Rarity::Unique));
        assert_eq!(Percentage::of(1, 2).rarity(), Some(Rarity::Balanced));
        assert_eq!(Percentage::of(3, 4).rarity(), Some(Rarity::Common));
        assert_eq!(Percentage::of(3, 10).rarity(), Some(Rarity::Balanced));
        assert_eq!(Percentage::NotAvailable.rarity(), None);
    }

    #[tokio::test]
    async fn test_first_selection_is_not_available() {
        let ledger = ledger();
        let chapter = Chapter::opening();
        let choice = &chapter.choices[0];

        assert_eq!(ledger.select(&chapter, choice).await, Percentage::NotAvailable);

        let tally = ledger.tally(&chapter.unique_id()).await.unwrap().unwrap();
        assert_eq!(tally.total_selections_for_chapter, 1);
        assert_eq!(tally.choices.len(), 3);
        assert_eq!(tally.count_of(&choice.choice_id), 1);
        assert!(tally.is_consistent());
    }

    #[tokio::test]
    async fn test_percentage_reflects_prior_selections() {
        let ledger = ledger();
        let chapter = Chapter::opening();
        let a = &chapter.choices[0];
        let b = &chapter.choices[1];

        ledger.select(&chapter, a).await;
        ledger.select(&chapter, b).await;
        // a: 1 of 2 before this selection
        assert_eq!(ledger.select(&chapter, a).await.to_string(), "50.0");
        // b: 1 of 3
        assert_eq!(ledger.select(&chapter, b).await.to_string(), "33.3");

        let snapshot = ledger.snapshot(&chapter.unique_id()).await;
        assert_eq!(snapshot[&a.choice_id].count, 2);
        assert_eq!(snapshot[&b.choice_id].percentage.to_string(), "50.0");
        assert_eq!(snapshot[&chapter.choices[2].choice_id].count, 0);
    }

    #[tokio::test]
    async fn test_unknown_choice_is_added() {
        let ledger = ledger();
        let chapter = Chapter::opening();
        let stray = Choice::new("stray", "Wander off");

        ledger.select(&chapter, &stray).await;
        let tally = ledger.tally(&chapter.unique_id()).await.unwrap().unwrap();
        assert_eq!(tally.count_of("stray"), 1);
        assert_eq!(tally.choices.len(), 4);
        assert!(tally.is_consistent());
    }

    #[tokio::test]
    async fn test_snapshot_of_unvisited_chapter_is_empty() {
        assert!(ledger().snapshot("nowhere").await.is_empty());
    }
}
