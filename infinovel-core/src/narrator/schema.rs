//! Wire shape of a generated chapter and its validation.
//!
//! The model fills a `write_chapter` tool call whose input schema is derived
//! from [`ChapterDraft`]. Nothing it returns is trusted until
//! [`ChapterDraft::into_chapter`] has checked it.

use crate::chapter::{Chapter, Choice, SkillCheck};
use crate::stats::{Stat, StatGain};
use infinovel_macros::Schema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Highest stat requirement a generated choice may carry.
pub const MAX_REQUIRED_STAT: u32 = 100;

/// Highest single gain value a generated choice may carry.
pub const MAX_STAT_GAIN: u32 = 10;

/// Longest countdown a generated chapter may ask for, in seconds.
pub const MAX_TIME_LIMIT: i64 = 600;

/// Reasons a generated chapter is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChapterError {
    #[error("chapter has no title")]
    EmptyTitle,

    #[error("chapter has no content")]
    NoContent,

    #[error("paragraph {0} is empty")]
    EmptyParagraph(usize),

    #[error("choice {0} has no id")]
    EmptyChoiceId(usize),

    #[error("choice '{0}' has no text")]
    EmptyChoiceText(String),

    #[error("duplicate choice id '{0}'")]
    DuplicateChoiceId(String),

    #[error("choice '{choice_id}' requires {stat} {value}, above the maximum of {max}", max = MAX_REQUIRED_STAT)]
    RequirementOutOfRange {
        choice_id: String,
        stat: String,
        value: u32,
    },

    #[error("choice '{choice_id}' grants {value}, above the maximum of {max}", max = MAX_STAT_GAIN)]
    GainOutOfRange { choice_id: String, value: u32 },

    #[error("choice '{choice_id}' checks unknown stat '{stat}'")]
    UnknownSkillStat { choice_id: String, stat: String },

    #[error("time limit {0} is outside 0..={max}", max = MAX_TIME_LIMIT)]
    TimeLimitOutOfRange(i64),
}

/// Write the next chapter of the interactive story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[schema(name = "write_chapter")]
#[serde(rename_all = "camelCase")]
pub struct ChapterDraft {
    /// Short snake_case identifier for this chapter
    #[serde(default)]
    pub chapter_id: Option<String>,
    /// Chapter title
    pub title: String,
    /// Chapter prose, one string per paragraph
    pub content: Vec<String>,
    /// True only when the moment demands a quick decision
    #[serde(default)]
    pub is_timed_choice: bool,
    /// Seconds the reader has to decide; only used when isTimedChoice is true
    #[serde(default)]
    pub time_limit: Option<i64>,
    /// Two or three choices leading onward; empty only when the story ends
    pub choices: Vec<ChoiceDraft>,
}

/// One choice offered at the end of the chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceDraft {
    /// What the reader chooses to do
    pub text: String,
    /// Snake_case identifier, unique within this chapter
    pub choice_id: String,
    /// Minimum stat values needed to pick this choice, keyed by stat name; omit when none
    #[serde(default)]
    pub required_stats: Option<BTreeMap<String, u32>>,
    /// Positive stat changes this choice grants; omit when none
    #[serde(default)]
    pub stat_gain: Option<StatGain>,
    /// A stat check that colors the outcome without blocking the choice
    #[serde(default)]
    pub skill_check: Option<SkillCheck>,
}

fn sanitize_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_lowercase()
}

impl ChapterDraft {
    /// Validate the draft into an immutable chapter.
    ///
    /// `fallback_id` (the path id) becomes the chapter id when the draft's
    /// own id is missing or sanitizes to nothing, and prefixes it otherwise.
    pub fn into_chapter(self, fallback_id: &str) -> Result<Chapter, ChapterError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ChapterError::EmptyTitle);
        }

        if self.content.is_empty() {
            return Err(ChapterError::NoContent);
        }
        let mut content = Vec::with_capacity(self.content.len());
        for (index, paragraph) in self.content.into_iter().enumerate() {
            let paragraph = paragraph.trim().to_string();
            if paragraph.is_empty() {
                return Err(ChapterError::EmptyParagraph(index));
            }
            content.push(paragraph);
        }

        let time_limit = self.time_limit.unwrap_or(0);
        if !(0..=MAX_TIME_LIMIT).contains(&time_limit) {
            return Err(ChapterError::TimeLimitOutOfRange(time_limit));
        }

        let mut seen = HashSet::new();
        let mut choices = Vec::with_capacity(self.choices.len());
        for (index, draft) in self.choices.into_iter().enumerate() {
            let choice = draft.into_choice(index)?;
            if !seen.insert(choice.choice_id.clone()) {
                return Err(ChapterError::DuplicateChoiceId(choice.choice_id));
            }
            choices.push(choice);
        }

        // Model ids are only unique within a branch; scope them by path
        let chapter_id = match self.chapter_id.as_deref().map(sanitize_id) {
            Some(id) if !id.is_empty() => format!("{fallback_id}_{id}"),
            _ => fallback_id.to_string(),
        };

        Ok(Chapter {
            chapter_id,
            title,
            content,
            choices,
            is_timed_choice: self.is_timed_choice,
            // bounded by MAX_TIME_LIMIT above
            time_limit: time_limit as u32,
        })
    }
}

impl ChoiceDraft {
    fn into_choice(self, index: usize) -> Result<Choice, ChapterError> {
        let choice_id = self.choice_id.trim().to_string();
        if choice_id.is_empty() {
            return Err(ChapterError::EmptyChoiceId(index));
        }

        let text = self.text.trim().to_string();
        if text.is_empty() {
            return Err(ChapterError::EmptyChoiceText(choice_id));
        }

        let required_stats = self.required_stats.filter(|r| !r.is_empty());
        if let Some(required) = &required_stats {
            if let Some((stat, value)) = required.iter().find(|(_, v)| **v > MAX_REQUIRED_STAT) {
                return Err(ChapterError::RequirementOutOfRange {
                    choice_id,
                    stat: stat.clone(),
                    value: *value,
                });
            }
        }

        let stat_gain = self.stat_gain.filter(|g| !g.is_empty());
        if let Some(gain) = &stat_gain {
            let largest = gain.largest();
            if largest > MAX_STAT_GAIN {
                return Err(ChapterError::GainOutOfRange {
                    choice_id,
                    value: largest,
                });
            }
        }

        if let Some(check) = &self.skill_check {
            if Stat::from_key(&check.stat).is_none() {
                return Err(ChapterError::UnknownSkillStat {
                    choice_id,
                    stat: check.stat.clone(),
                });
            }
        }

        Ok(Choice {
            text,
            choice_id,
            required_stats,
            stat_gain,
            skill_check: self.skill_check,
        })
    }
}
