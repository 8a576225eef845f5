//! Chapters, choices and the player's path through them.

use crate::ledger::Percentage;
use crate::stats::{Stat, StatGain};
use infinovel_macros::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Id of the fixed opening chapter.
pub const OPENING_CHAPTER_ID: &str = "intro_chapter_1";

/// Id of the terminal chapter shown when generation fails.
pub const GENERATION_FAILED_ID: &str = "generation_failed";

/// Id of the terminal chapter shown when a countdown expires with no fallback.
pub const STORY_HALTED_ID: &str = "story_halted";

/// Maximum characters kept in a chapter content preview.
pub const PREVIEW_CHARS: usize = 100;

/// A narrative skill check attached to a choice.
///
/// Never blocks the choice; it only colors how the next chapter is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
pub struct SkillCheck {
    /// Stat being tested: strength, intelligence or agility
    pub stat: String,
    /// Stat value needed to succeed
    #[schema(minimum = 1)]
    pub threshold: u32,
}

impl SkillCheck {
    pub fn new(stat: Stat, threshold: u32) -> Self {
        Self {
            stat: stat.key().to_string(),
            threshold,
        }
    }
}

/// One selectable option at the end of a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub text: String,
    pub choice_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_stats: Option<BTreeMap<String, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_gain: Option<StatGain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_check: Option<SkillCheck>,
}

impl Choice {
    pub fn new(choice_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choice_id: choice_id.into(),
            required_stats: None,
            stat_gain: None,
            skill_check: None,
        }
    }

    /// Require `stat >= minimum` for this choice to be selectable.
    pub fn requiring(mut self, stat: Stat, minimum: u32) -> Self {
        self.required_stats
            .get_or_insert_with(BTreeMap::new)
            .insert(stat.key().to_string(), minimum);
        self
    }

    pub fn with_gain(mut self, gain: StatGain) -> Self {
        self.stat_gain = Some(gain);
        self
    }

    pub fn with_skill_check(mut self, check: SkillCheck) -> Self {
        self.skill_check = Some(check);
        self
    }

    /// Whether this choice carries any stat requirement.
    ///
    /// An empty requirement map counts as no requirement.
    pub fn has_requirements(&self) -> bool {
        self.required_stats
            .as_ref()
            .is_some_and(|required| !required.is_empty())
    }
}

/// A chapter: prose plus the choices leading out of it.
///
/// Chapters are immutable once produced; only the session's pointer to the
/// current chapter moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    #[serde(default)]
    pub chapter_id: String,
    pub title: String,
    pub content: Vec<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub is_timed_choice: bool,
    #[serde(default)]
    pub time_limit: u32,
}

impl Chapter {
    /// The fixed opening chapter every new story starts from.
    pub fn opening() -> Self {
        Self {
            chapter_id: OPENING_CHAPTER_ID.to_string(),
            title: "Clues in the Fog: Steam and Sorcery in London".to_string(),
            content: vec![
                "In Victorian London the roar of steam engines mingles with the murmur of old magic. \
                 Detective Allen, a private investigator known for a sharp eye and an unusual \
                 understanding of the uncanny, sits in an office thick with tobacco smoke."
                    .to_string(),
                "Outside, the district's eternal fog coils like a sleeping dragon. An urgent \
                 telegram from the Royal Academy of Sciences breaks the quiet of the morning: the \
                 celebrated inventor Dr. Victor Grayson has vanished without a trace."
                    .to_string(),
                "Allen reaches Grayson's laboratory to find it in disarray. On the cluttered desk a \
                 scrap of paper catches the eye, scrawled in a hurried hand: \"The clock tower. \
                 Midnight. Wait.\""
                    .to_string(),
            ],
            choices: vec![
                Choice::new(
                    "to_clock_tower",
                    "Head for the clock tower at once and see what waits at midnight.",
                ),
                Choice::new(
                    "investigate_lab_thoroughly",
                    "Search Dr. Grayson's laboratory carefully for hidden clues first.",
                )
                .with_skill_check(SkillCheck::new(Stat::Intelligence, 12)),
                Choice::new(
                    "research_grayson_background",
                    "Return to the office and dig into Dr. Grayson's background.",
                ),
            ],
            is_timed_choice: false,
            time_limit: 0,
        }
    }

    /// Terminal chapter substituted when the next chapter can't be generated.
    pub fn generation_failed() -> Self {
        Self::terminal(
            GENERATION_FAILED_ID,
            "Generation Failed",
            "Sorry, the storyteller ran into a problem writing the next chapter. \
             Load your last save or restart to try again.",
        )
    }

    /// Terminal chapter shown when time runs out and no default choice exists.
    pub fn story_halted() -> Self {
        Self::terminal(
            STORY_HALTED_ID,
            "Story Halted",
            "Time ran out and there was no default path forward, so the story cannot continue.",
        )
    }

    fn terminal(id: &str, title: &str, text: &str) -> Self {
        Self {
            chapter_id: id.to_string(),
            title: title.to_string(),
            content: vec![text.to_string()],
            choices: Vec::new(),
            is_timed_choice: false,
            time_limit: 0,
        }
    }

    /// Ledger key for this chapter: the id reduced to `[a-z0-9_-]`.
    ///
    /// Chapters without a usable id fall back to a key built from the title
    /// and first paragraph.
    pub fn unique_id(&self) -> String {
        let sanitized: String = self
            .chapter_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect::<String>()
            .to_lowercase();
        if !sanitized.is_empty() {
            return sanitized;
        }

        let squash = |text: &str| -> String {
            text.chars()
                .take(30)
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_lowercase()
        };
        let title_part = squash(&self.title);
        let content_part = self.content.first().map(|p| squash(p)).unwrap_or_default();

        let base = format!("{title_part}_{content_part}");
        let base = base.trim_matches('_');
        if base.is_empty() {
            "auto_gen".to_string()
        } else {
            base.to_string()
        }
    }

    /// A chapter with no choices ends the story.
    pub fn is_ending(&self) -> bool {
        self.choices.is_empty()
    }

    /// Whether this chapter runs a countdown when its choices are shown.
    pub fn has_countdown(&self) -> bool {
        self.is_timed_choice && self.time_limit > 0
    }

    pub fn find_choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.choice_id == choice_id)
    }

    /// First paragraph, cut to [`PREVIEW_CHARS`] characters.
    pub fn content_preview(&self) -> String {
        self.content
            .first()
            .map(|p| p.chars().take(PREVIEW_CHARS).collect())
            .unwrap_or_default()
    }

    /// Full prose as one block, paragraphs separated by newlines.
    pub fn text(&self) -> String {
        self.content.join("\n")
    }
}

/// One step of the player's path, appended on every selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathHistoryEntry {
    pub chapter_id: String,
    pub choice_id: String,
    pub choice_text: String,
    /// Share of players who had picked this choice before this selection.
    pub percentage: Percentage,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Picked by the countdown rather than the player.
    #[serde(default)]
    pub automatic: bool,
}

impl PathHistoryEntry {
    pub fn new(chapter: &Chapter, choice: &Choice, percentage: Percentage, automatic: bool) -> Self {
        Self {
            chapter_id: chapter.unique_id(),
            choice_id: choice.choice_id.clone(),
            choice_text: choice.text.clone(),
            percentage,
            timestamp: chrono::Utc::now().timestamp_millis(),
            automatic,
        }
    }
}
