//! Choice gate: which choices the character can take, and which one the
//! story falls back to when time runs out.

use crate::chapter::{Chapter, Choice};
use crate::stats::{CharacterStats, Stat};
use thiserror::Error;

/// Errors from gate lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("chapter '{chapter_id}' has no choice without stat requirements")]
    NoFallbackAvailable { chapter_id: String },
}

/// Whether `stats` satisfy every requirement of `choice`.
///
/// Stats named in `requiredStats` that the sheet doesn't know read as 0.
pub fn is_available(choice: &Choice, stats: &CharacterStats) -> bool {
    match &choice.required_stats {
        None => true,
        Some(required) => required
            .iter()
            .all(|(stat, minimum)| stats.value_of(stat) >= *minimum),
    }
}

/// First choice without stat requirements, in list order.
pub fn find_fallback(choices: &[Choice]) -> Option<&Choice> {
    choices.iter().find(|c| !c.has_requirements())
}

/// Like [`find_fallback`], but a missing fallback is an error.
pub fn require_fallback(chapter: &Chapter) -> Result<&Choice, GateError> {
    find_fallback(&chapter.choices).ok_or_else(|| GateError::NoFallbackAvailable {
        chapter_id: chapter.chapter_id.clone(),
    })
}

fn stat_label(key: &str) -> String {
    Stat::from_key(key)
        .map(|stat| stat.name().to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Requirement and reward hint shown next to a choice.
///
/// Returns e.g. `[requires Strength 10 | Strength +1, Intelligence progress +2]`,
/// or an empty string when the choice has neither.
pub fn describe_choice(choice: &Choice) -> String {
    let mut sections = Vec::new();

    if let Some(required) = choice.required_stats.as_ref().filter(|r| !r.is_empty()) {
        let parts: Vec<String> = required
            .iter()
            .map(|(stat, minimum)| format!("{} {minimum}", stat_label(stat)))
            .collect();
        sections.push(format!("requires {}", parts.join(", ")));
    }

    if let Some(gain) = choice.stat_gain.as_ref().filter(|g| !g.is_empty()) {
        let mut parts = Vec::new();
        for stat in Stat::all() {
            if let Some(amount) = gain.increase(stat) {
                parts.push(format!("{} +{amount}", stat.name()));
            }
        }
        for stat in Stat::all() {
            if let Some(amount) = gain.accumulation(stat) {
                parts.push(format!("{} progress +{amount}", stat.name()));
            }
        }
        sections.push(parts.join(", "));
    }

    if sections.is_empty() {
        String::new()
    } else {
        format!("[{}]", sections.join(" | "))
    }
}

/// Result of comparing a choice's skill check against the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillCheckOutcome {
    pub stat: Stat,
    pub threshold: u32,
    pub value: u32,
    pub passed: bool,
}

impl SkillCheckOutcome {
    /// Plain-language annotation for the narrator. Never mentions numbers.
    pub fn describe(&self) -> String {
        let stat = self.stat.key();
        if self.passed {
            format!(
                "The character succeeded at a {stat} check: their {stat} was equal to the task, \
                 so the attempt goes well."
            )
        } else {
            format!(
                "The character failed a {stat} check: their {stat} fell short of what the task \
                 demanded, so the attempt goes poorly or reveals less."
            )
        }
    }
}

/// Evaluate `choice`'s skill check, if it has one naming a known stat.
pub fn skill_check_outcome(choice: &Choice, stats: &CharacterStats) -> Option<SkillCheckOutcome> {
    let check = choice.skill_check.as_ref()?;
    let stat = Stat::from_key(&check.stat)?;
    let value = stats.get(stat);
    Some(SkillCheckOutcome {
        stat,
        threshold: check.threshold,
        value,
        passed: value >= check.threshold,
    })
}

/// A choice as presented to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceView {
    pub choice_id: String,
    pub text: String,
    pub available: bool,
    pub hint: String,
}

/// Gate every choice of `chapter` against `stats`, preserving order.
pub fn choice_views(chapter: &Chapter, stats: &CharacterStats) -> Vec<ChoiceView> {
    chapter
        .choices
        .iter()
        .map(|choice| ChoiceView {
            choice_id: choice.choice_id.clone(),
            text: choice.text.clone(),
            available: is_available(choice, stats),
            hint: describe_choice(choice),
        })
        .collect()
}
