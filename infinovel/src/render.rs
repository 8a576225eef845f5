//! Plain-text rendering of session state.
//!
//! Every block starts with a bracketed tag so scripts can follow along.

use infinovel_core::gate::ChoiceView;
use infinovel_core::ledger::ChoiceShare;
use infinovel_core::stats::{PointAllocation, Stat};
use infinovel_core::{Chapter, CharacterStats, ChoiceOutcome, PathHistoryEntry};
use std::collections::HashMap;
use std::fmt::Write as _;

pub fn chapter(chapter: &Chapter) -> String {
    let mut out = format!("[CHAPTER] {}\n", chapter.title);
    for paragraph in &chapter.content {
        out.push_str(paragraph);
        out.push_str("\n\n");
    }
    if chapter.is_ending() {
        out.push_str("[END] The story has no way forward. Use #load or #restart.\n");
    } else {
        out.push_str("(press enter to see your choices)\n");
    }
    out
}

pub fn choices(views: &[ChoiceView], countdown: Option<u32>) -> String {
    let mut out = String::from("[CHOICES]");
    if let Some(seconds) = countdown {
        let _ = write!(out, " {seconds}s to decide!");
    }
    out.push('\n');

    for (index, view) in views.iter().enumerate() {
        let marker = if view.available { ' ' } else { 'x' };
        let _ = write!(out, " {marker}{}. {}", index + 1, view.text);
        if !view.hint.is_empty() {
            let _ = write!(out, " {}", view.hint);
        }
        out.push('\n');
    }
    out
}

pub fn stats(stats: &CharacterStats) -> String {
    format!("[STATS] {}\n", stats.summary())
}

pub fn allocation(allocation: &PointAllocation) -> String {
    let preview = allocation.preview();
    let mut out = format!(
        "[CREATE] {} point(s) left to assign\n",
        allocation.remaining()
    );
    for stat in Stat::all() {
        let _ = writeln!(out, "  {:<13}{}", stat.name(), preview.get(stat));
    }
    out.push_str("  adjust with e.g. `str +2` or `agi -1`, then `done`\n");
    out
}

pub fn outcome(outcome: &ChoiceOutcome) -> String {
    let mut out = String::new();
    if outcome.automatic {
        let _ = writeln!(out, "[AUTO] Time ran out: {}", outcome.choice.text);
    }

    let _ = write!(out, "[CHOSE] {} ({} of readers", outcome.choice.text, outcome.percentage.label());
    match outcome.percentage.rarity() {
        Some(rarity) => {
            let _ = writeln!(out, ", {})", rarity.label());
        }
        None => out.push_str(")\n"),
    }

    for (stat, value) in outcome.improved_stats() {
        let _ = writeln!(out, "[GROWTH] {stat} is now {value}");
    }
    out
}

pub fn popularity(views: &[ChoiceView], shares: &HashMap<String, ChoiceShare>) -> String {
    let mut out = String::from("[POPULARITY]\n");
    for view in views {
        match shares.get(&view.choice_id) {
            Some(share) => {
                let _ = writeln!(out, "  {} ({}) {}", share.percentage.label(), share.count, view.text);
            }
            None => {
                let _ = writeln!(out, "  N/A {}", view.text);
            }
        }
    }
    out
}

pub fn history(entries: &[PathHistoryEntry]) -> String {
    if entries.is_empty() {
        return "[HISTORY] No choices yet.\n".to_string();
    }
    let mut out = String::from("[HISTORY]\n");
    for (index, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {}{} ({})",
            index + 1,
            entry.choice_text,
            if entry.automatic { " [timed out]" } else { "" },
            entry.percentage.label()
        );
    }
    out
}

pub fn help() -> &'static str {
    "[HELP]\n\
     \x20 <number> or <choice id>  - Pick a choice\n\
     \x20 <enter>                  - Continue to the choices\n\
     \x20 #save                    - Save your progress\n\
     \x20 #load                    - Load your last save\n\
     \x20 #restart                 - Start a new story\n\
     \x20 #stats                   - Show your character\n\
     \x20 #popular                 - How other readers chose here\n\
     \x20 #history                 - Choices made so far\n\
     \x20 #feedback <text>         - Send feedback\n\
     \x20 #quit                    - Exit\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use infinovel_core::gate::choice_views;
    use infinovel_core::ledger::Percentage;

    #[test]
    fn test_chapter_rendering() {
        let text = chapter(&Chapter::opening());
        assert!(text.starts_with("[CHAPTER] Clues in the Fog"));
        assert!(text.contains("press enter"));

        let ended = chapter(&Chapter::generation_failed());
        assert!(ended.contains("[END]"));
    }

    #[test]
    fn test_choices_mark_locked() {
        let mut opening = Chapter::opening();
        opening.choices[1] = opening.choices[1].clone().requiring(Stat::Strength, 30);
        let views = choice_views(&opening, &CharacterStats::baseline());

        let text = choices(&views, Some(7));
        assert!(text.starts_with("[CHOICES] 7s to decide!"));
        assert!(text.contains("  1. Head for the clock tower"));
        assert!(text.contains(" x2. Search"));
        assert!(text.contains("requires Strength 30"));
    }

    #[test]
    fn test_allocation_rendering() {
        let mut points = PointAllocation::default();
        points.adjust(Stat::Strength, 3);
        let text = allocation(&points);
        assert!(text.contains("7 point(s) left"));
        assert!(text.contains("Strength     4"));
    }

    #[test]
    fn test_history_rendering() {
        let opening = Chapter::opening();
        let entries = vec![
            PathHistoryEntry::new(&opening, &opening.choices[0], Percentage::NotAvailable, false),
            PathHistoryEntry::new(&opening, &opening.choices[2], Percentage::Share(333), true),
        ];
        let text = history(&entries);
        assert!(text.contains("  1. Head for the clock tower"));
        assert!(text.contains("midnight. (N/A)\n"));
        assert!(text.contains(" [timed out] (33.3%)"));
        assert!(!text.contains("N/A%"));
    }

    #[test]
    fn test_popularity_rendering() {
        let opening = Chapter::opening();
        let views = choice_views(&opening, &CharacterStats::baseline());
        let shares = HashMap::from([(
            "to_clock_tower".to_string(),
            ChoiceShare {
                count: 3,
                percentage: Percentage::Share(750),
            },
        )]);
        let text = popularity(&views, &shares);
        assert!(text.contains("75.0% (3) Head for the clock tower"));
        assert!(text.contains("N/A Search"));
    }
}
