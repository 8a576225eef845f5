//! Property tests for the engine's arithmetic laws.
//!
//! Run with: `cargo test -p infinovel-core --test properties`

use infinovel_core::chapter::Choice;
use infinovel_core::gate::{find_fallback, is_available};
use infinovel_core::ledger::{ChoiceTally, Percentage};
use infinovel_core::resolver::path_id;
use infinovel_core::stats::{
    allocate_creation_points, Allocation, CharacterStats, Stat, StatGain, ACCUMULATION_THRESHOLD,
    INITIAL_STAT_POINTS, STAT_FLOOR,
};
use infinovel_core::Chapter;
use proptest::prelude::*;

fn arb_stats() -> impl Strategy<Value = CharacterStats> {
    (1u32..50, 1u32..50, 1u32..50, 0u32..3, 0u32..3, 0u32..3).prop_map(
        |(s, i, a, sa, ia, aa)| {
            let mut stats = CharacterStats::new(s, i, a);
            stats.strength_accumulation = sa;
            stats.intelligence_accumulation = ia;
            stats.agility_accumulation = aa;
            stats
        },
    )
}

fn arb_stat() -> impl Strategy<Value = Stat> {
    prop_oneof![
        Just(Stat::Strength),
        Just(Stat::Intelligence),
        Just(Stat::Agility)
    ]
}

fn arb_gain() -> impl Strategy<Value = StatGain> {
    (
        proptest::option::of(1u32..=10),
        proptest::option::of(1u32..=10),
        proptest::option::of(1u32..=10),
        proptest::option::of(1u32..=10),
        proptest::option::of(1u32..=10),
        proptest::option::of(1u32..=10),
    )
        .prop_map(|(si, ii, ai, sa, ia, aa)| StatGain {
            strength_increase: si,
            intelligence_increase: ii,
            agility_increase: ai,
            strength_accumulation: sa,
            intelligence_accumulation: ia,
            agility_accumulation: aa,
        })
}

/// Progress expressed in accumulation points: value * threshold + accumulation.
fn progress(stats: &CharacterStats, stat: Stat) -> u32 {
    stats.get(stat) * ACCUMULATION_THRESHOLD + stats.accumulation(stat)
}

fn three_choices() -> Chapter {
    Chapter {
        chapter_id: "fork".to_string(),
        title: "Fork".to_string(),
        content: vec!["Three roads.".to_string()],
        choices: vec![
            Choice::new("left", "Left"),
            Choice::new("middle", "Middle"),
            Choice::new("right", "Right"),
        ],
        is_timed_choice: false,
        time_limit: 0,
    }
}

proptest! {
    #[test]
    fn prop_accumulation_is_conserved(stats in arb_stats(), stat in arb_stat(), points in 1u32..=10) {
        let gain = StatGain::default().with_accumulation(stat, points);
        let after = stats.apply_gain(&gain);

        prop_assert!(after.accumulation(stat) < ACCUMULATION_THRESHOLD);
        prop_assert_eq!(progress(&after, stat), progress(&stats, stat) + points);
        for other in Stat::all().into_iter().filter(|s| *s != stat) {
            prop_assert_eq!(after.get(other), stats.get(other));
            prop_assert_eq!(after.accumulation(other), stats.accumulation(other));
        }
    }

    #[test]
    fn prop_gains_never_lower_stats(stats in arb_stats(), gain in arb_gain()) {
        let after = stats.apply_gain(&gain);
        for stat in Stat::all() {
            prop_assert!(after.get(stat) >= stats.get(stat));
            prop_assert!(after.get(stat) >= STAT_FLOOR);
            prop_assert!(after.accumulation(stat) < ACCUMULATION_THRESHOLD);
        }
    }

    #[test]
    fn prop_allocation_spends_exactly_the_pool(s in 0u32..=12, i in 0u32..=12, a in 0u32..=12) {
        let allocation = Allocation::new(s, i, a);
        let result = allocate_creation_points(&CharacterStats::baseline(), &allocation, INITIAL_STAT_POINTS);

        if allocation.total() == INITIAL_STAT_POINTS {
            let stats = result.unwrap();
            let sum: u32 = Stat::all().into_iter().map(|st| stats.get(st)).sum();
            prop_assert_eq!(sum, 3 * STAT_FLOOR + INITIAL_STAT_POINTS);
            for stat in Stat::all() {
                prop_assert!(stats.get(stat) >= STAT_FLOOR);
            }
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn prop_availability_is_monotonic(
        stats in arb_stats(),
        gain in arb_gain(),
        stat in arb_stat(),
        minimum in 0u32..60,
    ) {
        let choice = Choice::new("gated", "Gated").requiring(stat, minimum);
        let stronger = stats.apply_gain(&gain);
        if is_available(&choice, &stats) {
            prop_assert!(is_available(&choice, &stronger));
        }
    }

    #[test]
    fn prop_fallback_is_first_unrestricted(gated in proptest::collection::vec(any::<bool>(), 0..6)) {
        let choices: Vec<Choice> = gated
            .iter()
            .enumerate()
            .map(|(n, &is_gated)| {
                let choice = Choice::new(format!("c{n}"), format!("Choice {n}"));
                if is_gated { choice.requiring(Stat::Agility, 99) } else { choice }
            })
            .collect();

        let expected = gated.iter().position(|g| !g).map(|n| format!("c{n}"));
        prop_assert_eq!(find_fallback(&choices).map(|c| c.choice_id.clone()), expected);
    }

    #[test]
    fn prop_ledger_counts_are_conserved(picks in proptest::collection::vec(0usize..3, 1..60)) {
        let chapter = three_choices();
        let mut tally = ChoiceTally::for_chapter(&chapter);
        for &pick in &picks {
            tally.record(&chapter.choices[pick]);
        }

        prop_assert!(tally.is_consistent());
        prop_assert_eq!(tally.total_selections_for_chapter, picks.len() as u64);

        // Rounded shares stay within rounding error of 100%
        let tenths: u32 = chapter
            .choices
            .iter()
            .map(|c| match tally.percentage_for(&c.choice_id) {
                Percentage::Share(t) => t,
                Percentage::NotAvailable => 0,
            })
            .sum();
        prop_assert!((998..=1002).contains(&tenths), "shares sum to {tenths} tenths");
    }

    #[test]
    fn prop_path_id_is_deterministic(chapter in "[a-z_]{1,20}", choice in "[a-z_]{1,20}") {
        let id = path_id(&chapter, &choice);
        prop_assert_eq!(&id, &path_id(&chapter, &choice));
        prop_assert!(id.starts_with("path_"));
        prop_assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn prop_path_id_separates_pairs(a in "[a-z]{1,8}", b in "[a-z]{1,8}", c in "[a-z]{1,8}") {
        // Moving the boundary between chapter and choice changes the path
        let joined = format!("{a}{b}");
        prop_assert_ne!(path_id(&joined, &c), path_id(&a, &format!("{b}{c}")));
    }
}
