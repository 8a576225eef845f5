//! Character sheet: stat values, threshold accumulation and creation-time
//! point allocation.
//!
//! Stats only ever move upward through play. A gain either raises a stat
//! directly (`strengthIncrease`) or feeds its accumulation counter
//! (`strengthAccumulation`); every [`ACCUMULATION_THRESHOLD`] accumulated
//! points convert into one stat point and the remainder is kept.

use infinovel_macros::Schema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Points a new character distributes across their stats.
pub const INITIAL_STAT_POINTS: u32 = 10;

/// Accumulated points needed to convert into one stat point.
pub const ACCUMULATION_THRESHOLD: u32 = 3;

/// No stat is ever lower than this.
pub const STAT_FLOOR: u32 = 1;

/// The three character stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Strength,
    Intelligence,
    Agility,
}

impl Stat {
    pub fn all() -> [Stat; 3] {
        [Stat::Strength, Stat::Intelligence, Stat::Agility]
    }

    /// Display label.
    pub fn name(&self) -> &'static str {
        match self {
            Stat::Strength => "Strength",
            Stat::Intelligence => "Intelligence",
            Stat::Agility => "Agility",
        }
    }

    /// Wire name, as used in `requiredStats` keys and skill checks.
    pub fn key(&self) -> &'static str {
        match self {
            Stat::Strength => "strength",
            Stat::Intelligence => "intelligence",
            Stat::Agility => "agility",
        }
    }

    /// Look up a stat by its wire name. Unknown names yield `None`.
    pub fn from_key(key: &str) -> Option<Stat> {
        let key = key.trim();
        Stat::all()
            .into_iter()
            .find(|stat| stat.key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A character's stats and their accumulation counters.
///
/// Accumulation counters always stay below [`ACCUMULATION_THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStats {
    pub strength: u32,
    pub intelligence: u32,
    pub agility: u32,
    #[serde(default)]
    pub strength_accumulation: u32,
    #[serde(default)]
    pub intelligence_accumulation: u32,
    #[serde(default)]
    pub agility_accumulation: u32,
}

impl Default for CharacterStats {
    fn default() -> Self {
        Self::baseline()
    }
}

impl CharacterStats {
    /// The pre-allocation baseline: every stat at the floor, nothing accumulated.
    pub fn baseline() -> Self {
        Self::new(STAT_FLOOR, STAT_FLOOR, STAT_FLOOR)
    }

    pub fn new(strength: u32, intelligence: u32, agility: u32) -> Self {
        Self {
            strength,
            intelligence,
            agility,
            strength_accumulation: 0,
            intelligence_accumulation: 0,
            agility_accumulation: 0,
        }
    }

    pub fn get(&self, stat: Stat) -> u32 {
        match stat {
            Stat::Strength => self.strength,
            Stat::Intelligence => self.intelligence,
            Stat::Agility => self.agility,
        }
    }

    pub fn set(&mut self, stat: Stat, value: u32) {
        match stat {
            Stat::Strength => self.strength = value,
            Stat::Intelligence => self.intelligence = value,
            Stat::Agility => self.agility = value,
        }
    }

    pub fn accumulation(&self, stat: Stat) -> u32 {
        match stat {
            Stat::Strength => self.strength_accumulation,
            Stat::Intelligence => self.intelligence_accumulation,
            Stat::Agility => self.agility_accumulation,
        }
    }

    fn set_accumulation(&mut self, stat: Stat, value: u32) {
        match stat {
            Stat::Strength => self.strength_accumulation = value,
            Stat::Intelligence => self.intelligence_accumulation = value,
            Stat::Agility => self.agility_accumulation = value,
        }
    }

    /// Value of a stat named by its wire key. Unknown stats read as 0.
    pub fn value_of(&self, key: &str) -> u32 {
        Stat::from_key(key).map(|stat| self.get(stat)).unwrap_or(0)
    }

    /// Apply a choice's gain, returning the updated sheet.
    ///
    /// Direct increases are floored at [`STAT_FLOOR`]; accumulation converts
    /// every full threshold into a stat point and keeps the remainder.
    pub fn apply_gain(&self, gain: &StatGain) -> Self {
        let mut updated = *self;

        for stat in Stat::all() {
            if let Some(increase) = gain.increase(stat) {
                let value = updated.get(stat).saturating_add(increase);
                updated.set(stat, value.max(STAT_FLOOR));
            }

            if let Some(points) = gain.accumulation(stat) {
                let total = updated.accumulation(stat).saturating_add(points);
                let promoted = total / ACCUMULATION_THRESHOLD;
                updated.set(stat, updated.get(stat).saturating_add(promoted));
                updated.set_accumulation(stat, total % ACCUMULATION_THRESHOLD);
            }
        }

        updated
    }

    /// Short one-line summary, e.g. `STR 5 | INT 4 (+2/3) | AGI 4`.
    pub fn summary(&self) -> String {
        Stat::all()
            .iter()
            .map(|&stat| {
                let abbreviation = stat.name()[..3].to_uppercase();
                let acc = self.accumulation(stat);
                if acc > 0 {
                    format!(
                        "{abbreviation} {} (+{acc}/{ACCUMULATION_THRESHOLD})",
                        self.get(stat)
                    )
                } else {
                    format!("{abbreviation} {}", self.get(stat))
                }
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Stat changes carried by a choice. Every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(rename_all = "camelCase")]
pub struct StatGain {
    /// Direct strength increase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(minimum = 1)]
    pub strength_increase: Option<u32>,
    /// Direct intelligence increase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(minimum = 1)]
    pub intelligence_increase: Option<u32>,
    /// Direct agility increase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(minimum = 1)]
    pub agility_increase: Option<u32>,
    /// Strength progress points; every 3 become one strength point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(minimum = 1)]
    pub strength_accumulation: Option<u32>,
    /// Intelligence progress points; every 3 become one intelligence point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(minimum = 1)]
    pub intelligence_accumulation: Option<u32>,
    /// Agility progress points; every 3 become one agility point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(minimum = 1)]
    pub agility_accumulation: Option<u32>,
}

impl StatGain {
    pub fn increase(&self, stat: Stat) -> Option<u32> {
        match stat {
            Stat::Strength => self.strength_increase,
            Stat::Intelligence => self.intelligence_increase,
            Stat::Agility => self.agility_increase,
        }
    }

    pub fn accumulation(&self, stat: Stat) -> Option<u32> {
        match stat {
            Stat::Strength => self.strength_accumulation,
            Stat::Intelligence => self.intelligence_accumulation,
            Stat::Agility => self.agility_accumulation,
        }
    }

    /// Builder for a direct increase.
    pub fn with_increase(mut self, stat: Stat, amount: u32) -> Self {
        match stat {
            Stat::Strength => self.strength_increase = Some(amount),
            Stat::Intelligence => self.intelligence_increase = Some(amount),
            Stat::Agility => self.agility_increase = Some(amount),
        }
        self
    }

    /// Builder for accumulation progress.
    pub fn with_accumulation(mut self, stat: Stat, amount: u32) -> Self {
        match stat {
            Stat::Strength => self.strength_accumulation = Some(amount),
            Stat::Intelligence => self.intelligence_accumulation = Some(amount),
            Stat::Agility => self.agility_accumulation = Some(amount),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        Stat::all()
            .iter()
            .all(|&stat| self.increase(stat).is_none() && self.accumulation(stat).is_none())
    }

    /// Largest single value in the gain, used for range checks.
    pub fn largest(&self) -> u32 {
        Stat::all()
            .iter()
            .flat_map(|&stat| [self.increase(stat), self.accumulation(stat)])
            .flatten()
            .max()
            .unwrap_or(0)
    }
}

/// Errors from finalizing a creation-time allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("{remaining} stat point(s) still unallocated")]
    IncompleteAllocation { remaining: u32 },

    #[error("allocated {excess} point(s) more than available")]
    OverAllocated { excess: u32 },
}

/// Points assigned to each stat on top of the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub strength: u32,
    pub intelligence: u32,
    pub agility: u32,
}

impl Allocation {
    pub fn new(strength: u32, intelligence: u32, agility: u32) -> Self {
        Self {
            strength,
            intelligence,
            agility,
        }
    }

    pub fn get(&self, stat: Stat) -> u32 {
        match stat {
            Stat::Strength => self.strength,
            Stat::Intelligence => self.intelligence,
            Stat::Agility => self.agility,
        }
    }

    fn set(&mut self, stat: Stat, value: u32) {
        match stat {
            Stat::Strength => self.strength = value,
            Stat::Intelligence => self.intelligence = value,
            Stat::Agility => self.agility = value,
        }
    }

    pub fn total(&self) -> u32 {
        self.strength + self.intelligence + self.agility
    }
}

/// Apply an allocation to the baseline. The allocation must spend the pool exactly.
pub fn allocate_creation_points(
    baseline: &CharacterStats,
    allocation: &Allocation,
    pool: u32,
) -> Result<CharacterStats, AllocationError> {
    let spent = allocation.total();
    if spent < pool {
        return Err(AllocationError::IncompleteAllocation {
            remaining: pool - spent,
        });
    }
    if spent > pool {
        return Err(AllocationError::OverAllocated {
            excess: spent - pool,
        });
    }

    let mut stats = *baseline;
    for stat in Stat::all() {
        stats.set(stat, baseline.get(stat) + allocation.get(stat));
    }
    Ok(stats)
}

/// Interactive allocation state for the character-creation screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointAllocation {
    baseline: CharacterStats,
    pool: u32,
    allocation: Allocation,
}

impl Default for PointAllocation {
    fn default() -> Self {
        Self::new(INITIAL_STAT_POINTS)
    }
}

impl PointAllocation {
    /// Start allocating `pool` points on top of the baseline.
    pub fn new(pool: u32) -> Self {
        Self {
            baseline: CharacterStats::baseline(),
            pool,
            allocation: Allocation::default(),
        }
    }

    /// Move points into (`delta > 0`) or out of (`delta < 0`) a stat.
    ///
    /// Rejected, returning `false`, when the pool would go negative or the
    /// stat would drop below the floor.
    pub fn adjust(&mut self, stat: Stat, delta: i32) -> bool {
        let current = i64::from(self.allocation.get(stat));
        let proposed = current + i64::from(delta);
        let remaining_after = i64::from(self.remaining()) - i64::from(delta);

        let floor_ok = i64::from(self.baseline.get(stat)) + proposed >= i64::from(STAT_FLOOR);
        if proposed < 0 || remaining_after < 0 || !floor_ok {
            return false;
        }

        // proposed is within [0, pool] here
        self.allocation.set(stat, proposed as u32);
        true
    }

    /// Unallocated points.
    pub fn remaining(&self) -> u32 {
        self.pool.saturating_sub(self.allocation.total())
    }

    pub fn pool(&self) -> u32 {
        self.pool
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    /// What the sheet would look like if confirmed now.
    pub fn preview(&self) -> CharacterStats {
        let mut stats = self.baseline;
        for stat in Stat::all() {
            stats.set(stat, self.baseline.get(stat) + self.allocation.get(stat));
        }
        stats
    }

    pub fn reset(&mut self) {
        self.allocation = Allocation::default();
    }

    /// Confirm the allocation; fails unless the pool is fully spent.
    pub fn finish(&self) -> Result<CharacterStats, AllocationError> {
        allocate_creation_points(&self.baseline, &self.allocation, self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_scenario() {
        let stats = allocate_creation_points(
            &CharacterStats::baseline(),
            &Allocation::new(4, 3, 3),
            INITIAL_STAT_POINTS,
        )
        .unwrap();
        assert_eq!((stats.strength, stats.intelligence, stats.agility), (5, 4, 4));
        assert_eq!(stats.intelligence_accumulation, 0);
    }

    #[test]
    fn test_incomplete_allocation_reports_remaining() {
        let err = allocate_creation_points(
            &CharacterStats::baseline(),
            &Allocation::new(4, 3, 2),
            INITIAL_STAT_POINTS,
        )
        .unwrap_err();
        assert_eq!(err, AllocationError::IncompleteAllocation { remaining: 1 });
    }

    #[test]
    fn test_over_allocation() {
        let err = allocate_creation_points(
            &CharacterStats::baseline(),
            &Allocation::new(5, 5, 2),
            INITIAL_STAT_POINTS,
        )
        .unwrap_err();
        assert_eq!(err, AllocationError::OverAllocated { excess: 2 });
    }

    #[test]
    fn test_accumulation_promotes_on_threshold() {
        let gain = StatGain::default().with_accumulation(Stat::Intelligence, 2);
        let start = CharacterStats::new(5, 4, 4);

        let after_three = start.apply_gain(&gain).apply_gain(&gain).apply_gain(&gain);
        assert_eq!(after_three.intelligence, 6);
        assert_eq!(after_three.intelligence_accumulation, 0);
        assert_eq!(after_three.strength, 5);
    }

    #[test]
    fn test_large_accumulation_keeps_remainder() {
        let gain = StatGain::default().with_accumulation(Stat::Agility, 7);
        let stats = CharacterStats::baseline().apply_gain(&gain);
        assert_eq!(stats.agility, 3);
        assert_eq!(stats.agility_accumulation, 1);
    }

    #[test]
    fn test_direct_increase() {
        let gain = StatGain::default().with_increase(Stat::Strength, 2);
        let stats = CharacterStats::new(3, 1, 1).apply_gain(&gain);
        assert_eq!(stats.strength, 5);
    }

    #[test]
    fn test_increase_restores_floor() {
        let mut stats = CharacterStats::baseline();
        stats.strength = 0;
        let gain = StatGain::default().with_increase(Stat::Strength, 0);
        assert_eq!(stats.apply_gain(&gain).strength, STAT_FLOOR);
    }

    #[test]
    fn test_empty_gain_is_identity() {
        let stats = CharacterStats::new(2, 3, 4);
        assert!(StatGain::default().is_empty());
        assert_eq!(stats.apply_gain(&StatGain::default()), stats);
    }

    #[test]
    fn test_stat_from_key() {
        assert_eq!(Stat::from_key("agility"), Some(Stat::Agility));
        assert_eq!(Stat::from_key("Strength"), Some(Stat::Strength));
        assert_eq!(Stat::from_key("charisma"), None);
        assert_eq!(CharacterStats::baseline().value_of("charisma"), 0);
    }

    #[test]
    fn test_point_allocation_guards() {
        let mut alloc = PointAllocation::new(2);
        assert!(!alloc.adjust(Stat::Strength, -1));
        assert!(alloc.adjust(Stat::Strength, 1));
        assert!(alloc.adjust(Stat::Agility, 1));
        assert_eq!(alloc.remaining(), 0);
        assert!(!alloc.adjust(Stat::Intelligence, 1));
        assert!(alloc.adjust(Stat::Agility, -1));
        assert_eq!(alloc.remaining(), 1);
        assert_eq!(
            alloc.finish(),
            Err(AllocationError::IncompleteAllocation { remaining: 1 })
        );

        alloc.reset();
        assert_eq!(alloc.remaining(), 2);
        assert_eq!(alloc.preview(), CharacterStats::baseline());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let stats = CharacterStats::new(5, 4, 4);
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["strengthAccumulation"], 0);

        let gain: StatGain = serde_json::from_str(r#"{"intelligenceAccumulation": 2}"#).unwrap();
        assert_eq!(gain.intelligence_accumulation, Some(2));
        assert_eq!(gain.largest(), 2);

        assert!(serde_json::from_str::<StatGain>(r#"{"strengthIncrease": -1}"#).is_err());
    }

    #[test]
    fn test_missing_accumulations_default_to_zero() {
        let stats: CharacterStats =
            serde_json::from_str(r#"{"strength": 2, "intelligence": 3, "agility": 4}"#).unwrap();
        assert_eq!(stats.agility_accumulation, 0);
    }

    #[test]
    fn test_gain_schema() {
        let schema = StatGain::json_schema();
        assert_eq!(schema["properties"]["strengthIncrease"]["type"], "integer");
        assert_eq!(schema["properties"]["strengthIncrease"]["minimum"], 1);
        assert!(schema["required"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_summary() {
        let mut stats = CharacterStats::new(5, 4, 4);
        stats.intelligence_accumulation = 2;
        assert_eq!(stats.summary(), "STR 5 | INT 4 (+2/3) | AGI 4");
    }
}
