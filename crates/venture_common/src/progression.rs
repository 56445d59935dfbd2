//! Leveling model.
//!
//! Levels 1-99 on a geometric XP curve: clearing level L alone costs
//! `floor(BASE_XP * LEVEL_MULTIPLIER^(L-1))`. Level is always derived from
//! total XP and recomputed on every XP change; it is never authoritative on
//! its own.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const MAX_LEVEL: u32 = 99;
pub const BASE_XP: u64 = 1000;
pub const LEVEL_MULTIPLIER: f64 = 1.2;

// Cumulative costs for levels 0..=MAX_LEVEL+1; the extra slot lets
// level_for_xp probe one past the cap without branching.
static CUMULATIVE_XP: Lazy<Vec<u64>> = Lazy::new(|| {
    let mut table = vec![0u64; MAX_LEVEL as usize + 2];
    for level in 1..=MAX_LEVEL + 1 {
        table[level as usize] = table[level as usize - 1] + xp_to_reach_level(level);
    }
    table
});

/// Incremental XP cost of the single level `level` (not cumulative).
pub fn xp_to_reach_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    (BASE_XP as f64 * LEVEL_MULTIPLIER.powi(level as i32 - 1)).floor() as u64
}

/// Total XP required to have reached `level` from zero.
pub fn cumulative_xp(level: u32) -> u64 {
    let level = level.min(MAX_LEVEL + 1) as usize;
    CUMULATIVE_XP[level]
}

/// Level for a given XP total. Starts at 1, never exceeds [`MAX_LEVEL`].
pub fn level_for_xp(total_xp: u64) -> u32 {
    let mut level = 1;
    while level < MAX_LEVEL && cumulative_xp(level + 1) <= total_xp {
        level += 1;
    }
    level
}

/// Position within the current level, for progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub current_level: u32,
    /// XP earned within the current level.
    pub current_level_xp: u64,
    /// XP needed to clear the current level; 0 at the cap.
    pub next_level_xp: u64,
    /// 0-100; pinned to 100 at the cap.
    pub percent: f64,
}

pub fn progress(total_xp: u64) -> LevelProgress {
    let current_level = level_for_xp(total_xp);
    let level_floor = cumulative_xp(current_level);
    let current_level_xp = total_xp - level_floor;

    if current_level >= MAX_LEVEL {
        return LevelProgress {
            current_level,
            current_level_xp,
            next_level_xp: 0,
            percent: 100.0,
        };
    }

    let next_level_xp = cumulative_xp(current_level + 1) - level_floor;
    LevelProgress {
        current_level,
        current_level_xp,
        next_level_xp,
        percent: (current_level_xp as f64 / next_level_xp as f64) * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_costs() {
        assert_eq!(xp_to_reach_level(0), 0);
        assert_eq!(xp_to_reach_level(1), 0);
        // floor(1000 * 1.2^1) = 1200
        assert_eq!(xp_to_reach_level(2), 1200);
        // floor(1000 * 1.2^2) = 1440
        assert_eq!(xp_to_reach_level(3), 1440);
    }

    #[test]
    fn test_cumulative_is_running_sum() {
        assert_eq!(cumulative_xp(1), 0);
        assert_eq!(cumulative_xp(2), 1200);
        assert_eq!(cumulative_xp(3), 1200 + 1440);

        let mut total = 0;
        for level in 1..=MAX_LEVEL {
            total += xp_to_reach_level(level);
            assert_eq!(cumulative_xp(level), total);
        }
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(1199), 1);
        assert_eq!(level_for_xp(1200), 2);
        assert_eq!(level_for_xp(cumulative_xp(10)), 10);
        assert_eq!(level_for_xp(cumulative_xp(10) - 1), 9);
    }

    #[test]
    fn test_level_is_monotone_and_bounded() {
        let mut last = 0;
        for xp in (0..2_000_000u64).step_by(7919) {
            let level = level_for_xp(xp);
            assert!(level >= 1 && level <= MAX_LEVEL);
            assert!(level >= last, "level dropped at xp {}", xp);
            last = level;
        }
        assert_eq!(level_for_xp(u64::MAX / 2), MAX_LEVEL);
    }

    #[test]
    fn test_level_brackets_xp() {
        for xp in (0..5_000_000u64).step_by(13_337) {
            let level = level_for_xp(xp);
            assert!(cumulative_xp(level) <= xp);
            if level < MAX_LEVEL {
                assert!(xp < cumulative_xp(level + 1));
            }
        }
    }

    #[test]
    fn test_progress_matches_level() {
        for xp in [0, 500, 1200, 99_999, 1_000_000] {
            let p = progress(xp);
            assert_eq!(p.current_level, level_for_xp(xp));
            assert!(p.percent >= 0.0 && p.percent <= 100.0);
        }
    }

    #[test]
    fn test_progress_midpoint() {
        // Halfway through level 2 (1200 floor, 1440 to clear).
        let p = progress(1200 + 720);
        assert_eq!(p.current_level, 2);
        assert_eq!(p.current_level_xp, 720);
        assert_eq!(p.next_level_xp, 1440);
        approx::assert_relative_eq!(p.percent, 50.0, epsilon = 0.001);
    }

    #[test]
    fn test_progress_at_cap() {
        let p = progress(u64::MAX / 2);
        assert_eq!(p.current_level, MAX_LEVEL);
        assert_eq!(p.next_level_xp, 0);
        assert_eq!(p.percent, 100.0);
    }
}
