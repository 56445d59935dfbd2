//! Engine tunables.
//!
//! Defaults match the shipped balance; the embedding application may
//! deserialize overrides from its own config file. The engine never reads
//! files itself.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Milestones generated per user per calendar day; the last slot is
    /// always the boss battle.
    pub milestones_per_day: usize,
    /// Completions of any kind allowed per user per calendar day.
    pub daily_completion_limit: u32,
    /// Boss-battle completions allowed per user per calendar day.
    pub daily_boss_limit: u32,
    pub daily_reward_coins: u64,
    pub daily_reward_base_xp: u64,
    /// Streak bonus percent added per consecutive day.
    pub streak_bonus_step: u32,
    /// Streak bonus percent ceiling.
    pub streak_bonus_cap: u32,
    pub starting_dreamcoins: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            milestones_per_day: 5,
            daily_completion_limit: 5,
            daily_boss_limit: 1,
            daily_reward_coins: 1000,
            daily_reward_base_xp: 100,
            streak_bonus_step: 5,
            streak_bonus_cap: 50,
            starting_dreamcoins: 1000,
        }
    }
}

impl EngineConfig {
    /// Streak bonus percent for a given streak length.
    pub fn streak_bonus_percent(&self, streak: u32) -> u32 {
        (streak * self.streak_bonus_step).min(self.streak_bonus_cap)
    }
}
