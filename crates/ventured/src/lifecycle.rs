//! Progression lifecycle controller.
//!
//! Orchestrates the per-user per-day state machine: lazily regenerates the
//! milestone batch on the first read of a new calendar day, serves the
//! roadmap view, guards completions behind the daily quotas, applies XP and
//! coin deltas, and rolls boss-battle item rewards. Daily challenges and the
//! daily reward claim follow the same calendar-day rhythm.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::generator::MilestoneGenerator;
use crate::store::{DailyRewardGrant, Store};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use venture_common::challenges::select_daily_challenges;
use venture_common::llm::LlmClient;
use venture_common::personalization::{personalize, PersonalizationInput};
use venture_common::progression::{self, LevelProgress};
use venture_common::rewards;
use venture_common::schemas::{
    AwardedItem, BusinessProfile, DailyChallenge, Milestone, User, UserMilestone,
};

/// Today's quota status, shipped with the roadmap view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DailyProgress {
    pub completed_today: u32,
    pub can_complete: bool,
    pub boss_completed_today: bool,
}

/// The user's current batch plus progress, as the UI renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadmapView {
    pub milestones: Vec<Milestone>,
    pub progress: Vec<UserMilestone>,
    /// First not-yet-completed milestone, if any remain.
    pub current_milestone_id: Option<i64>,
    pub daily: DailyProgress,
    pub level: LevelProgress,
}

/// Result of a successful milestone completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub milestone: UserMilestone,
    pub user: User,
    /// Present for boss battles only.
    pub reward: Option<AwardedItem>,
}

/// Result of a successful challenge completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeOutcome {
    pub challenge: DailyChallenge,
    pub user: User,
}

/// Daily reward eligibility, for display.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DailyRewardStatus {
    pub login_streak: u32,
    pub streak_bonus_percent: u32,
    pub can_claim: bool,
    pub next_claim_at: Option<DateTime<Utc>>,
}

pub struct ProgressionEngine {
    store: Arc<Store>,
    generator: MilestoneGenerator,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<Store>,
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            generator: MilestoneGenerator::new(llm),
            clock,
            config,
        }
    }

    pub fn register_user(&self, username: &str, profile: &BusinessProfile) -> EngineResult<User> {
        self.store
            .create_user(username, profile, self.config.starting_dreamcoins)
    }

    /// The user's roadmap for today, regenerating the batch first if this is
    /// the first read of a new calendar day.
    pub fn roadmap(&self, user_id: i64) -> EngineResult<RoadmapView> {
        let user = self.store.user(user_id)?;
        let now = self.clock.now();

        if needs_regeneration(&user, now) {
            self.regenerate_batch(&user, now)?;
        } else {
            debug!(user_id, "daily batch still current");
        }

        let milestones = self.store.milestones_for_user(user_id)?;
        let progress = self.store.progress_rows(user_id)?;
        let current_milestone_id = milestones
            .iter()
            .find(|m| {
                !progress
                    .iter()
                    .any(|p| p.milestone_id == m.id && p.completed)
            })
            .map(|m| m.id);

        let counts = self.store.daily_counts(user_id, now)?;
        let user = self.store.user(user_id)?;

        Ok(RoadmapView {
            milestones,
            progress,
            current_milestone_id,
            daily: DailyProgress {
                completed_today: counts.completed,
                can_complete: counts.completed < self.config.daily_completion_limit,
                boss_completed_today: counts.boss_completed >= self.config.daily_boss_limit,
            },
            level: progression::progress(user.xp),
        })
    }

    fn regenerate_batch(&self, user: &User, now: DateTime<Utc>) -> EngineResult<()> {
        let stats = self.store.completion_stats(user.id)?;
        let metrics = self.store.metrics(user.id)?;

        let personalization = personalize(&PersonalizationInput {
            profile: &user.profile,
            completed_milestones: stats.completed,
            avg_completion_hours: stats.avg_completion_hours,
            metrics: metrics.as_ref(),
        });
        info!(
            user_id = user.id,
            difficulty = personalization.difficulty,
            focus_areas = ?personalization.focus_areas,
            "generating daily milestones"
        );

        let batch = self.generator.generate_batch(
            &user.profile,
            &personalization,
            self.config.milestones_per_day,
            &mut rand::thread_rng(),
        );
        self.store.replace_daily_batch(user.id, &batch, now)?;
        Ok(())
    }

    /// Complete a milestone: quota-guarded, idempotent, and atomic with the
    /// XP/coin/reward application.
    pub fn complete_milestone(
        &self,
        user_id: i64,
        milestone_id: i64,
        reflection: Option<String>,
        field_values: BTreeMap<String, String>,
    ) -> EngineResult<CompletionOutcome> {
        let now = self.clock.now();
        let milestone = self.store.milestone(milestone_id)?;

        if reflection.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(EngineError::validation("reflection must not be empty"));
        }
        for field in milestone.requirements.fields() {
            if field_values
                .get(field)
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
            {
                return Err(EngineError::validation(format!(
                    "missing required field: {}",
                    field
                )));
            }
        }

        // Boss battles award an item rolled here, independent of the preview
        // rolled at generation time.
        let reward = milestone.kind.is_boss().then(|| AwardedItem {
            spec: rewards::roll_item(&mut rand::thread_rng()).to_spec(),
            acquired_at: now,
        });

        let (progress, user) = self.store.complete_milestone(
            user_id,
            &milestone,
            reflection,
            &field_values,
            reward.clone(),
            now,
            &self.config,
        )?;

        info!(
            user_id,
            milestone_id,
            xp = milestone.xp_reward,
            coins = milestone.coin_reward,
            boss = milestone.kind.is_boss(),
            "milestone completed"
        );
        Ok(CompletionOutcome {
            milestone: progress,
            user,
            reward,
        })
    }

    /// Today's challenges, generating the batch on the first call of the day.
    pub fn daily_challenges(&self, user_id: i64) -> EngineResult<Vec<DailyChallenge>> {
        let user = self.store.user(user_id)?;
        let now = self.clock.now();

        let existing = self.store.challenges_for_day(user_id, now)?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let selection = select_daily_challenges(
            user_id,
            now.date_naive(),
            &user.profile,
            user.level,
            &user.challenge_history,
        );
        info!(
            user_id,
            count = selection.challenges.len(),
            history_reset = selection.history_reset,
            "generated daily challenges"
        );
        self.store.insert_daily_challenges(user_id, &selection, now)
    }

    pub fn complete_challenge(
        &self,
        user_id: i64,
        challenge_id: i64,
        answer: Option<&str>,
    ) -> EngineResult<ChallengeOutcome> {
        let (challenge, user) = self.store.complete_challenge(user_id, challenge_id, answer)?;
        info!(
            user_id,
            challenge_id,
            xp = challenge.xp_reward,
            coins = challenge.coin_reward,
            "daily challenge completed"
        );
        Ok(ChallengeOutcome { challenge, user })
    }

    /// Daily reward eligibility. One claim per UTC calendar day.
    pub fn daily_reward_status(&self, user_id: i64) -> EngineResult<DailyRewardStatus> {
        let user = self.store.user(user_id)?;
        let now = self.clock.now();

        let claimed_today = user
            .last_reward_claim
            .is_some_and(|claimed| claimed.date_naive() == now.date_naive());

        Ok(DailyRewardStatus {
            login_streak: user.login_streak,
            streak_bonus_percent: self.config.streak_bonus_percent(user.login_streak),
            can_claim: !claimed_today,
            next_claim_at: claimed_today
                .then(|| crate::clock::day_start(now) + Duration::days(1)),
        })
    }

    pub fn claim_daily_reward(&self, user_id: i64) -> EngineResult<(DailyRewardGrant, User)> {
        self.store
            .claim_daily_reward(user_id, self.clock.now(), &self.config)
    }
}

fn needs_regeneration(user: &User, now: DateTime<Utc>) -> bool {
    match user.last_milestone_generation {
        None => true,
        Some(generated) => generated.date_naive() != now.date_naive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_regeneration_on_date_change_only() {
        let mut user = user_fixture();
        let noon = "2026-03-14T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        assert!(needs_regeneration(&user, noon));

        user.last_milestone_generation = Some(noon - Duration::hours(10));
        assert!(!needs_regeneration(&user, noon));

        // Calendar-day boundary, not a rolling 24h window.
        user.last_milestone_generation = Some(noon - Duration::hours(13));
        assert!(needs_regeneration(&user, noon));
    }

    fn user_fixture() -> User {
        User {
            id: 1,
            username: "founder".into(),
            xp: 0,
            level: 1,
            dreamcoins: 1000,
            profile: BusinessProfile::default(),
            challenge_history: vec![],
            last_milestone_generation: None,
            current_milestone_id: None,
            last_reward_claim: None,
            login_streak: 0,
        }
    }
}
