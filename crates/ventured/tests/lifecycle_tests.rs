//! Lifecycle correctness tests.
//!
//! Drive the progression engine end-to-end against in-memory SQLite with a
//! scripted content-generation fake and a pinned clock:
//!
//! 1. Daily batches generate lazily, read idempotently, regenerate on the
//!    calendar-day boundary and clean up orphaned rows
//! 2. Completions are idempotent and quota-guarded
//! 3. Daily challenges and the daily reward follow the same day rhythm

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use venture_common::llm::{FakeLlmClient, LlmError};
use venture_common::schemas::{
    BusinessProfile, ChallengeKind, ItemSource, ItemSpec, Milestone, MilestoneKind,
    MilestoneRequirements, Rarity,
};
use ventured::error::{ConflictReason, EngineError};
use ventured::generator::GeneratedMilestone;
use ventured::{Clock, EngineConfig, FixedClock, ProgressionEngine, Store};

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    engine: ProgressionEngine,
    store: Arc<Store>,
    clock: Arc<FixedClock>,
    llm: Arc<FakeLlmClient>,
}

fn start_time() -> DateTime<Utc> {
    "2026-03-14T09:00:00Z".parse().unwrap()
}

fn milestone_json() -> String {
    serde_json::json!({
        "title": "Validate pricing",
        "description": "Interview five prospects about willingness to pay",
        "category": "market_research",
        "fields": ["interviewNotes", "pricingSummary"]
    })
    .to_string()
}

fn harness_with(llm: FakeLlmClient) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
    let clock = Arc::new(FixedClock::at(start_time()));
    let llm = Arc::new(llm);
    let engine = ProgressionEngine::new(
        store.clone(),
        llm.clone(),
        clock.clone(),
        EngineConfig::default(),
    );
    Harness {
        engine,
        store,
        clock,
        llm,
    }
}

fn harness() -> Harness {
    harness_with(FakeLlmClient::always(milestone_json()))
}

fn register(h: &Harness) -> i64 {
    let profile = BusinessProfile {
        industry: Some("technology".into()),
        ..Default::default()
    };
    h.engine
        .register_user("founder", &profile)
        .expect("register user")
        .id
}

fn answers_for(milestone: &Milestone) -> BTreeMap<String, String> {
    milestone
        .requirements
        .fields()
        .iter()
        .map(|f| (f.clone(), "done".to_string()))
        .collect()
}

fn complete(h: &Harness, user_id: i64, milestone: &Milestone) -> ventured::lifecycle::CompletionOutcome {
    h.engine
        .complete_milestone(
            user_id,
            milestone.id,
            Some("Went well.".into()),
            answers_for(milestone),
        )
        .expect("completion should succeed")
}

fn seeded_milestone(kind: MilestoneKind, xp: u64) -> GeneratedMilestone {
    GeneratedMilestone {
        title: "Seeded Milestone".into(),
        description: "Hand-authored content".into(),
        kind,
        category: "development".into(),
        difficulty: 1,
        estimated_duration: "30min".into(),
        xp_reward: xp,
        coin_reward: 10,
        requirements: match kind {
            MilestoneKind::Task => MilestoneRequirements::Task { fields: vec![] },
            MilestoneKind::BossBattle => MilestoneRequirements::BossBattle {
                fields: vec![],
                reward_preview: ItemSpec {
                    name: "Placeholder".into(),
                    description: "Preview".into(),
                    rarity: Rarity::Common,
                    category: venture_common::schemas::ItemCategory::BusinessTools,
                },
            },
        },
        ai_generated: false,
        sort_order: 99,
    }
}

/// Seed a milestone outside the generated batch and put it in the user's set.
fn attach_seeded(h: &Harness, user_id: i64, kind: MilestoneKind, xp: u64) -> Milestone {
    let milestone = h
        .store
        .seed_milestone(&seeded_milestone(kind, xp))
        .expect("seed milestone");
    h.store
        .attach_milestone(user_id, milestone.id, h.clock.now())
        .expect("attach milestone");
    milestone
}

// ============================================================================
// Batch generation
// ============================================================================

#[test]
fn test_first_roadmap_generates_full_batch() {
    let h = harness();
    let user_id = register(&h);

    let view = h.engine.roadmap(user_id).unwrap();

    assert_eq!(view.milestones.len(), 5);
    assert_eq!(view.progress.len(), 5);
    assert!(view.progress.iter().all(|p| !p.completed));
    assert_eq!(h.llm.call_count(), 5);

    // Slots 1-4 are tasks, the last is the boss battle.
    for m in &view.milestones[..4] {
        assert_eq!(m.kind, MilestoneKind::Task);
    }
    assert_eq!(view.milestones[4].kind, MilestoneKind::BossBattle);

    assert_eq!(view.current_milestone_id, Some(view.milestones[0].id));
    assert_eq!(view.daily.completed_today, 0);
    assert!(view.daily.can_complete);
    assert!(!view.daily.boss_completed_today);
    assert_eq!(view.level.current_level, 1);
}

#[test]
fn test_same_day_roadmap_is_idempotent() {
    let h = harness();
    let user_id = register(&h);

    let first = h.engine.roadmap(user_id).unwrap();
    let second = h.engine.roadmap(user_id).unwrap();

    let ids = |v: &ventured::lifecycle::RoadmapView| {
        v.milestones.iter().map(|m| m.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
    // No further content generation on the second read.
    assert_eq!(h.llm.call_count(), 5);
}

#[test]
fn test_new_day_regenerates_and_cleans_orphans() {
    let h = harness();
    let user_id = register(&h);

    let first = h.engine.roadmap(user_id).unwrap();
    let completed_id = first.milestones[0].id;
    let orphan_ids: Vec<i64> = first.milestones[1..].iter().map(|m| m.id).collect();
    complete(&h, user_id, &first.milestones[0]);

    h.clock.advance(Duration::days(1));
    let second = h.engine.roadmap(user_id).unwrap();

    let new_ids: Vec<i64> = second.milestones.iter().map(|m| m.id).collect();
    assert_eq!(new_ids.len(), 5);
    assert!(orphan_ids.iter().all(|id| !new_ids.contains(id)));

    // Never-attempted generated milestones are gone; the completed one and
    // its progress row survive.
    for id in &orphan_ids {
        assert!(matches!(
            h.store.milestone(*id),
            Err(EngineError::NotFound(_))
        ));
    }
    assert!(h.store.milestone(completed_id).is_ok());
    let progress = h.store.progress_rows(user_id).unwrap();
    assert_eq!(progress.len(), 6);
    assert!(progress
        .iter()
        .any(|p| p.milestone_id == completed_id && p.completed));
}

#[test]
fn test_collaborator_failure_still_yields_a_batch() {
    let h = harness_with(FakeLlmClient::always_error(LlmError::EmptyResponse));
    let user_id = register(&h);

    let view = h.engine.roadmap(user_id).unwrap();

    assert_eq!(view.milestones.len(), 5);
    assert_eq!(view.milestones[0].title, "Business Development Task");
    assert_eq!(view.milestones[4].title, "Boss Battle: Industry Challenge");
    assert!(view.milestones.iter().all(|m| m.category == "development"));
}

// ============================================================================
// Milestone completion
// ============================================================================

#[test]
fn test_completion_applies_xp_and_coins() {
    let h = harness();
    let user_id = register(&h);
    let view = h.engine.roadmap(user_id).unwrap();
    let milestone = &view.milestones[0];

    let outcome = complete(&h, user_id, milestone);

    assert_eq!(outcome.user.xp, milestone.xp_reward);
    assert_eq!(outcome.user.dreamcoins, 1000 + milestone.coin_reward);
    assert_eq!(outcome.user.level, 1);
    assert!(outcome.reward.is_none());
    assert!(outcome.milestone.completed);
    assert_eq!(
        outcome.user.current_milestone_id,
        Some(view.milestones[1].id)
    );
}

#[test]
fn test_completion_levels_up_from_xp() {
    let h = harness();
    let user_id = register(&h);
    h.engine.roadmap(user_id).unwrap();

    // 5000 XP lands in level 4 (cumulative costs 1200/2640/4368/6441).
    let big = attach_seeded(&h, user_id, MilestoneKind::Task, 5000);
    let outcome = complete(&h, user_id, &big);

    assert_eq!(outcome.user.xp, 5000);
    assert_eq!(outcome.user.level, 4);
}

#[test]
fn test_double_completion_is_rejected() {
    let h = harness();
    let user_id = register(&h);
    let view = h.engine.roadmap(user_id).unwrap();
    let milestone = &view.milestones[0];

    let outcome = complete(&h, user_id, milestone);
    let err = h
        .engine
        .complete_milestone(user_id, milestone.id, None, answers_for(milestone))
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Conflict(ConflictReason::AlreadyCompleted)
    ));
    // XP was not applied twice.
    let user = h.store.user(user_id).unwrap();
    assert_eq!(user.xp, outcome.user.xp);
}

#[test]
fn test_unknown_milestone_is_not_found() {
    let h = harness();
    let user_id = register(&h);
    let err = h
        .engine
        .complete_milestone(user_id, 424242, None, BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn test_missing_required_fields_is_validation_error() {
    let h = harness();
    let user_id = register(&h);
    let view = h.engine.roadmap(user_id).unwrap();

    let err = h
        .engine
        .complete_milestone(user_id, view.milestones[0].id, None, BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // Nothing was recorded.
    assert_eq!(h.store.daily_counts(user_id, h.clock.now()).unwrap().completed, 0);
}

#[test]
fn test_boss_completion_awards_an_item() {
    let h = harness();
    let user_id = register(&h);
    let view = h.engine.roadmap(user_id).unwrap();
    let boss = &view.milestones[4];

    let outcome = complete(&h, user_id, boss);

    let reward = outcome.reward.expect("boss battles carry an item");
    assert!(!reward.spec.name.is_empty());
    assert_eq!(outcome.milestone.reward, Some(reward.clone()));

    let inventory = h.store.inventory(user_id).unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].0.source, ItemSource::BossBattle);
    assert_eq!(inventory[0].1.spec.name, reward.spec.name);

    let after = h.engine.roadmap(user_id).unwrap();
    assert!(after.daily.boss_completed_today);
}

#[test]
fn test_second_boss_same_day_hits_boss_limit() {
    let h = harness();
    let user_id = register(&h);
    let view = h.engine.roadmap(user_id).unwrap();
    complete(&h, user_id, &view.milestones[4]);

    // Daily count is 1 of 5, but the boss cap is independent.
    let second_boss = attach_seeded(&h, user_id, MilestoneKind::BossBattle, 100);
    let err = h
        .engine
        .complete_milestone(user_id, second_boss.id, None, BTreeMap::new())
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Conflict(ConflictReason::BossLimitReached)
    ));
}

#[test]
fn test_sixth_completion_hits_daily_limit() {
    let h = harness();
    let user_id = register(&h);
    let view = h.engine.roadmap(user_id).unwrap();

    for milestone in &view.milestones {
        complete(&h, user_id, milestone);
    }
    let after = h.engine.roadmap(user_id).unwrap();
    assert_eq!(after.daily.completed_today, 5);
    assert!(!after.daily.can_complete);

    let sixth = attach_seeded(&h, user_id, MilestoneKind::Task, 100);
    let err = h
        .engine
        .complete_milestone(user_id, sixth.id, None, BTreeMap::new())
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Conflict(ConflictReason::DailyLimitReached)
    ));
}

// ============================================================================
// Daily challenges
// ============================================================================

#[test]
fn test_daily_challenges_generate_once_per_day() {
    let h = harness();
    let user_id = register(&h);

    let first = h.engine.daily_challenges(user_id).unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.iter().any(|c| c.kind == ChallengeKind::Quiz));

    let second = h.engine.daily_challenges(user_id).unwrap();
    let ids = |v: &[venture_common::schemas::DailyChallenge]| {
        v.iter().map(|c| c.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));

    // Served descriptions are recorded in the rolling history.
    let user = h.store.user(user_id).unwrap();
    assert_eq!(user.challenge_history.len(), 3);

    // A new day brings a fresh batch that avoids the history.
    h.clock.advance(Duration::days(1));
    let next_day = h.engine.daily_challenges(user_id).unwrap();
    assert_eq!(next_day.len(), 3);
    for c in &next_day {
        assert!(!user.challenge_history.contains(&c.description));
    }
}

#[test]
fn test_challenge_completion_applies_rewards_once() {
    let h = harness();
    let user_id = register(&h);
    let challenges = h.engine.daily_challenges(user_id).unwrap();
    let task = challenges
        .iter()
        .find(|c| c.kind == ChallengeKind::Task)
        .expect("a task challenge");

    let outcome = h.engine.complete_challenge(user_id, task.id, None).unwrap();
    assert!(outcome.challenge.completed);
    assert_eq!(outcome.user.xp, task.xp_reward);
    assert_eq!(outcome.user.dreamcoins, 1000 + task.coin_reward);

    let err = h
        .engine
        .complete_challenge(user_id, task.id, None)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictReason::AlreadyCompleted)
    ));
}

#[test]
fn test_quiz_requires_the_correct_answer() {
    let h = harness();
    let user_id = register(&h);
    let challenges = h.engine.daily_challenges(user_id).unwrap();
    let quiz = challenges
        .iter()
        .find(|c| c.kind == ChallengeKind::Quiz)
        .expect("a quiz challenge");
    let correct = quiz.correct_answer.clone().expect("quiz has an answer");

    let err = h
        .engine
        .complete_challenge(user_id, quiz.id, Some("wrong answer"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictReason::IncorrectAnswer)
    ));
    // The miss did not mark it completed.
    let user = h.store.user(user_id).unwrap();
    assert_eq!(user.xp, 0);

    let outcome = h
        .engine
        .complete_challenge(user_id, quiz.id, Some(&correct))
        .unwrap();
    assert!(outcome.challenge.completed);
    assert_eq!(outcome.user.xp, quiz.xp_reward);
}

// ============================================================================
// Daily reward
// ============================================================================

#[test]
fn test_daily_reward_claim_and_streak() {
    let h = harness();
    let user_id = register(&h);

    let status = h.engine.daily_reward_status(user_id).unwrap();
    assert!(status.can_claim);
    assert_eq!(status.login_streak, 0);

    // First claim: streak 1, 5% bonus on 100 base XP.
    let (grant, user) = h.engine.claim_daily_reward(user_id).unwrap();
    assert_eq!(grant.dreamcoins, 1000);
    assert_eq!(grant.login_streak, 1);
    assert_eq!(grant.streak_bonus_percent, 5);
    assert_eq!(grant.xp, 105);
    assert_eq!(user.dreamcoins, 2000);
    assert_eq!(user.xp, 105);

    // Second claim the same day is rejected with nothing applied.
    let err = h.engine.claim_daily_reward(user_id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictReason::RewardNotReady)
    ));
    assert_eq!(h.store.user(user_id).unwrap().dreamcoins, 2000);

    let status = h.engine.daily_reward_status(user_id).unwrap();
    assert!(!status.can_claim);
    assert!(status.next_claim_at.is_some());

    // Next day extends the streak.
    h.clock.advance(Duration::days(1));
    let (grant, _) = h.engine.claim_daily_reward(user_id).unwrap();
    assert_eq!(grant.login_streak, 2);
    assert_eq!(grant.streak_bonus_percent, 10);
    assert_eq!(grant.xp, 110);

    // A gap resets the streak.
    h.clock.advance(Duration::days(3));
    let (grant, _) = h.engine.claim_daily_reward(user_id).unwrap();
    assert_eq!(grant.login_streak, 1);
}

#[test]
fn test_streak_bonus_caps_at_fifty_percent() {
    let h = harness();
    let user_id = register(&h);

    let mut last_grant = None;
    for _ in 0..12 {
        last_grant = Some(h.engine.claim_daily_reward(user_id).unwrap().0);
        h.clock.advance(Duration::days(1));
    }

    let grant = last_grant.unwrap();
    assert_eq!(grant.login_streak, 12);
    assert_eq!(grant.streak_bonus_percent, 50);
    assert_eq!(grant.xp, 150);
}

// ============================================================================
// Leaderboards
// ============================================================================

#[test]
fn test_leaderboards_order_by_progress() {
    let h = harness();
    let first = register(&h);
    let second = h
        .engine
        .register_user("rival", &BusinessProfile::default())
        .unwrap()
        .id;

    h.engine.roadmap(second).unwrap();
    let milestone = attach_seeded(&h, second, MilestoneKind::Task, 2000);
    complete(&h, second, &milestone);

    let by_xp = h.store.leaderboard_by_xp(10).unwrap();
    assert_eq!(by_xp[0].id, second);
    assert_eq!(by_xp[1].id, first);

    let by_coins = h.store.leaderboard_by_dreamcoins(10).unwrap();
    assert_eq!(by_coins[0].id, second);
}
