//! Daily-challenge template pool and selector.
//!
//! Challenges are rule-based, not LLM-generated: a static pool of task and
//! quiz templates is filtered against the user's rolling history, prioritized
//! by their goals and weak skills, and reward-scaled by level and experience.
//! All randomness is drawn from a per-user per-day seed so repeated reads
//! within one day pick the same set until the batch is actually persisted.

use crate::personalization::SKILL_COMPETENCY_THRESHOLD;
use crate::schemas::{BusinessProfile, BusinessStage, ChallengeKind};
use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const CHALLENGES_PER_DAY: usize = 3;
/// Only this many of the most recent history entries block reuse; older
/// challenges are allowed to come back around.
pub const CHALLENGE_HISTORY_WINDOW: usize = 90;

const GOAL_MATCH_SCORE: i32 = 2;
const WEAK_SKILL_SCORE: i32 = 1;

/// A hand-authored challenge template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeTemplate {
    pub kind: ChallengeKind,
    pub category: &'static str,
    pub description: &'static str,
    pub options: &'static [&'static str],
    pub correct_answer: Option<&'static str>,
    pub xp_reward: u64,
    pub coin_reward: u64,
}

const fn task(
    category: &'static str,
    description: &'static str,
    xp_reward: u64,
    coin_reward: u64,
) -> ChallengeTemplate {
    ChallengeTemplate {
        kind: ChallengeKind::Task,
        category,
        description,
        options: &[],
        correct_answer: None,
        xp_reward,
        coin_reward,
    }
}

const fn quiz(
    category: &'static str,
    description: &'static str,
    options: &'static [&'static str],
    correct_answer: &'static str,
    xp_reward: u64,
    coin_reward: u64,
) -> ChallengeTemplate {
    ChallengeTemplate {
        kind: ChallengeKind::Quiz,
        category,
        description,
        options,
        correct_answer: Some(correct_answer),
        xp_reward,
        coin_reward,
    }
}

const GENERAL_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "daily_progress",
        "Record today's key numbers in your business progress tracker",
        50,
        100,
    ),
    task(
        "networking",
        "Reach out to one founder in your space and ask how they got their first customer",
        75,
        150,
    ),
    task(
        "learning",
        "Read one industry report or case study and note three takeaways",
        60,
        120,
    ),
    task(
        "productivity",
        "Write a prioritized task list for your next business milestone",
        45,
        90,
    ),
    task(
        "productivity",
        "Track where your working hours actually went today",
        70,
        140,
    ),
    task(
        "customer_research",
        "Interview three potential customers about the problem you are solving",
        120,
        240,
    ),
    quiz(
        "market_research",
        "What's the first step in validating a business idea?",
        &[
            "Build a complete product",
            "Talk to potential customers",
            "Write a business plan",
            "Design a logo",
        ],
        "Talk to potential customers",
        100,
        200,
    ),
    quiz(
        "business_strategy",
        "Which of these is NOT a sound way to test market demand?",
        &[
            "Launching a landing page to gauge interest",
            "Running customer interviews",
            "Building the full product before any feedback",
            "Running small paid-ad experiments",
        ],
        "Building the full product before any feedback",
        90,
        180,
    ),
    quiz(
        "finance",
        "Which financial number matters most to an early-stage startup?",
        &["Revenue growth", "Burn rate", "Profit margin", "Total assets"],
        "Burn rate",
        95,
        190,
    ),
];

const TECHNOLOGY_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "product_development",
        "Write a one-page technical spec for your product's core feature",
        120,
        240,
    ),
    task(
        "security",
        "Run a basic security review of your application and note the gaps",
        150,
        300,
    ),
    task(
        "tech_growth",
        "Pull this week's performance metrics and pick one thing to optimize",
        130,
        260,
    ),
    quiz(
        "tech_trends",
        "Which development approach suits rapid iteration best?",
        &["Waterfall", "Agile", "V-Model", "Big Bang"],
        "Agile",
        100,
        200,
    ),
    quiz(
        "tech_stack",
        "What matters most when a startup picks its tech stack?",
        &[
            "Using the newest technologies",
            "Speed of development and maintenance",
            "Whatever competitors use",
            "Personal preference",
        ],
        "Speed of development and maintenance",
        110,
        220,
    ),
];

const ECOMMERCE_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "inventory",
        "Review your top sellers and adjust stock levels accordingly",
        90,
        180,
    ),
    task(
        "customer_service",
        "Answer every piece of customer feedback from the past week",
        100,
        200,
    ),
    task(
        "marketing",
        "Rewrite the product descriptions of your five best sellers for search",
        130,
        260,
    ),
    quiz(
        "retail_operations",
        "Which metric matters most to an e-commerce business?",
        &[
            "Total revenue",
            "Customer lifetime value",
            "Number of products",
            "Website traffic",
        ],
        "Customer lifetime value",
        110,
        220,
    ),
];

const SERVICES_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "service_delivery",
        "Write down your service delivery process end to end and mark the weak spots",
        110,
        220,
    ),
    task(
        "client_management",
        "Draft an onboarding checklist for new clients",
        120,
        240,
    ),
    quiz(
        "service_business",
        "What's the most effective way to price services?",
        &["Hourly rate", "Value-based pricing", "Cost-plus pricing", "Market rate"],
        "Value-based pricing",
        100,
        200,
    ),
];

const HEALTH_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "compliance",
        "Review your health and safety documentation and flag anything stale",
        140,
        280,
    ),
    task(
        "patient_care",
        "Sketch a simple system for collecting patient feedback",
        130,
        260,
    ),
    quiz(
        "healthcare",
        "What's the biggest driver of a healthcare business's success?",
        &["Location", "Patient satisfaction", "Equipment quality", "Marketing"],
        "Patient satisfaction",
        120,
        240,
    ),
];

const EDUCATION_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "curriculum",
        "Outline a new course or training module",
        120,
        240,
    ),
    task(
        "student_success",
        "Look at learner progress data and pick one drop-off point to fix",
        130,
        260,
    ),
    quiz(
        "edtech",
        "What's the most telling measure of learning outcomes?",
        &["Test scores", "Student engagement", "Completion rates", "Student feedback"],
        "Student engagement",
        110,
        220,
    ),
];

const FOOD_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "food_safety",
        "Walk through a food safety audit of your operation",
        150,
        300,
    ),
    task(
        "menu_engineering",
        "Rank your menu items by profitability and popularity",
        140,
        280,
    ),
    quiz(
        "food_business",
        "What most determines a food business's profitability?",
        &["Menu pricing", "Food cost control", "Marketing", "Location"],
        "Food cost control",
        120,
        240,
    ),
];

const IDEA_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "validation",
        "Put up a simple landing page to test your business concept",
        100,
        200,
    ),
    quiz(
        "ideation",
        "What's the most important factor in idea validation?",
        &["Market size", "Customer need", "Competition", "Technology"],
        "Customer need",
        90,
        180,
    ),
];

const PLANNING_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "business_planning",
        "Draft your business model canvas",
        130,
        260,
    ),
    quiz(
        "planning",
        "What should open your business plan?",
        &["Financials", "Executive summary", "Market analysis", "Team"],
        "Executive summary",
        100,
        200,
    ),
];

const STARTUP_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "growth",
        "Set up tracking for where your new customers actually come from",
        120,
        240,
    ),
    quiz(
        "startup_metrics",
        "What's the most important early-stage startup metric?",
        &["Revenue", "User growth", "Profit", "Market share"],
        "User growth",
        110,
        220,
    ),
];

const ESTABLISHED_TEMPLATES: &[ChallengeTemplate] = &[
    task(
        "scaling",
        "Write a 90-day scaling plan for your business",
        150,
        300,
    ),
    quiz(
        "business_growth",
        "What's the most effective lever for scaling an established business?",
        &["Hiring more staff", "Process automation", "Marketing", "New products"],
        "Process automation",
        130,
        260,
    ),
];

/// Templates for an industry key; empty for unknown industries.
pub fn industry_templates(industry: &str) -> &'static [ChallengeTemplate] {
    match industry {
        "technology" => TECHNOLOGY_TEMPLATES,
        "ecommerce" => ECOMMERCE_TEMPLATES,
        "services" => SERVICES_TEMPLATES,
        "health" => HEALTH_TEMPLATES,
        "education" => EDUCATION_TEMPLATES,
        "food" => FOOD_TEMPLATES,
        _ => &[],
    }
}

fn stage_templates(stage: BusinessStage) -> &'static [ChallengeTemplate] {
    match stage {
        BusinessStage::Idea => IDEA_TEMPLATES,
        BusinessStage::Planning => PLANNING_TEMPLATES,
        BusinessStage::Startup => STARTUP_TEMPLATES,
        BusinessStage::Established => ESTABLISHED_TEMPLATES,
    }
}

/// The full candidate pool for a profile: general plus industry plus stage.
pub fn template_pool(profile: &BusinessProfile) -> Vec<&'static ChallengeTemplate> {
    let mut pool: Vec<&'static ChallengeTemplate> = GENERAL_TEMPLATES.iter().collect();
    if let Some(industry) = profile.industry.as_deref() {
        pool.extend(industry_templates(industry));
    }
    pool.extend(stage_templates(profile.stage));
    pool
}

/// A template after selection and reward scaling, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedChallenge {
    pub kind: ChallengeKind,
    pub category: String,
    pub description: String,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub xp_reward: u64,
    pub coin_reward: u64,
}

/// Outcome of a day's selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeSelection {
    pub challenges: Vec<SelectedChallenge>,
    /// True when the history had to be wiped because too few unique
    /// templates remained; the caller persists the wipe.
    pub history_reset: bool,
}

/// Seeded RNG for one user-day. Seed = user id + day-of-month, so a given
/// user rolls the same stream all day but different streams day to day.
pub fn daily_rng(user_id: i64, date: NaiveDate) -> StdRng {
    StdRng::seed_from_u64(user_id as u64 + date.day() as u64)
}

/// Reward jitter in [0.9, 1.1), deterministic per user-day.
pub fn deterministic_jitter(user_id: i64, date: NaiveDate) -> f64 {
    0.9 + daily_rng(user_id, date).gen::<f64>() * 0.2
}

fn priority_score(template: &ChallengeTemplate, profile: &BusinessProfile) -> i32 {
    let mut score = 0;
    if profile.goals.iter().any(|g| g == template.category) {
        score += GOAL_MATCH_SCORE;
    }
    if profile
        .skill_levels
        .get(template.category)
        .is_some_and(|level| *level < SKILL_COMPETENCY_THRESHOLD)
    {
        score += WEAK_SKILL_SCORE;
    }
    score
}

/// Pick and scale the day's challenges.
///
/// `history` is the user's full rolling history, oldest first; only the most
/// recent [`CHALLENGE_HISTORY_WINDOW`] entries block reuse.
pub fn select_daily_challenges(
    user_id: i64,
    date: NaiveDate,
    profile: &BusinessProfile,
    level: u32,
    history: &[String],
) -> ChallengeSelection {
    let pool = template_pool(profile);

    let recent: HashSet<&str> = history
        .iter()
        .rev()
        .take(CHALLENGE_HISTORY_WINDOW)
        .map(String::as_str)
        .collect();

    let mut available: Vec<&'static ChallengeTemplate> = pool
        .iter()
        .copied()
        .filter(|t| !recent.contains(t.description))
        .collect();

    // Running low on unique templates: reset the history rather than fail or
    // return a short batch.
    let history_reset = available.len() < CHALLENGES_PER_DAY;
    if history_reset {
        tracing::info!(
            user_id,
            available = available.len(),
            "too few unique challenge templates remain, resetting history"
        );
        available = pool;
    }

    let mut rng = daily_rng(user_id, date);

    // Shuffle first so equal scores tie-break on the daily seed, then a
    // stable sort by score keeps the best candidates in front.
    available.shuffle(&mut rng);
    available.sort_by_key(|t| std::cmp::Reverse(priority_score(t, profile)));

    let mut picked: Vec<&'static ChallengeTemplate> = Vec::with_capacity(CHALLENGES_PER_DAY);

    // At least one quiz whenever any exist.
    if let Some(q) = available.iter().find(|t| t.kind == ChallengeKind::Quiz) {
        picked.push(*q);
    }
    // Fill with tasks, then backfill from whatever is left.
    for t in available.iter().filter(|t| t.kind == ChallengeKind::Task) {
        if picked.len() >= CHALLENGES_PER_DAY {
            break;
        }
        if !picked.iter().any(|p| p.description == t.description) {
            picked.push(*t);
        }
    }
    for t in available.iter() {
        if picked.len() >= CHALLENGES_PER_DAY {
            break;
        }
        if !picked.iter().any(|p| p.description == t.description) {
            picked.push(*t);
        }
    }

    let level_multiplier = 1.0 + (level / 10) as f64 * 0.2;
    let experience_multiplier = profile.experience.reward_multiplier();

    let challenges = picked
        .into_iter()
        .map(|t| {
            let jitter = 0.9 + rng.gen::<f64>() * 0.2;
            SelectedChallenge {
                kind: t.kind,
                category: t.category.to_string(),
                description: t.description.to_string(),
                options: t.options.iter().map(|o| o.to_string()).collect(),
                correct_answer: t.correct_answer.map(str::to_string),
                xp_reward: scale_reward(t.xp_reward, level_multiplier, experience_multiplier, jitter),
                coin_reward: scale_reward(
                    t.coin_reward,
                    level_multiplier,
                    experience_multiplier,
                    jitter,
                ),
            }
        })
        .collect();

    ChallengeSelection {
        challenges,
        history_reset,
    }
}

fn scale_reward(base: u64, level_mult: f64, exp_mult: f64, jitter: f64) -> u64 {
    (base as f64 * level_mult * exp_mult * jitter).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ExperienceLevel;
    use std::collections::BTreeMap;

    fn profile() -> BusinessProfile {
        BusinessProfile {
            industry: Some("technology".into()),
            stage: BusinessStage::Startup,
            experience: ExperienceLevel::Novice,
            goals: vec![],
            skill_levels: BTreeMap::new(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_pool_combines_general_industry_stage() {
        let pool = template_pool(&profile());
        assert_eq!(
            pool.len(),
            GENERAL_TEMPLATES.len() + TECHNOLOGY_TEMPLATES.len() + STARTUP_TEMPLATES.len()
        );

        let mut unknown = profile();
        unknown.industry = Some("mystery".into());
        assert_eq!(
            template_pool(&unknown).len(),
            GENERAL_TEMPLATES.len() + STARTUP_TEMPLATES.len()
        );
    }

    #[test]
    fn test_selects_fixed_count_with_a_quiz() {
        let selection = select_daily_challenges(7, date(), &profile(), 1, &[]);
        assert_eq!(selection.challenges.len(), CHALLENGES_PER_DAY);
        assert!(!selection.history_reset);
        assert!(selection
            .challenges
            .iter()
            .any(|c| c.kind == ChallengeKind::Quiz));

        let unique: HashSet<_> = selection.challenges.iter().map(|c| &c.description).collect();
        assert_eq!(unique.len(), CHALLENGES_PER_DAY);
    }

    #[test]
    fn test_selection_is_stable_within_a_day() {
        let a = select_daily_challenges(7, date(), &profile(), 1, &[]);
        let b = select_daily_challenges(7, date(), &profile(), 1, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_history_filters_out_served_templates() {
        let first = select_daily_challenges(7, date(), &profile(), 1, &[]);
        let history: Vec<String> = first
            .challenges
            .iter()
            .map(|c| c.description.clone())
            .collect();

        let second = select_daily_challenges(7, date(), &profile(), 1, &history);
        for c in &second.challenges {
            assert!(
                !history.contains(&c.description),
                "served template came back: {}",
                c.description
            );
        }
    }

    #[test]
    fn test_exhausted_history_resets_instead_of_failing() {
        let pool = template_pool(&profile());
        let history: Vec<String> = pool.iter().map(|t| t.description.to_string()).collect();

        let selection = select_daily_challenges(7, date(), &profile(), 1, &history);
        assert!(selection.history_reset);
        assert_eq!(selection.challenges.len(), CHALLENGES_PER_DAY);
    }

    #[test]
    fn test_goal_match_outranks_the_rest() {
        let mut p = profile();
        p.goals = vec!["security".into()];

        let selection = select_daily_challenges(7, date(), &p, 1, &[]);
        assert!(
            selection
                .challenges
                .iter()
                .any(|c| c.category == "security"),
            "goal-matched template missing from {:?}",
            selection.challenges
        );
    }

    #[test]
    fn test_reward_scaling_bounds() {
        let mut p = profile();
        p.experience = ExperienceLevel::Experienced;

        // Level 20 -> 1.4x, experienced -> 2x, jitter within [0.9, 1.1).
        let selection = select_daily_challenges(7, date(), &p, 20, &[]);
        let pool = template_pool(&p);
        for c in &selection.challenges {
            let base = pool
                .iter()
                .find(|t| t.description == c.description)
                .unwrap()
                .xp_reward as f64;
            let scaled = c.xp_reward as f64;
            assert!(scaled >= (base * 1.4 * 2.0 * 0.9).floor());
            assert!(scaled <= (base * 1.4 * 2.0 * 1.1).ceil());
        }
    }

    #[test]
    fn test_jitter_is_deterministic_and_bounded() {
        let j1 = deterministic_jitter(42, date());
        let j2 = deterministic_jitter(42, date());
        assert_eq!(j1, j2);
        assert!((0.9..1.1).contains(&j1));

        let other_day = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_ne!(
            deterministic_jitter(42, date()),
            deterministic_jitter(42, other_day)
        );
    }
}
