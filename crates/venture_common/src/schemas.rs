//! Core data model shared between the engine and the surrounding application.
//!
//! Enum fields that land in SQLite TEXT columns carry `as_str`/`from_str`
//! pairs; JSON payload columns (requirements, awarded rewards) go through
//! serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Business lifecycle stage, set during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusinessStage {
    #[default]
    Idea,
    Planning,
    Startup,
    Established,
}

impl BusinessStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Planning => "planning",
            Self::Startup => "startup",
            Self::Established => "established",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "planning" => Self::Planning,
            "startup" => Self::Startup,
            "established" => Self::Established,
            _ => Self::Idea,
        }
    }
}

/// Self-reported entrepreneurial experience tier.
///
/// The tier bounds generated content difficulty and scales challenge rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    #[default]
    Novice,
    SomeExperience,
    Experienced,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Novice => "novice",
            Self::SomeExperience => "some_experience",
            Self::Experienced => "experienced",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "some_experience" => Self::SomeExperience,
            "experienced" => Self::Experienced,
            _ => Self::Novice,
        }
    }

    /// Reward multiplier applied to daily-challenge templates.
    pub fn reward_multiplier(&self) -> f64 {
        match self {
            Self::Novice => 1.0,
            Self::SomeExperience => 1.5,
            Self::Experienced => 2.0,
        }
    }

    /// Flat bonus added to the derived content difficulty.
    pub fn difficulty_bonus(&self) -> u8 {
        match self {
            Self::Novice => 0,
            Self::SomeExperience => 1,
            Self::Experienced => 2,
        }
    }

    /// Ceiling on generated content difficulty for this tier.
    pub fn difficulty_cap(&self) -> u8 {
        match self {
            Self::Novice => 3,
            Self::SomeExperience => 4,
            Self::Experienced => 5,
        }
    }
}

/// A user's business profile, captured at onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BusinessProfile {
    /// Free-form industry key ("technology", "ecommerce", ...). `None` or an
    /// unknown key falls back to generic content everywhere.
    pub industry: Option<String>,
    pub stage: BusinessStage,
    pub experience: ExperienceLevel,
    /// Stated goals, matched against template categories for prioritization.
    pub goals: Vec<String>,
    /// Self-assessed skill levels, 1-5 per category.
    pub skill_levels: BTreeMap<String, u8>,
}

/// A registered user as the engine sees one.
///
/// `level` is always derived from `xp`; it is stored for display but
/// recomputed on every XP change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub xp: u64,
    pub level: u32,
    pub dreamcoins: u64,
    pub profile: BusinessProfile,
    /// Rolling list of daily-challenge descriptions already served.
    pub challenge_history: Vec<String>,
    pub last_milestone_generation: Option<DateTime<Utc>>,
    pub current_milestone_id: Option<i64>,
    pub last_reward_claim: Option<DateTime<Utc>>,
    pub login_streak: u32,
}

/// Milestone flavor: ordinary task or the daily boss battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Task,
    BossBattle,
}

impl MilestoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::BossBattle => "boss_battle",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "boss_battle" => Self::BossBattle,
            _ => Self::Task,
        }
    }

    pub fn is_boss(&self) -> bool {
        matches!(self, Self::BossBattle)
    }
}

/// Structured milestone requirements, tagged by kind so malformed collaborator
/// output is caught at the boundary instead of living in an untyped blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MilestoneRequirements {
    /// Free-text fields the user must fill in when completing.
    Task { fields: Vec<String> },
    /// Boss battles additionally carry the item rolled at generation time.
    /// The awarded item is rolled again, independently, at completion.
    BossBattle {
        fields: Vec<String>,
        reward_preview: ItemSpec,
    },
}

impl MilestoneRequirements {
    pub fn fields(&self) -> &[String] {
        match self {
            Self::Task { fields } => fields,
            Self::BossBattle { fields, .. } => fields,
        }
    }
}

/// A milestone row. Immutable once created apart from bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub kind: MilestoneKind,
    pub category: String,
    /// 1-5, from the personalization result at generation time.
    pub difficulty: u8,
    pub estimated_duration: String,
    pub xp_reward: u64,
    pub coin_reward: u64,
    pub requirements: MilestoneRequirements,
    /// System-generated (eligible for regeneration cleanup) vs. seeded.
    pub ai_generated: bool,
    /// Position within the daily batch, 1-based.
    pub sort_order: u32,
}

/// Per-user milestone progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMilestone {
    pub id: i64,
    pub user_id: i64,
    pub milestone_id: i64,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reflection: Option<String>,
    /// Answers to the milestone's required fields.
    pub field_values: BTreeMap<String, String>,
    /// Resolved reward payload, boss battles only.
    pub reward: Option<AwardedItem>,
}

/// Daily challenge flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Task,
    Quiz,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Quiz => "quiz",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "quiz" => Self::Quiz,
            _ => Self::Task,
        }
    }
}

/// One of the user's daily challenges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyChallenge {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub kind: ChallengeKind,
    pub category: String,
    pub xp_reward: u64,
    pub coin_reward: u64,
    /// Quiz only.
    pub options: Vec<String>,
    /// Quiz only.
    pub correct_answer: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Item rarity tier, governing roll probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 4] = [Self::Common, Self::Rare, Self::Epic, Self::Legendary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "rare" => Self::Rare,
            "epic" => Self::Epic,
            "legendary" => Self::Legendary,
            _ => Self::Common,
        }
    }
}

/// Collectible item category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    OfficeArtifacts,
    TechRelics,
    StartupMemorabilia,
    BusinessTools,
    CorporateTreasures,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfficeArtifacts => "office_artifacts",
            Self::TechRelics => "tech_relics",
            Self::StartupMemorabilia => "startup_memorabilia",
            Self::BusinessTools => "business_tools",
            Self::CorporateTreasures => "corporate_treasures",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "tech_relics" => Self::TechRelics,
            "startup_memorabilia" => Self::StartupMemorabilia,
            "business_tools" => Self::BusinessTools,
            "corporate_treasures" => Self::CorporateTreasures,
            _ => Self::OfficeArtifacts,
        }
    }
}

/// Catalog identity of an item. Deduplicated on (name, rarity, category).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    pub description: String,
    pub rarity: Rarity,
    pub category: ItemCategory,
}

/// A catalog item that has been persisted (first time it was awarded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    #[serde(flatten)]
    pub spec: ItemSpec,
}

/// An item granted to a user, as stored on the completion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardedItem {
    #[serde(flatten)]
    pub spec: ItemSpec,
    pub acquired_at: DateTime<Utc>,
}

/// How an ownership record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    BossBattle,
    MarketPurchase,
    MarketUnlisted,
    Purchase,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BossBattle => "boss_battle",
            Self::MarketPurchase => "market_purchase",
            Self::MarketUnlisted => "market_unlisted",
            Self::Purchase => "purchase",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "market_purchase" => Self::MarketPurchase,
            "market_unlisted" => Self::MarketUnlisted,
            "purchase" => Self::Purchase,
            _ => Self::BossBattle,
        }
    }
}

/// Ownership record. Deleted when the item is listed for sale, recreated on
/// purchase or unlisting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserItem {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub acquired_at: DateTime<Utc>,
    pub source: ItemSource,
    pub equipped: bool,
}

/// A marketplace listing. Deactivated on sale or unlisting, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListing {
    pub id: i64,
    pub seller_id: i64,
    pub item_id: i64,
    pub price: u64,
    pub active: bool,
    pub listed_at: DateTime<Utc>,
}
