//! SQLite-backed persistence for the progression engine.
//!
//! All multi-statement mutations run inside a single transaction; quota and
//! idempotency checks happen inside that transaction, next to the writes they
//! guard, with UNIQUE constraints backing them up at the schema level.
//! Timestamps are stored as RFC3339 TEXT (UTC), which compares
//! lexicographically.

use crate::clock::day_start;
use crate::config::EngineConfig;
use crate::error::{ConflictReason, EngineError, EngineResult};
use crate::generator::GeneratedMilestone;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use venture_common::challenges::ChallengeSelection;
use venture_common::personalization::MetricsSnapshot;
use venture_common::progression::level_for_xp;
use venture_common::schemas::{
    AwardedItem, BusinessProfile, BusinessStage, ChallengeKind, DailyChallenge, ExperienceLevel,
    Item, ItemSource, ItemSpec, MarketListing, Milestone, MilestoneKind, MilestoneRequirements,
    User, UserItem, UserMilestone,
};

/// Today's completion tallies for quota checks and the roadmap view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyCounts {
    pub completed: u32,
    pub boss_completed: u32,
}

/// Completed-milestone aggregates feeding personalization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionStats {
    pub completed: u32,
    pub avg_completion_hours: Option<f64>,
}

/// What a daily reward claim granted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DailyRewardGrant {
    pub dreamcoins: u64,
    pub xp: u64,
    pub login_streak: u32,
    pub streak_bonus_percent: u32,
    pub next_claim_at: DateTime<Utc>,
}

/// Progression store backed by SQLite.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().context("Failed to initialize schema")?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                xp INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                dreamcoins INTEGER NOT NULL DEFAULT 0,
                industry TEXT,
                stage TEXT NOT NULL DEFAULT 'idea',
                experience TEXT NOT NULL DEFAULT 'novice',
                goals TEXT NOT NULL DEFAULT '[]',
                skill_levels TEXT NOT NULL DEFAULT '{}',
                challenge_history TEXT NOT NULL DEFAULT '[]',
                last_milestone_generation TEXT,
                current_milestone_id INTEGER,
                last_reward_claim TEXT,
                login_streak INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS milestones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                kind TEXT NOT NULL,
                category TEXT NOT NULL,
                difficulty INTEGER NOT NULL,
                estimated_duration TEXT NOT NULL,
                xp_reward INTEGER NOT NULL,
                coin_reward INTEGER NOT NULL,
                requirements TEXT NOT NULL,
                ai_generated INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_milestones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                milestone_id INTEGER NOT NULL REFERENCES milestones(id),
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                reflection TEXT,
                field_values TEXT NOT NULL DEFAULT '{}',
                reward TEXT,
                UNIQUE(user_id, milestone_id)
            );

            CREATE TABLE IF NOT EXISTS daily_challenges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                description TEXT NOT NULL,
                kind TEXT NOT NULL,
                category TEXT NOT NULL,
                xp_reward INTEGER NOT NULL,
                coin_reward INTEGER NOT NULL,
                options TEXT NOT NULL DEFAULT '[]',
                correct_answer TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                rarity TEXT NOT NULL,
                category TEXT NOT NULL,
                UNIQUE(name, rarity, category)
            );

            CREATE TABLE IF NOT EXISTS user_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                item_id INTEGER NOT NULL REFERENCES items(id),
                acquired_at TEXT NOT NULL,
                source TEXT NOT NULL,
                equipped INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS market_listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seller_id INTEGER NOT NULL REFERENCES users(id),
                item_id INTEGER NOT NULL REFERENCES items(id),
                price INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                listed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS business_metrics (
                user_id INTEGER PRIMARY KEY REFERENCES users(id),
                business_name TEXT,
                industry TEXT,
                monthly_revenue INTEGER,
                short_term_goals TEXT,
                challenges TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_user_milestones_user ON user_milestones(user_id);
            CREATE INDEX IF NOT EXISTS idx_user_milestones_milestone ON user_milestones(milestone_id);
            CREATE INDEX IF NOT EXISTS idx_daily_challenges_user ON daily_challenges(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_user_items_user ON user_items(user_id);
            CREATE INDEX IF NOT EXISTS idx_market_listings_active ON market_listings(active);
            "#,
        )?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn create_user(
        &self,
        username: &str,
        profile: &BusinessProfile,
        starting_dreamcoins: u64,
    ) -> EngineResult<User> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO users (username, dreamcoins, industry, stage, experience, goals, skill_levels)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                username,
                starting_dreamcoins as i64,
                profile.industry,
                profile.stage.as_str(),
                profile.experience.as_str(),
                serde_json::to_string(&profile.goals).unwrap_or_else(|_| "[]".into()),
                serde_json::to_string(&profile.skill_levels).unwrap_or_else(|_| "{}".into()),
            ],
        )?;

        let id = conn.last_insert_rowid();
        fetch_user(&conn, id)
    }

    pub fn user(&self, user_id: i64) -> EngineResult<User> {
        let conn = self.conn.lock().unwrap();
        fetch_user(&conn, user_id)
    }

    pub fn upsert_metrics(&self, user_id: i64, metrics: &MetricsSnapshot) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO business_metrics (user_id, business_name, industry, monthly_revenue, short_term_goals, challenges)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                business_name = excluded.business_name,
                industry = excluded.industry,
                monthly_revenue = excluded.monthly_revenue,
                short_term_goals = excluded.short_term_goals,
                challenges = excluded.challenges
            "#,
            params![
                user_id,
                metrics.business_name,
                metrics.industry,
                metrics.monthly_revenue.map(|v| v as i64),
                metrics.short_term_goals,
                metrics.challenges,
            ],
        )?;
        Ok(())
    }

    pub fn metrics(&self, user_id: i64) -> EngineResult<Option<MetricsSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let snapshot = conn
            .query_row(
                "SELECT business_name, industry, monthly_revenue, short_term_goals, challenges
                 FROM business_metrics WHERE user_id = ?",
                params![user_id],
                |row| {
                    Ok(MetricsSnapshot {
                        business_name: row.get(0)?,
                        industry: row.get(1)?,
                        monthly_revenue: row.get::<_, Option<i64>>(2)?.map(|v| v as u64),
                        short_term_goals: row.get(3)?,
                        challenges: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    pub fn leaderboard_by_xp(&self, limit: u32) -> EngineResult<Vec<User>> {
        self.leaderboard("xp", limit)
    }

    pub fn leaderboard_by_dreamcoins(&self, limit: u32) -> EngineResult<Vec<User>> {
        self.leaderboard("dreamcoins", limit)
    }

    fn leaderboard(&self, order_column: &str, limit: u32) -> EngineResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY {} DESC, id ASC LIMIT ?",
            order_column
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], user_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------
    // Milestones
    // ------------------------------------------------------------------

    pub fn milestone(&self, milestone_id: i64) -> EngineResult<Milestone> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = ?"),
            params![milestone_id],
            milestone_from_row,
        )
        .optional()?
        .ok_or_else(|| EngineError::not_found(format!("milestone {}", milestone_id)))
    }

    /// Milestones in the user's current batch, in batch order.
    pub fn milestones_for_user(&self, user_id: i64) -> EngineResult<Vec<Milestone>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MILESTONE_COLUMNS_M} FROM milestones m
             JOIN user_milestones um ON um.milestone_id = m.id
             WHERE um.user_id = ?
             ORDER BY m.sort_order, m.id"
        ))?;
        let rows = stmt.query_map(params![user_id], milestone_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn progress_rows(&self, user_id: i64) -> EngineResult<Vec<UserMilestone>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_MILESTONE_COLUMNS} FROM user_milestones WHERE user_id = ? ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![user_id], user_milestone_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Insert a milestone without linking it to anyone. Seeded content and
    /// tests use this; generated batches go through [`replace_daily_batch`].
    ///
    /// [`replace_daily_batch`]: Store::replace_daily_batch
    pub fn seed_milestone(&self, milestone: &GeneratedMilestone) -> EngineResult<Milestone> {
        let conn = self.conn.lock().unwrap();
        let id = insert_milestone(&conn, milestone)?;
        conn.query_row(
            &format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = ?"),
            params![id],
            milestone_from_row,
        )
        .map_err(EngineError::from)
    }

    /// Add an existing milestone to a user's batch as an incomplete entry.
    pub fn attach_milestone(
        &self,
        user_id: i64,
        milestone_id: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_milestones (user_id, milestone_id, completed, created_at)
             VALUES (?, ?, 0, ?)",
            params![user_id, milestone_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Swap in a freshly generated batch for the user and stamp the
    /// generation time. Cleans up the user's never-attempted AI-generated
    /// entries first, then any AI-generated milestone rows nobody references
    /// anymore; rows completed by *other* users are left alone.
    pub fn replace_daily_batch(
        &self,
        user_id: i64,
        batch: &[GeneratedMilestone],
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Milestone>> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let dropped_progress = tx.execute(
            r#"
            DELETE FROM user_milestones
            WHERE user_id = ?1
              AND completed = 0
              AND milestone_id IN (
                  SELECT m.id FROM milestones m
                  WHERE m.ai_generated = 1
                    AND NOT EXISTS (
                        SELECT 1 FROM user_milestones other
                        WHERE other.milestone_id = m.id
                          AND other.user_id != ?1
                          AND other.completed = 1
                    )
              )
            "#,
            params![user_id],
        )?;

        let dropped_milestones = tx.execute(
            "DELETE FROM milestones
             WHERE ai_generated = 1
               AND id NOT IN (SELECT milestone_id FROM user_milestones)",
            [],
        )?;

        let mut inserted = Vec::with_capacity(batch.len());
        for generated in batch {
            let id = insert_milestone(&tx, generated)?;
            tx.execute(
                "INSERT INTO user_milestones (user_id, milestone_id, completed, created_at)
                 VALUES (?, ?, 0, ?)",
                params![user_id, id, now.to_rfc3339()],
            )?;
            inserted.push(tx.query_row(
                &format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = ?"),
                params![id],
                milestone_from_row,
            )?);
        }

        tx.execute(
            "UPDATE users SET last_milestone_generation = ? WHERE id = ?",
            params![now.to_rfc3339(), user_id],
        )?;

        tx.commit()?;

        info!(
            user_id,
            batch = inserted.len(),
            dropped_progress,
            dropped_milestones,
            "replaced daily milestone batch"
        );
        Ok(inserted)
    }

    pub fn completion_stats(&self, user_id: i64) -> EngineResult<CompletionStats> {
        let conn = self.conn.lock().unwrap();
        let (completed, avg_hours): (i64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*),
                    AVG((julianday(completed_at) - julianday(created_at)) * 24.0)
             FROM user_milestones
             WHERE user_id = ? AND completed = 1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(CompletionStats {
            completed: completed as u32,
            avg_completion_hours: avg_hours,
        })
    }

    pub fn daily_counts(&self, user_id: i64, now: DateTime<Utc>) -> EngineResult<DailyCounts> {
        let conn = self.conn.lock().unwrap();
        daily_counts_inner(&conn, user_id, now)
    }

    /// Mark a milestone completed and apply its rewards, all in one
    /// transaction: idempotency and quota checks, the optional item award,
    /// the XP/level/coin update and the current-milestone advance either all
    /// land or none do.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_milestone(
        &self,
        user_id: i64,
        milestone: &Milestone,
        reflection: Option<String>,
        field_values: &BTreeMap<String, String>,
        reward: Option<AwardedItem>,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> EngineResult<(UserMilestone, User)> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let existing: Option<(i64, bool)> = tx
            .query_row(
                "SELECT id, completed FROM user_milestones WHERE user_id = ? AND milestone_id = ?",
                params![user_id, milestone.id],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?;

        if matches!(existing, Some((_, true))) {
            return Err(EngineError::Conflict(ConflictReason::AlreadyCompleted));
        }

        let counts = daily_counts_inner(&tx, user_id, now)?;
        if counts.completed >= config.daily_completion_limit {
            return Err(EngineError::Conflict(ConflictReason::DailyLimitReached));
        }
        if milestone.kind.is_boss() && counts.boss_completed >= config.daily_boss_limit {
            return Err(EngineError::Conflict(ConflictReason::BossLimitReached));
        }

        if let Some(awarded) = &reward {
            let item_id = find_or_insert_item(&tx, &awarded.spec)?;
            tx.execute(
                "INSERT INTO user_items (user_id, item_id, acquired_at, source, equipped)
                 VALUES (?, ?, ?, ?, 0)",
                params![
                    user_id,
                    item_id,
                    awarded.acquired_at.to_rfc3339(),
                    ItemSource::BossBattle.as_str()
                ],
            )?;
        }

        let reward_json = reward
            .as_ref()
            .map(|r| serde_json::to_string(r).unwrap_or_else(|_| "null".into()));
        let fields_json =
            serde_json::to_string(field_values).unwrap_or_else(|_| "{}".into());

        let progress_id = match existing {
            Some((id, _)) => {
                tx.execute(
                    "UPDATE user_milestones
                     SET completed = 1, completed_at = ?, reflection = ?, field_values = ?, reward = ?
                     WHERE id = ?",
                    params![now.to_rfc3339(), reflection, fields_json, reward_json, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO user_milestones
                     (user_id, milestone_id, completed, created_at, completed_at, reflection, field_values, reward)
                     VALUES (?, ?, 1, ?, ?, ?, ?, ?)",
                    params![
                        user_id,
                        milestone.id,
                        now.to_rfc3339(),
                        now.to_rfc3339(),
                        reflection,
                        fields_json,
                        reward_json
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        let user = fetch_user(&tx, user_id)?;
        let new_xp = user.xp + milestone.xp_reward;
        let new_coins = user.dreamcoins + milestone.coin_reward;

        let next_milestone: Option<i64> = tx
            .query_row(
                "SELECT m.id FROM milestones m
                 JOIN user_milestones um ON um.milestone_id = m.id
                 WHERE um.user_id = ? AND um.completed = 0
                 ORDER BY m.sort_order, m.id LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "UPDATE users SET xp = ?, level = ?, dreamcoins = ?, current_milestone_id = ? WHERE id = ?",
            params![
                new_xp as i64,
                level_for_xp(new_xp) as i64,
                new_coins as i64,
                next_milestone,
                user_id
            ],
        )?;

        let progress = tx.query_row(
            &format!("SELECT {USER_MILESTONE_COLUMNS} FROM user_milestones WHERE id = ?"),
            params![progress_id],
            user_milestone_from_row,
        )?;
        let user = fetch_user(&tx, user_id)?;

        tx.commit()?;
        Ok((progress, user))
    }

    // ------------------------------------------------------------------
    // Daily challenges
    // ------------------------------------------------------------------

    pub fn challenges_for_day(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<DailyChallenge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM daily_challenges
             WHERE user_id = ? AND created_at >= ?
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(
            params![user_id, day_start(now).to_rfc3339()],
            challenge_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Persist a day's selection and update the user's rolling history in the
    /// same transaction (replacing it entirely when the selector reset it).
    pub fn insert_daily_challenges(
        &self,
        user_id: i64,
        selection: &ChallengeSelection,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<DailyChallenge>> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let mut inserted = Vec::with_capacity(selection.challenges.len());
        for challenge in &selection.challenges {
            tx.execute(
                "INSERT INTO daily_challenges
                 (user_id, description, kind, category, xp_reward, coin_reward, options, correct_answer, completed, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
                params![
                    user_id,
                    challenge.description,
                    challenge.kind.as_str(),
                    challenge.category,
                    challenge.xp_reward as i64,
                    challenge.coin_reward as i64,
                    serde_json::to_string(&challenge.options).unwrap_or_else(|_| "[]".into()),
                    challenge.correct_answer,
                    now.to_rfc3339(),
                ],
            )?;
            let id = tx.last_insert_rowid();
            inserted.push(tx.query_row(
                &format!("SELECT {CHALLENGE_COLUMNS} FROM daily_challenges WHERE id = ?"),
                params![id],
                challenge_from_row,
            )?);
        }

        let descriptions: Vec<String> = selection
            .challenges
            .iter()
            .map(|c| c.description.clone())
            .collect();
        let history = if selection.history_reset {
            descriptions
        } else {
            let current: String = tx.query_row(
                "SELECT challenge_history FROM users WHERE id = ?",
                params![user_id],
                |row| row.get(0),
            )?;
            let mut history: Vec<String> = serde_json::from_str(&current).unwrap_or_default();
            history.extend(descriptions);
            history
        };

        tx.execute(
            "UPDATE users SET challenge_history = ? WHERE id = ?",
            params![
                serde_json::to_string(&history).unwrap_or_else(|_| "[]".into()),
                user_id
            ],
        )?;

        tx.commit()?;
        Ok(inserted)
    }

    pub fn complete_challenge(
        &self,
        user_id: i64,
        challenge_id: i64,
        answer: Option<&str>,
    ) -> EngineResult<(DailyChallenge, User)> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let challenge = tx
            .query_row(
                &format!(
                    "SELECT {CHALLENGE_COLUMNS} FROM daily_challenges WHERE id = ? AND user_id = ?"
                ),
                params![challenge_id, user_id],
                challenge_from_row,
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found(format!("challenge {}", challenge_id)))?;

        if challenge.completed {
            return Err(EngineError::Conflict(ConflictReason::AlreadyCompleted));
        }
        if challenge.kind == ChallengeKind::Quiz
            && challenge.correct_answer.as_deref() != answer
        {
            return Err(EngineError::Conflict(ConflictReason::IncorrectAnswer));
        }

        tx.execute(
            "UPDATE daily_challenges SET completed = 1 WHERE id = ?",
            params![challenge_id],
        )?;

        let user = fetch_user(&tx, user_id)?;
        let new_xp = user.xp + challenge.xp_reward;
        tx.execute(
            "UPDATE users SET xp = ?, level = ?, dreamcoins = ? WHERE id = ?",
            params![
                new_xp as i64,
                level_for_xp(new_xp) as i64,
                (user.dreamcoins + challenge.coin_reward) as i64,
                user_id
            ],
        )?;

        let challenge = tx.query_row(
            &format!("SELECT {CHALLENGE_COLUMNS} FROM daily_challenges WHERE id = ?"),
            params![challenge_id],
            challenge_from_row,
        )?;
        let user = fetch_user(&tx, user_id)?;

        tx.commit()?;
        Ok((challenge, user))
    }

    // ------------------------------------------------------------------
    // Daily reward
    // ------------------------------------------------------------------

    /// Claim the daily reward. One claim per UTC calendar day; consecutive
    /// days build the streak, a gap resets it.
    pub fn claim_daily_reward(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> EngineResult<(DailyRewardGrant, User)> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let user = fetch_user(&tx, user_id)?;
        let today = now.date_naive();

        if user
            .last_reward_claim
            .is_some_and(|claimed| claimed.date_naive() == today)
        {
            return Err(EngineError::Conflict(ConflictReason::RewardNotReady));
        }

        let streak = match user.last_reward_claim {
            Some(claimed) if claimed.date_naive() == today - Duration::days(1) => {
                user.login_streak + 1
            }
            _ => 1,
        };

        let bonus = config.streak_bonus_percent(streak);
        let xp_gain =
            (config.daily_reward_base_xp as f64 * (1.0 + bonus as f64 / 100.0)).floor() as u64;
        let new_xp = user.xp + xp_gain;

        tx.execute(
            "UPDATE users SET xp = ?, level = ?, dreamcoins = ?, last_reward_claim = ?, login_streak = ? WHERE id = ?",
            params![
                new_xp as i64,
                level_for_xp(new_xp) as i64,
                (user.dreamcoins + config.daily_reward_coins) as i64,
                now.to_rfc3339(),
                streak as i64,
                user_id
            ],
        )?;

        let user = fetch_user(&tx, user_id)?;
        tx.commit()?;

        let grant = DailyRewardGrant {
            dreamcoins: config.daily_reward_coins,
            xp: xp_gain,
            login_streak: streak,
            streak_bonus_percent: bonus,
            next_claim_at: day_start(now) + Duration::days(1),
        };
        info!(user_id, streak, xp = xp_gain, "daily reward claimed");
        Ok((grant, user))
    }

    // ------------------------------------------------------------------
    // Items & marketplace
    // ------------------------------------------------------------------

    /// Hand an item to a user, lazily inserting the catalog row.
    pub fn grant_item(
        &self,
        user_id: i64,
        spec: &ItemSpec,
        source: ItemSource,
        now: DateTime<Utc>,
    ) -> EngineResult<UserItem> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let item_id = find_or_insert_item(&tx, spec)?;
        tx.execute(
            "INSERT INTO user_items (user_id, item_id, acquired_at, source, equipped)
             VALUES (?, ?, ?, ?, 0)",
            params![user_id, item_id, now.to_rfc3339(), source.as_str()],
        )?;
        let id = tx.last_insert_rowid();
        let user_item = tx.query_row(
            &format!("SELECT {USER_ITEM_COLUMNS} FROM user_items WHERE id = ?"),
            params![id],
            user_item_from_row,
        )?;

        tx.commit()?;
        Ok(user_item)
    }

    pub fn inventory(&self, user_id: i64) -> EngineResult<Vec<(UserItem, Item)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT ui.id, ui.user_id, ui.item_id, ui.acquired_at, ui.source, ui.equipped,
                    i.id, i.name, i.description, i.rarity, i.category
             FROM user_items ui
             JOIN items i ON i.id = ui.item_id
             WHERE ui.user_id = ?
             ORDER BY ui.id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((user_item_from_row(row)?, item_from_row_offset(row, 6)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn active_listings(&self) -> EngineResult<Vec<(MarketListing, Item)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT l.id, l.seller_id, l.item_id, l.price, l.active, l.listed_at,
                    i.id, i.name, i.description, i.rarity, i.category
             FROM market_listings l
             JOIN items i ON i.id = l.item_id
             WHERE l.active = 1
             ORDER BY l.listed_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((listing_from_row(row)?, item_from_row_offset(row, 6)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Create a listing and remove the seller's copy, atomically.
    pub fn list_item(
        &self,
        user_id: i64,
        item_id: i64,
        price: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<MarketListing> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let owned: Option<i64> = tx
            .query_row(
                "SELECT id FROM user_items WHERE user_id = ? AND item_id = ? LIMIT 1",
                params![user_id, item_id],
                |row| row.get(0),
            )
            .optional()?;
        let user_item_id =
            owned.ok_or_else(|| EngineError::not_found(format!("item {} in inventory", item_id)))?;

        tx.execute(
            "INSERT INTO market_listings (seller_id, item_id, price, active, listed_at)
             VALUES (?, ?, ?, 1, ?)",
            params![user_id, item_id, price as i64, now.to_rfc3339()],
        )?;
        let listing_id = tx.last_insert_rowid();

        tx.execute("DELETE FROM user_items WHERE id = ?", params![user_item_id])?;

        let listing = tx.query_row(
            &format!("SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = ?"),
            params![listing_id],
            listing_from_row,
        )?;

        tx.commit()?;
        info!(user_id, item_id, price, listing_id, "item listed on market");
        Ok(listing)
    }

    /// Transfer coins and ownership for a sale, atomically.
    pub fn buy_listing(
        &self,
        listing_id: i64,
        buyer_id: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<(MarketListing, User)> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let listing = tx
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = ?"),
                params![listing_id],
                listing_from_row,
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found(format!("listing {}", listing_id)))?;

        if !listing.active {
            return Err(EngineError::Conflict(ConflictReason::ListingInactive));
        }

        let buyer = fetch_user(&tx, buyer_id)?;
        if buyer.dreamcoins < listing.price {
            return Err(EngineError::Conflict(ConflictReason::InsufficientFunds));
        }

        tx.execute(
            "UPDATE users SET dreamcoins = dreamcoins - ? WHERE id = ?",
            params![listing.price as i64, buyer_id],
        )?;
        tx.execute(
            "UPDATE users SET dreamcoins = dreamcoins + ? WHERE id = ?",
            params![listing.price as i64, listing.seller_id],
        )?;
        tx.execute(
            "UPDATE market_listings SET active = 0 WHERE id = ?",
            params![listing_id],
        )?;
        tx.execute(
            "INSERT INTO user_items (user_id, item_id, acquired_at, source, equipped)
             VALUES (?, ?, ?, ?, 0)",
            params![
                buyer_id,
                listing.item_id,
                now.to_rfc3339(),
                ItemSource::MarketPurchase.as_str()
            ],
        )?;

        let listing = tx.query_row(
            &format!("SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = ?"),
            params![listing_id],
            listing_from_row,
        )?;
        let buyer = fetch_user(&tx, buyer_id)?;

        tx.commit()?;
        info!(listing_id, buyer_id, price = listing.price, "market sale settled");
        Ok((listing, buyer))
    }

    /// Deactivate a listing and return the item to its seller, atomically.
    pub fn unlist_item(
        &self,
        listing_id: i64,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<MarketListing> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let listing = tx
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = ?"),
                params![listing_id],
                listing_from_row,
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found(format!("listing {}", listing_id)))?;

        if !listing.active {
            return Err(EngineError::Conflict(ConflictReason::ListingInactive));
        }
        if listing.seller_id != owner_id {
            return Err(EngineError::Conflict(ConflictReason::NotOwner));
        }

        tx.execute(
            "UPDATE market_listings SET active = 0 WHERE id = ?",
            params![listing_id],
        )?;
        tx.execute(
            "INSERT INTO user_items (user_id, item_id, acquired_at, source, equipped)
             VALUES (?, ?, ?, ?, 0)",
            params![
                owner_id,
                listing.item_id,
                now.to_rfc3339(),
                ItemSource::MarketUnlisted.as_str()
            ],
        )?;

        let listing = tx.query_row(
            &format!("SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = ?"),
            params![listing_id],
            listing_from_row,
        )?;

        tx.commit()?;
        info!(listing_id, owner_id, "listing withdrawn");
        Ok(listing)
    }

    /// Toggle an item's equipped flag; equipping unequips everything else the
    /// user has on.
    pub fn toggle_equipped(&self, user_id: i64, user_item_id: i64) -> EngineResult<UserItem> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let equipped: Option<bool> = tx
            .query_row(
                "SELECT equipped FROM user_items WHERE id = ? AND user_id = ?",
                params![user_item_id, user_id],
                |row| Ok(row.get::<_, i64>(0)? != 0),
            )
            .optional()?;
        let equipped = equipped
            .ok_or_else(|| EngineError::not_found(format!("inventory item {}", user_item_id)))?;

        tx.execute(
            "UPDATE user_items SET equipped = 0 WHERE user_id = ? AND id != ?",
            params![user_id, user_item_id],
        )?;
        tx.execute(
            "UPDATE user_items SET equipped = ? WHERE id = ?",
            params![!equipped, user_item_id],
        )?;

        let user_item = tx.query_row(
            &format!("SELECT {USER_ITEM_COLUMNS} FROM user_items WHERE id = ?"),
            params![user_item_id],
            user_item_from_row,
        )?;

        tx.commit()?;
        Ok(user_item)
    }
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

const USER_COLUMNS: &str = "id, username, xp, level, dreamcoins, industry, stage, experience, \
     goals, skill_levels, challenge_history, last_milestone_generation, current_milestone_id, \
     last_reward_claim, login_streak";

const MILESTONE_COLUMNS: &str = "id, title, description, kind, category, difficulty, \
     estimated_duration, xp_reward, coin_reward, requirements, ai_generated, sort_order";

const MILESTONE_COLUMNS_M: &str = "m.id, m.title, m.description, m.kind, m.category, \
     m.difficulty, m.estimated_duration, m.xp_reward, m.coin_reward, m.requirements, \
     m.ai_generated, m.sort_order";

const USER_MILESTONE_COLUMNS: &str =
    "id, user_id, milestone_id, completed, created_at, completed_at, reflection, field_values, reward";

const CHALLENGE_COLUMNS: &str = "id, user_id, description, kind, category, xp_reward, \
     coin_reward, options, correct_answer, completed, created_at";

const USER_ITEM_COLUMNS: &str = "id, user_id, item_id, acquired_at, source, equipped";

const LISTING_COLUMNS: &str = "id, seller_id, item_id, price, active, listed_at";

fn fetch_user(conn: &Connection, user_id: i64) -> EngineResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        params![user_id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found(format!("user {}", user_id)))
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        xp: row.get::<_, i64>(2)? as u64,
        level: row.get::<_, i64>(3)? as u32,
        dreamcoins: row.get::<_, i64>(4)? as u64,
        profile: BusinessProfile {
            industry: row.get(5)?,
            stage: BusinessStage::from_str(&row.get::<_, String>(6)?),
            experience: ExperienceLevel::from_str(&row.get::<_, String>(7)?),
            goals: serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
            skill_levels: serde_json::from_str(&row.get::<_, String>(9)?).unwrap_or_default(),
        },
        challenge_history: serde_json::from_str(&row.get::<_, String>(10)?).unwrap_or_default(),
        last_milestone_generation: parse_opt_timestamp(row.get(11)?),
        current_milestone_id: row.get(12)?,
        last_reward_claim: parse_opt_timestamp(row.get(13)?),
        login_streak: row.get::<_, i64>(14)? as u32,
    })
}

fn milestone_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Milestone> {
    let kind = MilestoneKind::from_str(&row.get::<_, String>(3)?);
    let requirements_json: String = row.get(9)?;
    let requirements =
        serde_json::from_str(&requirements_json).unwrap_or_else(|e| {
            warn!("unreadable requirements on milestone row, defaulting: {}", e);
            MilestoneRequirements::Task { fields: Vec::new() }
        });

    Ok(Milestone {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        kind,
        category: row.get(4)?,
        difficulty: row.get::<_, i64>(5)? as u8,
        estimated_duration: row.get(6)?,
        xp_reward: row.get::<_, i64>(7)? as u64,
        coin_reward: row.get::<_, i64>(8)? as u64,
        requirements,
        ai_generated: row.get::<_, i64>(10)? != 0,
        sort_order: row.get::<_, i64>(11)? as u32,
    })
}

fn user_milestone_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserMilestone> {
    let reward: Option<String> = row.get(8)?;
    Ok(UserMilestone {
        id: row.get(0)?,
        user_id: row.get(1)?,
        milestone_id: row.get(2)?,
        completed: row.get::<_, i64>(3)? != 0,
        created_at: parse_timestamp(&row.get::<_, String>(4)?),
        completed_at: parse_opt_timestamp(row.get(5)?),
        reflection: row.get(6)?,
        field_values: serde_json::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
        reward: reward.and_then(|json| serde_json::from_str(&json).ok()),
    })
}

fn challenge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyChallenge> {
    Ok(DailyChallenge {
        id: row.get(0)?,
        user_id: row.get(1)?,
        description: row.get(2)?,
        kind: ChallengeKind::from_str(&row.get::<_, String>(3)?),
        category: row.get(4)?,
        xp_reward: row.get::<_, i64>(5)? as u64,
        coin_reward: row.get::<_, i64>(6)? as u64,
        options: serde_json::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
        correct_answer: row.get(8)?,
        completed: row.get::<_, i64>(9)? != 0,
        created_at: parse_timestamp(&row.get::<_, String>(10)?),
    })
}

fn user_item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserItem> {
    Ok(UserItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        item_id: row.get(2)?,
        acquired_at: parse_timestamp(&row.get::<_, String>(3)?),
        source: ItemSource::from_str(&row.get::<_, String>(4)?),
        equipped: row.get::<_, i64>(5)? != 0,
    })
}

fn item_from_row_offset(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(offset)?,
        spec: ItemSpec {
            name: row.get(offset + 1)?,
            description: row.get(offset + 2)?,
            rarity: venture_common::schemas::Rarity::from_str(
                &row.get::<_, String>(offset + 3)?,
            ),
            category: venture_common::schemas::ItemCategory::from_str(
                &row.get::<_, String>(offset + 4)?,
            ),
        },
    })
}

fn listing_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MarketListing> {
    Ok(MarketListing {
        id: row.get(0)?,
        seller_id: row.get(1)?,
        item_id: row.get(2)?,
        price: row.get::<_, i64>(3)? as u64,
        active: row.get::<_, i64>(4)? != 0,
        listed_at: parse_timestamp(&row.get::<_, String>(5)?),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn insert_milestone(conn: &Connection, milestone: &GeneratedMilestone) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO milestones
         (title, description, kind, category, difficulty, estimated_duration, xp_reward, coin_reward, requirements, ai_generated, sort_order)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            milestone.title,
            milestone.description,
            milestone.kind.as_str(),
            milestone.category,
            milestone.difficulty as i64,
            milestone.estimated_duration,
            milestone.xp_reward as i64,
            milestone.coin_reward as i64,
            serde_json::to_string(&milestone.requirements)
                .unwrap_or_else(|_| r#"{"kind":"task","fields":[]}"#.into()),
            milestone.ai_generated,
            milestone.sort_order as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn find_or_insert_item(tx: &Transaction<'_>, spec: &ItemSpec) -> EngineResult<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM items WHERE name = ? AND rarity = ? AND category = ?",
            params![spec.name, spec.rarity.as_str(), spec.category.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    tx.execute(
        "INSERT INTO items (name, description, rarity, category) VALUES (?, ?, ?, ?)",
        params![
            spec.name,
            spec.description,
            spec.rarity.as_str(),
            spec.category.as_str()
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn daily_counts_inner(conn: &Connection, user_id: i64, now: DateTime<Utc>) -> EngineResult<DailyCounts> {
    let (completed, boss_completed): (i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN m.kind = 'boss_battle' THEN 1 ELSE 0 END), 0)
         FROM user_milestones um
         JOIN milestones m ON m.id = um.milestone_id
         WHERE um.user_id = ? AND um.completed = 1 AND um.completed_at >= ?",
        params![user_id, day_start(now).to_rfc3339()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(DailyCounts {
        completed: completed as u32,
        boss_completed: boss_completed as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("venture.db");

        let profile = BusinessProfile::default();
        let id = {
            let store = Store::open(&path).unwrap();
            store.create_user("founder", &profile, 1000).unwrap().id
        };

        let store = Store::open(&path).unwrap();
        let user = store.user(id).unwrap();
        assert_eq!(user.username, "founder");
        assert_eq!(user.dreamcoins, 1000);
        assert_eq!(user.level, 1);
        assert!(user.last_milestone_generation.is_none());
    }

    #[test]
    fn test_duplicate_usernames_are_rejected() {
        let store = Store::open_in_memory().unwrap();
        let profile = BusinessProfile::default();
        store.create_user("founder", &profile, 0).unwrap();
        assert!(matches!(
            store.create_user("founder", &profile, 0),
            Err(EngineError::Persistence(_))
        ));
    }

    #[test]
    fn test_missing_user_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(store.user(7), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_metrics_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let user = store
            .create_user("founder", &BusinessProfile::default(), 0)
            .unwrap();

        assert_eq!(store.metrics(user.id).unwrap(), None);

        let snapshot = MetricsSnapshot {
            business_name: Some("Acme".into()),
            industry: Some("ecommerce".into()),
            monthly_revenue: Some(12_000),
            short_term_goals: Some("double conversion".into()),
            challenges: Some("cart abandonment".into()),
        };
        store.upsert_metrics(user.id, &snapshot).unwrap();
        assert_eq!(store.metrics(user.id).unwrap(), Some(snapshot.clone()));

        // Upsert replaces in place.
        let updated = MetricsSnapshot {
            monthly_revenue: Some(15_000),
            ..snapshot
        };
        store.upsert_metrics(user.id, &updated).unwrap();
        assert_eq!(
            store.metrics(user.id).unwrap().unwrap().monthly_revenue,
            Some(15_000)
        );
    }
}
