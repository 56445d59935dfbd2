//! Daily milestone batch generation.
//!
//! Builds one structured prompt per slot, sends it to the content-generation
//! collaborator and defensively parses the JSON it returns. A failed or
//! malformed call degrades that slot to fixed fallback content; the batch as
//! a whole never fails on the collaborator. No retries, to keep request
//! latency bounded.

use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use venture_common::llm::{ChatMessage, LlmClient};
use venture_common::personalization::Personalization;
use venture_common::rewards;
use venture_common::schemas::{BusinessProfile, MilestoneKind, MilestoneRequirements};

const TASK_BASE_XP: u64 = 100;
const TASK_BASE_COINS: u64 = 50;
const BOSS_BASE_XP: u64 = 500;
const BOSS_BASE_COINS: u64 = 250;

const BOSS_DESCRIPTION_SUFFIX: &str =
    "\n\nComplete this boss battle to earn XP, coins, and a mystical business item!";

const MENTOR_PERSONA: &str = "You are a data-driven business mentor inside a gamified \
entrepreneurship journey. You design one concrete, actionable milestone at a time, \
tailored to the founder's context. You respond with a single JSON object and nothing \
else: no prose, no markdown fences.";

/// A milestone ready to persist; ids are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMilestone {
    pub title: String,
    pub description: String,
    pub kind: MilestoneKind,
    pub category: String,
    pub difficulty: u8,
    pub estimated_duration: String,
    pub xp_reward: u64,
    pub coin_reward: u64,
    pub requirements: MilestoneRequirements,
    pub ai_generated: bool,
    /// 1-based position within the batch.
    pub sort_order: u32,
}

#[derive(Debug, Deserialize)]
struct MilestoneContent {
    title: String,
    description: String,
    category: String,
    #[serde(default)]
    fields: Vec<String>,
}

pub struct MilestoneGenerator {
    llm: Arc<dyn LlmClient>,
}

impl MilestoneGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Generate a day's batch. The final slot is always the boss battle;
    /// ordinary slots escalate in duration and reward.
    pub fn generate_batch<R: Rng + ?Sized>(
        &self,
        profile: &BusinessProfile,
        personalization: &Personalization,
        count: usize,
        rng: &mut R,
    ) -> Vec<GeneratedMilestone> {
        let mut batch = Vec::with_capacity(count);

        for slot in 0..count {
            let phase = slot + 1;
            let is_boss = phase == count;
            let content = self.slot_content(phase, count, profile, personalization, is_boss);

            let (base_xp, base_coins) = if is_boss {
                (BOSS_BASE_XP, BOSS_BASE_COINS)
            } else {
                (TASK_BASE_XP, TASK_BASE_COINS)
            };
            let difficulty = personalization.difficulty;
            let slot_multiplier = 1.0 + slot as f64 * 0.2;

            let requirements = if is_boss {
                MilestoneRequirements::BossBattle {
                    fields: content.fields,
                    // Preview only; the awarded item is rolled again at
                    // completion time.
                    reward_preview: rewards::roll_item(rng).to_spec(),
                }
            } else {
                MilestoneRequirements::Task {
                    fields: content.fields,
                }
            };

            batch.push(GeneratedMilestone {
                title: content.title,
                description: content.description,
                kind: if is_boss {
                    MilestoneKind::BossBattle
                } else {
                    MilestoneKind::Task
                },
                category: content.category,
                difficulty,
                estimated_duration: if is_boss {
                    "2h".to_string()
                } else {
                    format!("{}min", 30 + slot * 15)
                },
                xp_reward: scaled(base_xp, difficulty, slot_multiplier),
                coin_reward: scaled(base_coins, difficulty, slot_multiplier),
                requirements,
                ai_generated: true,
                sort_order: phase as u32,
            });
        }

        batch
    }

    fn slot_content(
        &self,
        phase: usize,
        total: usize,
        profile: &BusinessProfile,
        personalization: &Personalization,
        is_boss: bool,
    ) -> MilestoneContent {
        let messages = build_messages(phase, total, profile, personalization, is_boss);

        let content = match self.llm.chat(&messages) {
            Ok(text) => match parse_content(&text) {
                Some(content) => Some(content),
                None => {
                    warn!(phase, "milestone content was not valid JSON, using fallback");
                    None
                }
            },
            Err(e) => {
                warn!(phase, error = %e, "content generation failed, using fallback");
                None
            }
        };

        match content {
            Some(content) if is_boss => MilestoneContent {
                title: format!("Boss Battle: {}", content.title),
                description: format!("{}{}", content.description, BOSS_DESCRIPTION_SUFFIX),
                ..content
            },
            Some(content) => content,
            None => fallback_content(profile, is_boss),
        }
    }
}

fn scaled(base: u64, difficulty: u8, slot_multiplier: f64) -> u64 {
    ((base * difficulty as u64) as f64 * slot_multiplier).round() as u64
}

fn build_messages(
    phase: usize,
    total: usize,
    profile: &BusinessProfile,
    personalization: &Personalization,
    is_boss: bool,
) -> Vec<ChatMessage> {
    let ctx = &personalization.industry_context;
    let industry = if ctx.key_terminology.is_empty() {
        profile.industry.clone().unwrap_or_else(|| "general".into())
    } else {
        format!("focusing on {}", ctx.key_terminology.join(", "))
    };
    let focus = &personalization.focus_areas;
    let rotating_focus = focus
        .get(phase % focus.len().max(1))
        .map(String::as_str)
        .unwrap_or("fundamentals");

    let prompt = format!(
        "Generate a unique {difficulty}/5 difficulty business milestone {flavor} for phase {phase} of {total}.\n\
         \n\
         Context:\n\
         - Industry: {industry}\n\
         - Business Stage: {stage}\n\
         - Experience Level: {experience}\n\
         - Primary Goals: {goals}\n\
         - Focus Areas: {focus_areas}\n\
         - Industry-Specific Goals: {industry_goals}\n\
         - Key Metrics to Track: {metrics}\n\
         \n\
         Make this milestone distinct from earlier phases by:\n\
         1. Covering a different aspect of {rotating_focus}\n\
         2. Progressive complexity ({phase}/{total} progression)\n\
         3. Building on the skills of previous phases\n\
         4. Using industry-specific metrics and terminology\n\
         \n\
         Respond as JSON:\n\
         {{\"title\": \"string\", \"description\": \"string\", \"category\": \"string\", \"fields\": [\"string\"]}}",
        difficulty = personalization.difficulty,
        flavor = if is_boss { "boss battle" } else { "task" },
        phase = phase,
        total = total,
        industry = industry,
        stage = profile.stage.as_str(),
        experience = profile.experience.as_str(),
        goals = join_or(&profile.goals, "not specified"),
        focus_areas = join_or(focus, "fundamentals"),
        industry_goals = join_or(&ctx.industry_goals, "none"),
        metrics = join_or(&ctx.relevant_metrics, "none"),
        rotating_focus = rotating_focus,
    );

    vec![ChatMessage::system(MENTOR_PERSONA), ChatMessage::user(prompt)]
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

/// Parse collaborator output, tolerating markdown fences and surrounding
/// chatter but nothing structurally wrong.
fn parse_content(text: &str) -> Option<MilestoneContent> {
    let candidate = text.trim();

    let parsed = serde_json::from_str::<MilestoneContent>(candidate)
        .ok()
        .or_else(|| {
            // Some models wrap JSON in a fenced block or lead-in text.
            let start = candidate.find('{')?;
            let end = candidate.rfind('}')?;
            serde_json::from_str(&candidate[start..=end]).ok()
        })?;

    if parsed.title.trim().is_empty()
        || parsed.description.trim().is_empty()
        || parsed.category.trim().is_empty()
    {
        return None;
    }
    Some(parsed)
}

fn fallback_content(profile: &BusinessProfile, is_boss: bool) -> MilestoneContent {
    let industry = profile.industry.as_deref().unwrap_or("business");
    MilestoneContent {
        title: if is_boss {
            "Boss Battle: Industry Challenge".to_string()
        } else {
            "Business Development Task".to_string()
        },
        description: if is_boss {
            format!(
                "Complete key objectives for your {} venture and earn XP, coins, and a mystical business item!",
                industry
            )
        } else {
            format!("Complete key tasks for your {} venture", industry)
        },
        category: "development".to_string(),
        fields: vec![
            "planningDocument".to_string(),
            "implementation".to_string(),
            "results".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use venture_common::llm::{FakeLlmClient, LlmError};
    use venture_common::personalization::{personalize, PersonalizationInput};

    fn setup() -> (BusinessProfile, Personalization) {
        let profile = BusinessProfile {
            industry: Some("technology".into()),
            ..Default::default()
        };
        let personalization = personalize(&PersonalizationInput {
            profile: &profile,
            completed_milestones: 0,
            avg_completion_hours: None,
            metrics: None,
        });
        (profile, personalization)
    }

    fn valid_json() -> String {
        serde_json::json!({
            "title": "Validate pricing",
            "description": "Interview five prospects about willingness to pay",
            "category": "market_research",
            "fields": ["interviewNotes", "pricingSummary"]
        })
        .to_string()
    }

    #[test]
    fn test_batch_shape_and_escalation() {
        let (profile, personalization) = setup();
        let generator = MilestoneGenerator::new(Arc::new(FakeLlmClient::always(valid_json())));
        let mut rng = StdRng::seed_from_u64(1);

        let batch = generator.generate_batch(&profile, &personalization, 5, &mut rng);
        assert_eq!(batch.len(), 5);

        for (i, m) in batch.iter().take(4).enumerate() {
            assert_eq!(m.kind, MilestoneKind::Task);
            assert_eq!(m.estimated_duration, format!("{}min", 30 + i * 15));
            assert_eq!(m.sort_order as usize, i + 1);
        }
        let boss = &batch[4];
        assert_eq!(boss.kind, MilestoneKind::BossBattle);
        assert_eq!(boss.estimated_duration, "2h");
        assert!(boss.title.starts_with("Boss Battle: "));
        assert!(matches!(
            boss.requirements,
            MilestoneRequirements::BossBattle { .. }
        ));

        // Rewards escalate across task slots.
        for pair in batch[..4].windows(2) {
            assert!(pair[1].xp_reward > pair[0].xp_reward);
        }
        // difficulty 1: 100 XP base, slot 0 -> 100; boss 500 * 1.8 = 900.
        assert_eq!(batch[0].xp_reward, 100);
        assert_eq!(boss.xp_reward, 900);
        assert_eq!(boss.coin_reward, 450);
    }

    #[test]
    fn test_rewards_scale_with_difficulty() {
        let (profile, mut personalization) = setup();
        personalization.difficulty = 3;
        let generator = MilestoneGenerator::new(Arc::new(FakeLlmClient::always(valid_json())));
        let mut rng = StdRng::seed_from_u64(1);

        let batch = generator.generate_batch(&profile, &personalization, 5, &mut rng);
        assert_eq!(batch[0].xp_reward, 300);
        assert_eq!(batch[0].coin_reward, 150);
    }

    #[test]
    fn test_collaborator_failure_degrades_to_fallback() {
        let (profile, personalization) = setup();
        let generator = MilestoneGenerator::new(Arc::new(FakeLlmClient::always_error(
            LlmError::EmptyResponse,
        )));
        let mut rng = StdRng::seed_from_u64(1);

        let batch = generator.generate_batch(&profile, &personalization, 5, &mut rng);
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0].title, "Business Development Task");
        assert_eq!(batch[4].title, "Boss Battle: Industry Challenge");
        assert_eq!(batch[0].category, "development");
        assert_eq!(
            batch[0].requirements.fields(),
            &["planningDocument", "implementation", "results"]
        );
    }

    #[test]
    fn test_malformed_json_degrades_to_fallback() {
        let (profile, personalization) = setup();
        let generator = MilestoneGenerator::new(Arc::new(FakeLlmClient::always(
            "Sure! Here's a milestone for you.",
        )));
        let mut rng = StdRng::seed_from_u64(1);

        let batch = generator.generate_batch(&profile, &personalization, 5, &mut rng);
        assert!(batch.iter().all(|m| m.category == "development"));
    }

    #[test]
    fn test_parse_tolerates_fenced_json() {
        let fenced = format!("```json\n{}\n```", valid_json());
        let parsed = parse_content(&fenced).unwrap();
        assert_eq!(parsed.title, "Validate pricing");

        assert!(parse_content("").is_none());
        assert!(parse_content("{\"title\": \"\"}").is_none());
    }

    #[test]
    fn test_boss_preview_reward_is_attached() {
        let (profile, personalization) = setup();
        let generator = MilestoneGenerator::new(Arc::new(FakeLlmClient::always(valid_json())));
        let mut rng = StdRng::seed_from_u64(99);

        let batch = generator.generate_batch(&profile, &personalization, 5, &mut rng);
        match &batch[4].requirements {
            MilestoneRequirements::BossBattle { reward_preview, .. } => {
                assert!(!reward_preview.name.is_empty());
            }
            other => panic!("boss slot carried {:?}", other),
        }
    }
}
