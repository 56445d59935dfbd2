//! Personalization engine.
//!
//! Derives content difficulty, focus areas and industry context from a user's
//! profile and completion history. Deliberately a pure function of its inputs
//! so a learned or remote model can replace it without touching any caller.

use crate::schemas::{BusinessProfile, BusinessStage, ExperienceLevel};
use serde::{Deserialize, Serialize};

/// Skills below this level (1-5 scale) are treated as needing work.
pub const SKILL_COMPETENCY_THRESHOLD: u8 = 3;

const MAX_FOCUS_AREAS: usize = 4;
const MAX_WEAK_SKILL_AREAS: usize = 2;
/// Average completion under this many hours counts as "fast".
const FAST_COMPLETION_HOURS: f64 = 24.0;

const DEFAULT_FOCUS_AREAS: [&str; 3] = ["market_research", "financial_planning", "business_model"];

/// Latest self-reported business metrics, if the user filled them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub business_name: Option<String>,
    /// Overrides the profile industry when present.
    pub industry: Option<String>,
    pub monthly_revenue: Option<u64>,
    pub short_term_goals: Option<String>,
    pub challenges: Option<String>,
}

/// Everything the engine knows about a user that shapes their content.
#[derive(Debug, Clone)]
pub struct PersonalizationInput<'a> {
    pub profile: &'a BusinessProfile,
    pub completed_milestones: u32,
    /// Mean hours between a milestone entering the batch and its completion.
    /// `None` until the user has completed something.
    pub avg_completion_hours: Option<f64>,
    pub metrics: Option<&'a MetricsSnapshot>,
}

/// Industry-specific vocabulary fed into content generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryContext {
    pub industry_goals: Vec<String>,
    pub key_terminology: Vec<String>,
    pub relevant_metrics: Vec<String>,
}

/// The derived bundle used to shape generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personalization {
    /// 1-5.
    pub difficulty: u8,
    /// At most four, weakest skills first.
    pub focus_areas: Vec<String>,
    /// One suggested skill per focus area.
    pub suggested_skills: Vec<String>,
    pub industry_context: IndustryContext,
}

pub fn personalize(input: &PersonalizationInput) -> Personalization {
    let profile = input.profile;
    let difficulty = derive_difficulty(
        input.completed_milestones,
        input.avg_completion_hours,
        profile.experience,
    );
    let focus_areas = derive_focus_areas(profile);
    let suggested_skills = focus_areas.iter().map(|a| suggested_skill(a).to_string()).collect();

    let industry = input
        .metrics
        .and_then(|m| m.industry.as_deref())
        .or(profile.industry.as_deref());

    Personalization {
        difficulty,
        focus_areas,
        suggested_skills,
        industry_context: industry_context(industry),
    }
}

fn derive_difficulty(
    completed_milestones: u32,
    avg_completion_hours: Option<f64>,
    experience: ExperienceLevel,
) -> u8 {
    let mut difficulty: u8 = 1;
    if completed_milestones > 20 {
        difficulty += 1;
    }
    if completed_milestones > 50 {
        difficulty += 1;
    }
    if avg_completion_hours.is_some_and(|h| h < FAST_COMPLETION_HOURS) {
        difficulty += 1;
    }

    difficulty = (difficulty + experience.difficulty_bonus()).min(experience.difficulty_cap());
    difficulty.clamp(1, 5)
}

fn derive_focus_areas(profile: &BusinessProfile) -> Vec<String> {
    let mut areas: Vec<String> = Vec::new();

    // Weakest skills first. BTreeMap iteration keeps this deterministic.
    let weak: Vec<&String> = profile
        .skill_levels
        .iter()
        .filter(|(_, level)| **level < SKILL_COMPETENCY_THRESHOLD)
        .map(|(area, _)| area)
        .take(MAX_WEAK_SKILL_AREAS)
        .collect();
    areas.extend(weak.into_iter().cloned());

    let stage_defaults: [&str; 2] = match profile.stage {
        BusinessStage::Idea => ["market_research", "business_model"],
        BusinessStage::Planning => ["financial_planning", "go_to_market"],
        BusinessStage::Startup => ["growth_strategy", "operations"],
        BusinessStage::Established => ["optimization", "scaling"],
    };
    areas.extend(stage_defaults.iter().map(|s| s.to_string()));
    areas.extend(DEFAULT_FOCUS_AREAS.iter().map(|s| s.to_string()));

    let mut seen = std::collections::HashSet::new();
    areas.retain(|a| seen.insert(a.clone()));
    areas.truncate(MAX_FOCUS_AREAS);
    areas
}

fn suggested_skill(focus_area: &str) -> &'static str {
    match focus_area {
        "market_research" => "customer_research",
        "financial_planning" => "financial_analysis",
        "business_model" => "business_strategy",
        "growth_strategy" => "growth_hacking",
        "go_to_market" => "positioning",
        "operations" => "process_design",
        "optimization" => "data_analysis",
        "scaling" => "delegation",
        _ => "problem_solving",
    }
}

fn industry_context(industry: Option<&str>) -> IndustryContext {
    let (goals, terminology, metrics): (&[&str], &[&str], &[&str]) = match industry {
        Some("technology") => (
            &["Develop MVP", "Technical validation", "User experience optimization"],
            &["scalability", "user experience", "technical architecture"],
            &["user engagement", "churn rate", "technical performance"],
        ),
        Some("ecommerce") => (
            &["Product sourcing", "Inventory management", "Online store optimization"],
            &["conversion rate", "cart abandonment", "customer retention"],
            &["average order value", "inventory turnover", "customer lifetime value"],
        ),
        Some("services") => (
            &["Define service packages", "Client onboarding", "Referral pipeline"],
            &["utilization rate", "value-based pricing", "retainer"],
            &["billable hours", "client retention", "revenue per client"],
        ),
        Some("health") => (
            &["Patient experience", "Compliance readiness", "Care quality tracking"],
            &["patient satisfaction", "compliance", "care outcomes"],
            &["patient retention", "appointment utilization", "outcome scores"],
        ),
        Some("education") => (
            &["Curriculum design", "Learner engagement", "Outcome measurement"],
            &["learning outcomes", "engagement", "completion"],
            &["completion rate", "learner satisfaction", "enrollment growth"],
        ),
        Some("food") => (
            &["Menu engineering", "Food cost control", "Supplier reliability"],
            &["food cost", "menu mix", "covers"],
            &["food cost percentage", "table turnover", "average ticket"],
        ),
        // Unknown industries and "other" fall back to generic business context.
        _ => (
            &["Define core value proposition", "Identify target market", "Create business model"],
            &["market validation", "customer acquisition", "revenue model"],
            &["customer acquisition cost", "lifetime value", "conversion rate"],
        ),
    };

    IndustryContext {
        industry_goals: goals.iter().map(|s| s.to_string()).collect(),
        key_terminology: terminology.iter().map(|s| s.to_string()).collect(),
        relevant_metrics: metrics.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn profile(stage: BusinessStage, experience: ExperienceLevel) -> BusinessProfile {
        BusinessProfile {
            industry: Some("technology".into()),
            stage,
            experience,
            goals: vec![],
            skill_levels: BTreeMap::new(),
        }
    }

    fn input<'a>(
        profile: &'a BusinessProfile,
        completed: u32,
        avg_hours: Option<f64>,
    ) -> PersonalizationInput<'a> {
        PersonalizationInput {
            profile,
            completed_milestones: completed,
            avg_completion_hours: avg_hours,
            metrics: None,
        }
    }

    #[test]
    fn test_novice_difficulty_is_capped() {
        let p = profile(BusinessStage::Idea, ExperienceLevel::Novice);
        // Even a heavy completion history cannot push a novice past 3.
        let result = personalize(&input(&p, 100, Some(2.0)));
        assert_eq!(result.difficulty, 3);
    }

    #[test]
    fn test_fresh_novice_starts_at_one() {
        let p = profile(BusinessStage::Idea, ExperienceLevel::Novice);
        assert_eq!(personalize(&input(&p, 0, None)).difficulty, 1);
    }

    #[test]
    fn test_experienced_reaches_five() {
        let p = profile(BusinessStage::Startup, ExperienceLevel::Experienced);
        let result = personalize(&input(&p, 60, Some(5.0)));
        assert_eq!(result.difficulty, 5);
    }

    #[test]
    fn test_some_experience_caps_at_four() {
        let p = profile(BusinessStage::Startup, ExperienceLevel::SomeExperience);
        let result = personalize(&input(&p, 60, Some(5.0)));
        assert_eq!(result.difficulty, 4);
    }

    #[test]
    fn test_no_completions_means_no_fast_bonus() {
        let p = profile(BusinessStage::Idea, ExperienceLevel::Experienced);
        assert_eq!(personalize(&input(&p, 0, None)).difficulty, 3);
        assert_eq!(personalize(&input(&p, 0, Some(2.0))).difficulty, 4);
    }

    #[test]
    fn test_weak_skills_lead_focus_areas() {
        let mut p = profile(BusinessStage::Idea, ExperienceLevel::Novice);
        p.skill_levels = BTreeMap::from([
            ("finance".to_string(), 1),
            ("marketing".to_string(), 2),
            ("sales".to_string(), 5),
        ]);
        let result = personalize(&input(&p, 0, None));
        assert_eq!(result.focus_areas[0], "finance");
        assert_eq!(result.focus_areas[1], "marketing");
        assert!(!result.focus_areas.contains(&"sales".to_string()));
        assert_eq!(result.focus_areas.len(), 4);
    }

    #[test]
    fn test_stage_defaults_fill_focus_areas() {
        let p = profile(BusinessStage::Established, ExperienceLevel::Novice);
        let result = personalize(&input(&p, 0, None));
        assert!(result.focus_areas.contains(&"optimization".to_string()));
        assert!(result.focus_areas.contains(&"scaling".to_string()));
        assert_eq!(result.focus_areas.len(), 4);
        assert_eq!(result.suggested_skills.len(), result.focus_areas.len());
    }

    #[test]
    fn test_focus_areas_deduplicate() {
        let mut p = profile(BusinessStage::Idea, ExperienceLevel::Novice);
        // Weak skill named the same as a stage default must not repeat.
        p.skill_levels = BTreeMap::from([("market_research".to_string(), 1)]);
        let result = personalize(&input(&p, 0, None));
        let unique: std::collections::HashSet<_> = result.focus_areas.iter().collect();
        assert_eq!(unique.len(), result.focus_areas.len());
    }

    #[test]
    fn test_unknown_industry_falls_back() {
        let mut p = profile(BusinessStage::Idea, ExperienceLevel::Novice);
        p.industry = Some("underwater basket weaving".into());
        let result = personalize(&input(&p, 0, None));
        assert!(result
            .industry_context
            .key_terminology
            .contains(&"market validation".to_string()));
    }

    #[test]
    fn test_metrics_industry_overrides_profile() {
        let p = profile(BusinessStage::Idea, ExperienceLevel::Novice);
        let metrics = MetricsSnapshot {
            industry: Some("ecommerce".into()),
            ..Default::default()
        };
        let result = personalize(&PersonalizationInput {
            profile: &p,
            completed_milestones: 0,
            avg_completion_hours: None,
            metrics: Some(&metrics),
        });
        assert!(result
            .industry_context
            .key_terminology
            .contains(&"cart abandonment".to_string()));
    }
}
