// Recommendation engine
//
// Picks one next practice question from the learner's recent skill events.
// The policy is a pure function of the event window: no clock, no
// randomness, no model call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::skills::{ProgressionTable, SkillEvent, SkillEventLog, SkillEventType};

const SCORE_EPSILON: f64 = 1e-9;

/// Tunable weights for the struggle score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationPolicy {
    /// Most recent events considered
    pub window: usize,
    /// Per-position recency factor; event i (0 = newest) counts `decay^i`
    pub decay: f64,
    pub incorrect_weight: f64,
    pub hint_weight: f64,
    pub correct_weight: f64,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self {
            window: 20,
            decay: 1.0,
            incorrect_weight: 1.0,
            hint_weight: 1.0,
            correct_weight: -1.0,
        }
    }
}

impl RecommendationPolicy {
    fn weight(&self, event_type: SkillEventType) -> f64 {
        match event_type {
            SkillEventType::Incorrect => self.incorrect_weight,
            SkillEventType::AskedHint => self.hint_weight,
            SkillEventType::Correct => self.correct_weight,
            SkillEventType::Other => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Practice on a skill the learner is struggling with
    Remediation,
    /// Move on to the next skill (or a mastery challenge)
    Advancement,
    /// No history yet
    Starter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextQuestionSuggestion {
    pub subject_id: String,
    pub question_text: String,
    pub rationale: String,
    #[serde(rename = "stub")]
    pub is_stub: bool,
    pub kind: SuggestionKind,
    pub skill_tag: Option<String>,
}

/// Per-tag aggregate over the window
#[derive(Debug, Default)]
struct TagStats {
    score: f64,
    /// Position of the newest event for this tag (0 = newest overall)
    first_seen: usize,
    latest: Option<chrono::DateTime<chrono::Utc>>,
    incorrect: usize,
    hints: usize,
    correct: usize,
}

/// Reads the skill log and applies the policy
pub struct RecommendationEngine {
    log: Arc<dyn SkillEventLog>,
    tracks: Arc<ProgressionTable>,
    policy: RecommendationPolicy,
}

impl RecommendationEngine {
    pub fn new(
        log: Arc<dyn SkillEventLog>,
        tracks: Arc<ProgressionTable>,
        policy: RecommendationPolicy,
    ) -> Self {
        Self {
            log,
            tracks,
            policy,
        }
    }

    /// Fresh suggestion for `(user_id, subject_id)`. Only a log read failure
    /// is an error; an empty history yields the starter suggestion.
    pub async fn suggest_next(
        &self,
        user_id: &str,
        subject_id: &str,
    ) -> anyhow::Result<NextQuestionSuggestion> {
        let window = self
            .log
            .recent_window(user_id, subject_id, self.policy.window)
            .await?;

        let suggestion = suggest_from_window(&self.policy, &self.tracks, subject_id, &window);
        tracing::debug!(
            subject = subject_id,
            events = window.len(),
            kind = ?suggestion.kind,
            tag = suggestion.skill_tag.as_deref().unwrap_or("-"),
            "Computed next-question suggestion"
        );
        Ok(suggestion)
    }
}

/// The policy itself. `window` is newest first.
pub fn suggest_from_window(
    policy: &RecommendationPolicy,
    tracks: &ProgressionTable,
    subject_id: &str,
    window: &[SkillEvent],
) -> NextQuestionSuggestion {
    let window = &window[..window.len().min(policy.window)];
    if window.is_empty() {
        return starter(subject_id);
    }

    let mut order: Vec<&str> = Vec::new();
    let mut stats: HashMap<&str, TagStats> = HashMap::new();
    let mut factor = 1.0;

    for (i, event) in window.iter().enumerate() {
        let tag = event.skill_tag.as_str();
        let entry = stats.entry(tag).or_insert_with(|| {
            order.push(tag);
            TagStats {
                first_seen: i,
                ..TagStats::default()
            }
        });
        entry.score += policy.weight(event.event_type) * factor;
        if entry.latest.map_or(true, |t| event.occurred_at > t) {
            entry.latest = Some(event.occurred_at);
        }
        match event.event_type {
            SkillEventType::Incorrect => entry.incorrect += 1,
            SkillEventType::AskedHint => entry.hints += 1,
            SkillEventType::Correct => entry.correct += 1,
            SkillEventType::Other => {}
        }
        factor *= policy.decay;
    }

    // Highest score wins; ties go to the tag seen most recently
    let mut top: Option<(&str, &TagStats)> = None;
    for &tag in &order {
        let Some(candidate) = stats.get(tag) else {
            continue;
        };
        let better = match top {
            None => true,
            Some((_, best)) => {
                if (candidate.score - best.score).abs() > SCORE_EPSILON {
                    candidate.score > best.score
                } else {
                    candidate.latest > best.latest
                        || (candidate.latest == best.latest
                            && candidate.first_seen < best.first_seen)
                }
            }
        };
        if better {
            top = Some((tag, candidate));
        }
    }

    let Some((tag, top_stats)) = top else {
        return starter(subject_id);
    };

    if top_stats.score > SCORE_EPSILON {
        remediation(tracks, subject_id, tag, top_stats)
    } else {
        advancement(tracks, subject_id, tag, top_stats)
    }
}

fn starter(subject_id: &str) -> NextQuestionSuggestion {
    NextQuestionSuggestion {
        subject_id: subject_id.to_string(),
        question_text: format!(
            "Practice: Give me a {} question at your current level.",
            subject_id
        ),
        rationale: format!(
            "No practice history for {} yet, so start with a question at your current level.",
            subject_id
        ),
        is_stub: true,
        kind: SuggestionKind::Starter,
        skill_tag: None,
    }
}

fn remediation(
    tracks: &ProgressionTable,
    subject_id: &str,
    tag: &str,
    stats: &TagStats,
) -> NextQuestionSuggestion {
    let label = tracks.label(subject_id, tag);

    let signal = if stats.incorrect >= stats.hints {
        if stats.incorrect > 1 {
            format!("repeated incorrect attempts ({}) on {}", stats.incorrect, label)
        } else {
            format!("an incorrect attempt on {}", label)
        }
    } else if stats.hints > 1 {
        format!("repeated hints ({}) on {}", stats.hints, label)
    } else {
        format!("a request for a hint on {}", label)
    };

    NextQuestionSuggestion {
        subject_id: subject_id.to_string(),
        question_text: format!(
            "Let's revisit {}: try a slightly easier {} question on {} and explain each step as you go.",
            label, subject_id, label
        ),
        rationale: format!("Suggested because recent answers showed {}.", signal),
        is_stub: false,
        kind: SuggestionKind::Remediation,
        skill_tag: Some(tag.to_string()),
    }
}

fn advancement(
    tracks: &ProgressionTable,
    subject_id: &str,
    tag: &str,
    stats: &TagStats,
) -> NextQuestionSuggestion {
    let label = tracks.label(subject_id, tag);
    let evidence = if stats.correct > 0 {
        format!(
            "you answered {} recent question{} on {} correctly",
            stats.correct,
            if stats.correct == 1 { "" } else { "s" },
            label
        )
    } else {
        format!("recent work on {} showed no signs of struggle", label)
    };

    match tracks.next(subject_id, tag) {
        Some(next) => NextQuestionSuggestion {
            subject_id: subject_id.to_string(),
            question_text: format!(
                "Ready for the next step: try a {} question on {} that builds on {}.",
                subject_id, next.label, label
            ),
            rationale: format!(
                "Suggested because {}, so it is time to move on to {}.",
                evidence, next.label
            ),
            is_stub: false,
            kind: SuggestionKind::Advancement,
            skill_tag: Some(next.tag.clone()),
        },
        None => NextQuestionSuggestion {
            subject_id: subject_id.to_string(),
            question_text: format!(
                "Challenge: try a harder {} problem on {} that combines it with earlier skills.",
                subject_id, label
            ),
            rationale: format!(
                "Suggested because {} and there is no further skill in this track, so a mastery challenge comes next.",
                evidence
            ),
            is_stub: false,
            kind: SuggestionKind::Advancement,
            skill_tag: Some(tag.to_string()),
        },
    }
}
