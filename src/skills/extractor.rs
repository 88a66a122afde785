// Turn summarization into skill events
//
// Heuristic and local: the learner's text picks the skill tag, the learner's
// phrasing or the tutor's reply picks the event type.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::event::{SkillEvent, SkillEventType};
use super::tracks::{general_tag, ProgressionTable};

const HINT_PHRASES: &[&str] = &[
    "hint",
    "clue",
    "stuck",
    "don't understand",
    "dont understand",
    "do not understand",
    "i'm lost",
    "im lost",
    "no idea",
    "where do i start",
    "how do i start",
];

const INCORRECT_PHRASES: &[&str] = &[
    "not quite",
    "not correct",
    "incorrect",
    "that's not right",
    "that is not right",
    "isn't right",
    "not right",
    "mistake",
    "try again",
    "close, but",
    "small error",
];

const CORRECT_PHRASES: &[&str] = &[
    "that's correct",
    "that is correct",
    "you're correct",
    "you are correct",
    "correct!",
    "that's right",
    "that is right",
    "you're right",
    "well done",
    "exactly right",
    "great job",
    "nice work",
    "you got it",
];

/// Derives skill events from a completed turn
#[derive(Debug, Clone)]
pub struct SkillExtractor {
    tracks: Arc<ProgressionTable>,
}

impl SkillExtractor {
    pub fn new(tracks: Arc<ProgressionTable>) -> Self {
        Self { tracks }
    }

    /// Classify a turn. The learner asking for help outranks anything the
    /// tutor said; a flagged mistake outranks praise.
    pub fn classify(user_text: &str, assistant_text: &str) -> SkillEventType {
        let user = user_text.to_lowercase();
        let assistant = assistant_text.to_lowercase();

        if HINT_PHRASES.iter().any(|p| user.contains(p)) {
            SkillEventType::AskedHint
        } else if INCORRECT_PHRASES.iter().any(|p| assistant.contains(p)) {
            SkillEventType::Incorrect
        } else if CORRECT_PHRASES.iter().any(|p| assistant.contains(p)) {
            SkillEventType::Correct
        } else {
            SkillEventType::Other
        }
    }

    /// Skill tag for the learner's text, falling back to `<subject>.general`
    pub fn tag_for(&self, subject_id: &str, user_text: &str) -> String {
        self.tracks
            .match_tag(subject_id, user_text)
            .map(|node| node.tag.clone())
            .unwrap_or_else(|| general_tag(subject_id))
    }

    /// Events for one completed turn (currently exactly one)
    pub fn extract(
        &self,
        user_id: &str,
        subject_id: &str,
        user_text: &str,
        assistant_text: &str,
        occurred_at: DateTime<Utc>,
    ) -> Vec<SkillEvent> {
        vec![SkillEvent::new(
            user_id,
            subject_id,
            self.tag_for(subject_id, user_text),
            Self::classify(user_text, assistant_text),
            occurred_at,
        )]
    }
}
