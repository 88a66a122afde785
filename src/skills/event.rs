// Skill events: the learning signals derived from chat turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a turn said about the learner's grasp of a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillEventType {
    Correct,
    Incorrect,
    AskedHint,
    Other,
}

impl SkillEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::AskedHint => "asked_hint",
            Self::Other => "other",
        }
    }
}

impl FromStr for SkillEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Self::Correct),
            "incorrect" => Ok(Self::Incorrect),
            "asked_hint" => Ok(Self::AskedHint),
            "other" => Ok(Self::Other),
            other => anyhow::bail!("unknown skill event type: {}", other),
        }
    }
}

/// Append-only record of one learning signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillEvent {
    pub user_id: String,
    pub subject_id: String,
    pub skill_tag: String,
    pub event_type: SkillEventType,
    pub occurred_at: DateTime<Utc>,
}

impl SkillEvent {
    pub fn new(
        user_id: impl Into<String>,
        subject_id: impl Into<String>,
        skill_tag: impl Into<String>,
        event_type: SkillEventType,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            subject_id: subject_id.into(),
            skill_tag: skill_tag.into(),
            event_type,
            occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_string_forms() {
        for ty in [
            SkillEventType::Correct,
            SkillEventType::Incorrect,
            SkillEventType::AskedHint,
            SkillEventType::Other,
        ] {
            assert_eq!(ty.as_str().parse::<SkillEventType>().unwrap(), ty);
        }
        assert!("hinted".parse::<SkillEventType>().is_err());
        assert_eq!(
            serde_json::to_string(&SkillEventType::AskedHint).unwrap(),
            "\"asked_hint\""
        );
    }
}
