// Moderation gate
//
// Local, pattern-based pre-flight check on the latest user turn. There is no
// network call, so the gate cannot fail open because something is unreachable.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::config::constants::REFUSAL_MESSAGE;
use crate::logging::fingerprint;

/// Why a turn was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationCategory {
    /// Attempts to override the tutor's instructions
    PromptInjection,
    /// Weapon or explosive construction
    Weapons,
    /// Breaking into systems or accounts
    Intrusion,
    /// Operator-supplied pattern from configuration
    Custom,
}

impl ModerationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromptInjection => "prompt_injection",
            Self::Weapons => "weapons",
            Self::Intrusion => "intrusion",
            Self::Custom => "custom",
        }
    }
}

/// Outcome of a moderation check. Produced once per user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationVerdict {
    pub allowed: bool,
    /// Refusal text to show the learner when blocked
    pub reason: Option<String>,
    pub category: Option<ModerationCategory>,
}

impl ModerationVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            category: None,
        }
    }

    pub fn block(category: ModerationCategory) -> Self {
        Self {
            allowed: false,
            reason: Some(REFUSAL_MESSAGE.to_string()),
            category: Some(category),
        }
    }
}

const BUILTIN_RULES: &[(ModerationCategory, &str)] = &[
    (
        ModerationCategory::PromptInjection,
        r"\b(ignore\s+previous|disregard\s+instructions|system\s+prompt)\b",
    ),
    (
        ModerationCategory::Weapons,
        r"\b(how\s+to\s+(build|make)\s+(a\s+)?(bomb|weapon))\b",
    ),
    (
        ModerationCategory::Intrusion,
        r"\b(hack\s+into|steal\s+password)\b",
    ),
];

struct Rule {
    category: ModerationCategory,
    pattern: Regex,
}

/// Deny-list matcher over the latest user message
pub struct ModerationGate {
    rules: Vec<Rule>,
}

impl ModerationGate {
    /// Built-in rules only
    pub fn new() -> Self {
        // The built-in patterns are constants covered by tests
        let rules = BUILTIN_RULES
            .iter()
            .filter_map(|(category, pattern)| compile(pattern).ok().map(|pattern| Rule {
                category: *category,
                pattern,
            }))
            .collect();
        Self { rules }
    }

    /// Built-in rules plus operator patterns (case-insensitive regex syntax)
    pub fn with_extra_patterns(extra: &[String]) -> anyhow::Result<Self> {
        let mut gate = Self::new();
        for pattern in extra {
            let compiled = compile(pattern)
                .map_err(|e| anyhow::anyhow!("Invalid moderation pattern {:?}: {}", pattern, e))?;
            gate.rules.push(Rule {
                category: ModerationCategory::Custom,
                pattern: compiled,
            });
        }
        Ok(gate)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Check one user message. Whitespace runs are collapsed before matching
    /// so line breaks can't split a phrase.
    pub fn check(&self, text: &str) -> ModerationVerdict {
        if text.trim().is_empty() {
            return ModerationVerdict::allow();
        }
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

        match self.rules.iter().find(|rule| rule.pattern.is_match(&normalized)) {
            Some(rule) => {
                tracing::info!(
                    category = rule.category.as_str(),
                    fingerprint = %fingerprint(text),
                    len = text.len(),
                    "Moderation blocked user turn"
                );
                ModerationVerdict::block(rule.category)
            }
            None => ModerationVerdict::allow(),
        }
    }
}

impl Default for ModerationGate {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}
