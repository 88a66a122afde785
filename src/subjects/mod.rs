// Subject catalog
//
// Read-only lookup of subject definitions used by the prompt builder and the
// `/api/subjects` listing.

use serde::{Deserialize, Serialize};

/// One tutoring subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// How the tutor should teach this subject. Required for prompting.
    #[serde(default)]
    pub teaching_style: String,
    /// Subject-specific rules appended to the system prompt
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl SubjectConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        teaching_style: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            teaching_style: teaching_style.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, rule: impl Into<String>) -> Self {
        self.constraints.push(rule.into());
        self
    }
}

/// Summary returned by the subject listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<&SubjectConfig> for SubjectSummary {
    fn from(s: &SubjectConfig) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            description: s.description.clone(),
        }
    }
}

/// Source of subject definitions
pub trait SubjectCatalog: Send + Sync {
    /// Look up a subject by id (case-insensitive)
    fn get(&self, subject_id: &str) -> Option<SubjectConfig>;

    /// All subjects in display order
    fn list(&self) -> Vec<SubjectConfig>;
}

/// In-memory catalog: the built-in subjects plus configured additions
#[derive(Debug, Clone)]
pub struct StaticSubjectCatalog {
    subjects: Vec<SubjectConfig>,
}

impl StaticSubjectCatalog {
    pub fn new(subjects: Vec<SubjectConfig>) -> Self {
        Self { subjects }
    }

    /// Built-in subjects, then `extra`. An extra entry with an existing id
    /// replaces the built-in one in place.
    pub fn with_overrides(extra: &[SubjectConfig]) -> Self {
        let mut subjects = default_subjects();
        for subject in extra {
            match subjects
                .iter_mut()
                .find(|s| s.id.eq_ignore_ascii_case(&subject.id))
            {
                Some(existing) => *existing = subject.clone(),
                None => subjects.push(subject.clone()),
            }
        }
        Self { subjects }
    }
}

impl Default for StaticSubjectCatalog {
    fn default() -> Self {
        Self::new(default_subjects())
    }
}

impl SubjectCatalog for StaticSubjectCatalog {
    fn get(&self, subject_id: &str) -> Option<SubjectConfig> {
        let id = subject_id.trim();
        self.subjects
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(id))
            .cloned()
    }

    fn list(&self) -> Vec<SubjectConfig> {
        self.subjects.clone()
    }
}

/// The five subjects the web UI ships with
pub fn default_subjects() -> Vec<SubjectConfig> {
    vec![
        SubjectConfig::new(
            "math",
            "Math",
            "Step-by-step explanations, worked examples, and practice problems for mathematics.",
            "Explain concepts step by step, show intermediate steps, and ask the learner to attempt \
             parts of the solution before revealing everything.",
        )
        .with_constraint("Show steps and verify with a quick check."),
        SubjectConfig::new(
            "physics",
            "Physics",
            "Intuitive explanations of physical concepts with equations and real-world examples.",
            "Relate formulas to physical intuition, use diagrams conceptually, and check the \
             learner's understanding with simple thought experiments.",
        )
        .with_constraint("State assumptions and units; show formulas clearly."),
        SubjectConfig::new(
            "chemistry",
            "Chemistry",
            "Help with chemical reactions, stoichiometry, and conceptual understanding.",
            "Use clear notation, explain each reaction step, and highlight safety-relevant facts.",
        )
        .with_constraint("Balance equations carefully; explain concepts."),
        SubjectConfig::new(
            "history",
            "History",
            "Contextual narratives of historical events with attention to sources and bias.",
            "Provide timelines, causes and effects, and multiple viewpoints; encourage critical \
             thinking about sources.",
        )
        .with_constraint("Prefer accurate facts; call out uncertainty; avoid inventing citations."),
        SubjectConfig::new(
            "writing",
            "English / Writing",
            "Guidance on structure, clarity, and style for essays and other writing tasks.",
            "Focus on structure, clarity, and revision. Ask clarifying questions before rewriting \
             large sections; avoid doing full exam essays for the learner.",
        )
        .with_constraint("Help with outlines and feedback; avoid writing exam answers verbatim."),
    ]
}
