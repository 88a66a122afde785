// Skill progression tracks
//
// Each subject has an ordered list of skills. The successor of a skill is
// the next entry in its track; keywords drive turn-to-tag matching.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillNode {
    pub tag: String,
    pub label: String,
    /// Lowercase words or phrases matched at word starts
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SkillNode {
    fn new(tag: &str, label: &str, keywords: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Ordered progression for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillTrack {
    pub subject_id: String,
    pub skills: Vec<SkillNode>,
}

/// Lookup over all tracks
#[derive(Debug, Clone)]
pub struct ProgressionTable {
    tracks: Vec<SkillTrack>,
}

impl ProgressionTable {
    pub fn new(tracks: Vec<SkillTrack>) -> Self {
        Self { tracks }
    }

    /// Built-in tracks; a configured track replaces the built-in one for its subject
    pub fn with_overrides(extra: &[SkillTrack]) -> Self {
        let mut tracks = default_tracks();
        for track in extra {
            match tracks
                .iter_mut()
                .find(|t| t.subject_id.eq_ignore_ascii_case(&track.subject_id))
            {
                Some(existing) => *existing = track.clone(),
                None => tracks.push(track.clone()),
            }
        }
        Self { tracks }
    }

    pub fn track(&self, subject_id: &str) -> Option<&SkillTrack> {
        self.tracks
            .iter()
            .find(|t| t.subject_id.eq_ignore_ascii_case(subject_id))
    }

    pub fn node(&self, subject_id: &str, tag: &str) -> Option<&SkillNode> {
        self.track(subject_id)?.skills.iter().find(|s| s.tag == tag)
    }

    /// The skill that follows `tag`, if the track has one
    pub fn next(&self, subject_id: &str, tag: &str) -> Option<&SkillNode> {
        let skills = &self.track(subject_id)?.skills;
        let pos = skills.iter().position(|s| s.tag == tag)?;
        skills.get(pos + 1)
    }

    pub fn first(&self, subject_id: &str) -> Option<&SkillNode> {
        self.track(subject_id)?.skills.first()
    }

    /// Human label for a tag; unknown tags get their last segment with
    /// underscores turned into spaces
    pub fn label(&self, subject_id: &str, tag: &str) -> String {
        match self.node(subject_id, tag) {
            Some(node) => node.label.clone(),
            None => tag
                .rsplit('.')
                .next()
                .unwrap_or(tag)
                .replace('_', " "),
        }
    }

    /// Best-matching skill for a piece of learner text.
    ///
    /// The skill with the most keyword hits wins; ties go to the earlier skill
    /// in the track. Returns `None` when nothing matches.
    pub fn match_tag(&self, subject_id: &str, text: &str) -> Option<&SkillNode> {
        let haystack = text.to_lowercase();
        let mut best: Option<(&SkillNode, usize)> = None;
        for node in &self.track(subject_id)?.skills {
            let hits = node
                .keywords
                .iter()
                .filter(|k| contains_at_word_start(&haystack, &k.to_lowercase()))
                .count();
            if hits > 0 && best.map_or(true, |(_, h)| hits > h) {
                best = Some((node, hits));
            }
        }
        best.map(|(node, _)| node)
    }
}

impl Default for ProgressionTable {
    fn default() -> Self {
        Self::new(default_tracks())
    }
}

/// Fallback tag for turns that match no skill
pub fn general_tag(subject_id: &str) -> String {
    format!("{}.general", subject_id.to_lowercase())
}

fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

pub fn default_tracks() -> Vec<SkillTrack> {
    vec![
        SkillTrack {
            subject_id: "math".to_string(),
            skills: vec![
                SkillNode::new(
                    "algebra.linear",
                    "linear equations",
                    &["linear", "solve for x", "slope", "intercept"],
                ),
                SkillNode::new(
                    "algebra.factoring",
                    "factoring",
                    &["factor", "factorise", "factorize", "common factor"],
                ),
                SkillNode::new(
                    "algebra.quadratics",
                    "quadratic equations",
                    &["quadratic", "x^2", "parabola", "discriminant"],
                ),
                SkillNode::new(
                    "algebra.functions",
                    "functions",
                    &["function", "domain", "range", "f(x)"],
                ),
                SkillNode::new(
                    "calculus.limits",
                    "limits",
                    &["limit", "approaches", "continuity", "asymptote"],
                ),
                SkillNode::new(
                    "calculus.derivatives",
                    "derivatives",
                    &["derivative", "differentiate", "rate of change", "tangent"],
                ),
            ],
        },
        SkillTrack {
            subject_id: "physics".to_string(),
            skills: vec![
                SkillNode::new(
                    "kinematics.motion",
                    "motion and kinematics",
                    &["velocity", "speed", "acceleration", "displacement"],
                ),
                SkillNode::new(
                    "dynamics.forces",
                    "forces and Newton's laws",
                    &["force", "newton", "friction", "net force"],
                ),
                SkillNode::new(
                    "energy.work",
                    "work and energy",
                    &["energy", "work done", "power", "joule"],
                ),
                SkillNode::new(
                    "momentum.collisions",
                    "momentum and collisions",
                    &["momentum", "collision", "impulse"],
                ),
                SkillNode::new(
                    "waves.oscillations",
                    "waves and oscillations",
                    &["wave", "frequency", "oscillat", "pendulum"],
                ),
                SkillNode::new(
                    "electricity.circuits",
                    "electric circuits",
                    &["circuit", "current", "voltage", "resistance", "ohm"],
                ),
            ],
        },
        SkillTrack {
            subject_id: "chemistry".to_string(),
            skills: vec![
                SkillNode::new(
                    "atoms.structure",
                    "atomic structure",
                    &["atom", "electron", "proton", "neutron", "isotope"],
                ),
                SkillNode::new(
                    "bonding.types",
                    "chemical bonding",
                    &["bond", "ionic", "covalent", "molecule"],
                ),
                SkillNode::new(
                    "reactions.balancing",
                    "balancing equations",
                    &["balance", "reaction", "reactant", "product"],
                ),
                SkillNode::new(
                    "stoichiometry.moles",
                    "moles and stoichiometry",
                    &["mole", "molar", "stoichiometry", "limiting reagent"],
                ),
                SkillNode::new(
                    "acids.bases",
                    "acids and bases",
                    &["acid", "base", "ph scale", "ph of", "neutraliz"],
                ),
            ],
        },
        SkillTrack {
            subject_id: "history".to_string(),
            skills: vec![
                SkillNode::new(
                    "chronology.timelines",
                    "timelines and chronology",
                    &["timeline", "when did", "century", "chronolog"],
                ),
                SkillNode::new(
                    "causes.effects",
                    "causes and effects",
                    &["cause", "effect", "why did", "led to", "consequence"],
                ),
                SkillNode::new(
                    "sources.analysis",
                    "source analysis",
                    &["source", "bias", "primary", "evidence"],
                ),
                SkillNode::new(
                    "perspectives.comparison",
                    "comparing perspectives",
                    &["perspective", "viewpoint", "compare", "contrast"],
                ),
            ],
        },
        SkillTrack {
            subject_id: "writing".to_string(),
            skills: vec![
                SkillNode::new(
                    "structure.outline",
                    "essay structure and outlines",
                    &["outline", "structure", "paragraph", "introduction", "conclusion"],
                ),
                SkillNode::new(
                    "thesis.argument",
                    "thesis and argument",
                    &["thesis", "argument", "claim", "counterargument"],
                ),
                SkillNode::new(
                    "grammar.mechanics",
                    "grammar and mechanics",
                    &["grammar", "punctuation", "comma", "tense", "spelling"],
                ),
                SkillNode::new(
                    "clarity.style",
                    "clarity and style",
                    &["clarity", "style", "tone", "wordy", "concise"],
                ),
                SkillNode::new(
                    "revision.feedback",
                    "revision",
                    &["revise", "revision", "feedback", "edit", "draft"],
                ),
            ],
        },
    ]
}
