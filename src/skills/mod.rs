// Skill tracking
//
// Events derived from chat turns, their storage, and the per-subject
// progression tracks the recommendation engine walks.

mod event;
mod extractor;
mod log;
mod recorder;
mod sqlite;
mod tracks;

pub use event::{SkillEvent, SkillEventType};
pub use extractor::SkillExtractor;
pub use log::{InMemorySkillEventLog, SkillEventLog};
pub use recorder::SkillRecorder;
pub use sqlite::SqliteSkillEventLog;
pub use tracks::{default_tracks, general_tag, ProgressionTable, SkillNode, SkillTrack};
