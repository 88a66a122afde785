// SubjectChat - subject tutoring chat backend
// Library exports

pub mod config;
pub mod logging;
pub mod metrics;
pub mod moderation;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod recommend;
pub mod server;
pub mod skills;
pub mod subjects;
