pub mod checker;
pub mod config;
pub mod language;
pub mod queue;
pub mod runner;
pub mod task;
pub mod verdict;
pub mod worker;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
