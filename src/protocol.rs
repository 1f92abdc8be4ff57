//! Timing event wire format (newline-delimited JSON)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimingEvent {
    /// One complete run of the generator driver.
    GeneratorDriverRunTime { pid: u32, elapsed_ticks: i64 },
    /// One generator's share of a driver run.
    SingleGeneratorRunTime {
        pid: u32,
        generator_name: String,
        assembly_path: String,
        elapsed_ticks: i64,
    },
}

impl TimingEvent {
    pub fn pid(&self) -> u32 {
        match self {
            TimingEvent::GeneratorDriverRunTime { pid, .. } => *pid,
            TimingEvent::SingleGeneratorRunTime { pid, .. } => *pid,
        }
    }

    pub fn parse_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(serde_json::to_string(self)? + "\n")
    }
}
