use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How often a task schedule recurs.
///
/// The integer codes are the values persisted in `etl_schedules.frequency`
/// and are kept stable for store compatibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyClass {
    Daily = 1,
    Weekly = 2,
    Monthly = 3,
    Hourly = 4,
    Minutely = 5,
}

impl FrequencyClass {
    /// Decode the persisted integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Daily),
            2 => Some(Self::Weekly),
            3 => Some(Self::Monthly),
            4 => Some(Self::Hourly),
            5 => Some(Self::Minutely),
            _ => None,
        }
    }

    /// The integer code persisted in the schedule table.
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Hourly => "hourly",
            Self::Minutely => "minutely",
        }
    }
}

impl std::fmt::Display for FrequencyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a run-log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted task row.
///
/// Connector settings are stored as versioned JSON envelopes, one column per
/// role, so each connector variant can evolve its schema independently.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRecord {
    pub id: i64,
    pub enabled: bool,
    pub source_name: String,
    pub source_settings: String,
    pub target_name: String,
    pub target_settings: String,
    pub processor_name: String,
    pub processor_settings: String,
}

/// Persisted schedule row, one per task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleRecord {
    pub id: i64,
    pub task_id: i64,
    pub frequency: i64,
    pub schedule_param: i64,
    pub next_event_time: i64,
}

/// Persisted run-log row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LogRecord {
    pub id: i64,
    pub time: i64,
    pub run_id: i64,
    pub task_id: i64,
    pub log_type: String,
    pub element: String,
    pub action: String,
    pub info: String,
    pub trace: String,
}

/// One runner invocation; the row id doubles as the monotonic run id shared
/// by every task executed in that invocation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
}

/// Flat key→value settings map submitted by the admin configuration surface.
pub type SubmittedSettings = std::collections::HashMap<String, String>;

/// Schedule fields submitted by the admin configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInput {
    pub frequency: FrequencyClass,
    pub schedule_param: u32,
    /// When true the schedule becomes due immediately instead of being
    /// projected forward from now.
    #[serde(default)]
    pub initialize_now: bool,
}
