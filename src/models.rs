use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle to a blob somewhere in object storage. The core never
/// reads or writes the bytes behind it, only passes it through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileLocation {
    pub server_type: String,
    pub bucket: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Received,
    SentForEvaluation,
    Evaluated,
    Lost,
}

impl SubmissionStatus {
    /// Forward-only ordering of the status state machine.
    fn rank(self) -> u8 {
        match self {
            SubmissionStatus::Received => 0,
            SubmissionStatus::SentForEvaluation => 1,
            SubmissionStatus::Evaluated => 2,
            SubmissionStatus::Lost => 3,
        }
    }

    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubmissionStatus::Received => "received",
            SubmissionStatus::SentForEvaluation => "sent_for_evaluation",
            SubmissionStatus::Evaluated => "evaluated",
            SubmissionStatus::Lost => "lost",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub task_id: u64,
    pub user_id: u64,
    pub contest_id: Option<u64>,
    pub order: u32,
    pub language_id: u64,
    pub file_ref: FileLocation,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Wire-stable ordinals. `Unknown` is only the pre-creation sentinel — a
/// `SubmissionResult` is never persisted with it; out-of-range codes from
/// a worker are clamped to `Invalid` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Unknown = 0,
    Success = 1,
    TestFailed = 2,
    CompilationError = 3,
    InitializationError = 4,
    InternalError = 5,
    Invalid = 6,
}

impl ResultCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a worker-reported status code. `Unknown` is only the
    /// pre-creation sentinel and is never produced from the wire — per
    /// spec, anything outside `[1..5]`, including 0, persists as
    /// `Invalid`.
    pub fn from_wire(v: u8) -> Self {
        match v {
            1 => ResultCode::Success,
            2 => ResultCode::TestFailed,
            3 => ResultCode::CompilationError,
            4 => ResultCode::InitializationError,
            5 => ResultCode::InternalError,
            _ => ResultCode::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Ok = 1,
    OutputDifference = 2,
    TimeLimit = 3,
    MemoryLimit = 4,
    RuntimeError = 5,
    NotExecuted = 6,
    Invalid = 7,
}

impl TestStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<u8> for TestStatus {
    fn from(v: u8) -> Self {
        match v {
            1 => TestStatus::Ok,
            2 => TestStatus::OutputDifference,
            3 => TestStatus::TimeLimit,
            4 => TestStatus::MemoryLimit,
            5 => TestStatus::RuntimeError,
            6 => TestStatus::NotExecuted,
            _ => TestStatus::Invalid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub id: u64,
    pub submission_id: u64,
    pub code: ResultCode,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: u64,
    pub submission_result_id: u64,
    pub test_case_id: u64,
    pub passed: bool,
    pub status_code: TestStatus,
    pub execution_time_s: f64,
    pub peak_memory_kb: u64,
    pub error_message: Option<String>,
    pub stdout_ref: Option<FileLocation>,
    pub stderr_ref: Option<FileLocation>,
    pub diff_ref: Option<FileLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u64,
    pub task_id: u64,
    /// 1-based, contiguous `[1..n]` within a task.
    pub order: u32,
    pub input_ref: FileLocation,
    pub output_ref: FileLocation,
    pub time_limit_ms: u32,
    pub memory_limit_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub id: u64,
    pub r#type: String,
    pub version: String,
    pub extension: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueCorrelation {
    pub message_id: String,
    pub submission_id: u64,
    pub published_at: DateTime<Utc>,
    pub priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Invalid,
}

impl From<i64> for WorkerStatus {
    fn from(v: i64) -> Self {
        match v {
            0 => WorkerStatus::Idle,
            1 => WorkerStatus::Busy,
            _ => WorkerStatus::Invalid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshotEntry {
    pub id: i64,
    pub status: WorkerStatus,
    pub processing_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerFleetSnapshot {
    pub busy: u32,
    pub total: u32,
    pub workers: Vec<WorkerSnapshotEntry>,
    pub observed_at: DateTime<Utc>,
}

impl Default for WorkerFleetSnapshot {
    fn default() -> Self {
        Self {
            busy: 0,
            total: 0,
            workers: Vec::new(),
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_forward_only() {
        assert!(SubmissionStatus::Received.can_transition_to(SubmissionStatus::SentForEvaluation));
        assert!(SubmissionStatus::SentForEvaluation.can_transition_to(SubmissionStatus::Evaluated));
        assert!(!SubmissionStatus::Evaluated.can_transition_to(SubmissionStatus::Received));
        assert!(!SubmissionStatus::Received.can_transition_to(SubmissionStatus::Received));
    }

    #[test]
    fn result_code_from_wire_clamps_out_of_range_to_invalid() {
        assert_eq!(ResultCode::from_wire(0), ResultCode::Invalid);
        assert_eq!(ResultCode::from_wire(5), ResultCode::InternalError);
        assert_eq!(ResultCode::from_wire(6), ResultCode::Invalid);
        assert_eq!(ResultCode::from_wire(99), ResultCode::Invalid);
    }

    #[test]
    fn test_status_clamps_out_of_range_to_invalid() {
        assert_eq!(TestStatus::from(1), TestStatus::Ok);
        assert_eq!(TestStatus::from(7), TestStatus::Invalid);
        assert_eq!(TestStatus::from(0), TestStatus::Invalid);
        assert_eq!(TestStatus::from(200), TestStatus::Invalid);
    }

    #[test]
    fn worker_status_maps_numeric_codes() {
        assert_eq!(WorkerStatus::from(0), WorkerStatus::Idle);
        assert_eq!(WorkerStatus::from(1), WorkerStatus::Busy);
        assert_eq!(WorkerStatus::from(2), WorkerStatus::Invalid);
        assert_eq!(WorkerStatus::from(-1), WorkerStatus::Invalid);
    }
}
