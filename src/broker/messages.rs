use serde::{Deserialize, Serialize};

use crate::models::FileLocation;

/// Outbound envelope published to the worker queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub r#type: String,
    pub message_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseMessage {
    pub order: u32,
    pub input_file: FileLocation,
    pub expected_output: FileLocation,
    pub stdout_result: FileLocation,
    pub stderr_result: FileLocation,
    pub diff_result: FileLocation,
    pub time_limit_ms: u32,
    pub memory_limit_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueueMessage {
    pub order: u32,
    pub language_type: String,
    pub language_version: String,
    pub submission_file: FileLocation,
    pub test_cases: Vec<TestCaseMessage>,
}

/// Inbound envelope consumed from the response queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueResponseMessage {
    pub message_id: String,
    pub r#type: String,
    pub ok: bool,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResultEntry {
    pub order: u32,
    pub passed: bool,
    pub status_code: i64,
    pub execution_time: f64,
    pub peak_memory: u64,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponsePayload {
    pub status_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub test_results: Vec<TestResultEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageAnnouncement {
    pub name: String,
    pub versions: Vec<String>,
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandShakeResponsePayload {
    pub languages: Vec<LanguageAnnouncement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusEntry {
    pub worker_id: i64,
    pub status: i64,
    #[serde(default)]
    pub processing_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponsePayload {
    pub busy_workers: u32,
    pub total_workers: u32,
    #[serde(default)]
    pub worker_status: Vec<WorkerStatusEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_response_payload_accepts_empty_test_results() {
        let json = serde_json::json!({"status_code": 1, "message": "ok", "test_results": []});
        let parsed: TaskResponsePayload = serde_json::from_value(json).unwrap();
        assert!(parsed.test_results.is_empty());
    }

    #[test]
    fn handshake_payload_accepts_empty_languages() {
        let json = serde_json::json!({"languages": []});
        let parsed: HandShakeResponsePayload = serde_json::from_value(json).unwrap();
        assert!(parsed.languages.is_empty());
    }
}
