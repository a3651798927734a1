use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Row};

use crate::error::{CoreError, CoreResult};
use crate::models::{FileLocation, ResultCode, Submission, SubmissionStatus, TestStatus};

fn parse_status(raw: &str) -> SubmissionStatus {
    match raw {
        "sent_for_evaluation" => SubmissionStatus::SentForEvaluation,
        "evaluated" => SubmissionStatus::Evaluated,
        "lost" => SubmissionStatus::Lost,
        _ => SubmissionStatus::Received,
    }
}

fn status_str(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Received => "received",
        SubmissionStatus::SentForEvaluation => "sent_for_evaluation",
        SubmissionStatus::Evaluated => "evaluated",
        SubmissionStatus::Lost => "lost",
    }
}

fn row_to_submission(row: MySqlRow) -> Submission {
    Submission {
        id: row.get::<u64, _>("id"),
        task_id: row.get::<u64, _>("task_id"),
        user_id: row.get::<u64, _>("user_id"),
        contest_id: row.try_get::<Option<u64>, _>("contest_id").unwrap_or(None),
        order: row.get::<u32, _>("order"),
        language_id: row.get::<u64, _>("language_id"),
        file_ref: FileLocation {
            server_type: row.get("file_server_type"),
            bucket: row.get("file_bucket"),
            path: row.get("file_path"),
        },
        status: parse_status(row.get::<String, _>("status").as_str()),
        submitted_at: row.get::<DateTime<Utc>, _>("submitted_at"),
        checked_at: row.try_get::<Option<DateTime<Utc>>, _>("checked_at").unwrap_or(None),
    }
}

/// Loads a submission row with `FOR UPDATE`, locking it for the duration
/// of the caller's transaction. The pending-correlation dance in C6 and
/// the task-result reconciliation in C7 both rely on this to serialize
/// concurrent writers on the same submission.
pub async fn load_for_update<'c, E>(executor: E, submission_id: u64) -> CoreResult<Submission>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let row = sqlx::query(
        "SELECT id, task_id, user_id, contest_id, `order`, language_id, \
         file_server_type, file_bucket, file_path, status, submitted_at, checked_at \
         FROM submissions WHERE id = ? FOR UPDATE",
    )
    .bind(submission_id)
    .fetch_optional(executor)
    .await?
    .ok_or(CoreError::SubmissionNotFound(submission_id))?;

    Ok(row_to_submission(row))
}

pub async fn load<'c, E>(executor: E, submission_id: u64) -> CoreResult<Submission>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let row = sqlx::query(
        "SELECT id, task_id, user_id, contest_id, `order`, language_id, \
         file_server_type, file_bucket, file_path, status, submitted_at, checked_at \
         FROM submissions WHERE id = ?",
    )
    .bind(submission_id)
    .fetch_optional(executor)
    .await?
    .ok_or(CoreError::SubmissionNotFound(submission_id))?;

    Ok(row_to_submission(row))
}

pub async fn set_status<'c, E>(executor: E, submission_id: u64, status: SubmissionStatus) -> CoreResult<()>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    sqlx::query("UPDATE submissions SET status = ? WHERE id = ?")
        .bind(status_str(status))
        .bind(submission_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn has_result<'c, E>(executor: E, submission_id: u64) -> CoreResult<bool>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let row = sqlx::query("SELECT 1 FROM submission_results WHERE submission_id = ?")
        .bind(submission_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

pub struct TestResultInput {
    pub test_case_id: u64,
    pub passed: bool,
    pub status_code: TestStatus,
    pub execution_time_s: f64,
    pub peak_memory_kb: u64,
    pub error_message: Option<String>,
    pub stdout_ref: FileLocation,
    pub stderr_ref: FileLocation,
    pub diff_ref: FileLocation,
}

/// Persists a `SubmissionResult` plus one `TestResult` per entry, and
/// advances the submission to `evaluated` with `checked_at = now`. All
/// three writes share the caller's transaction.
pub async fn create_submission_result(
    tx: &mut sqlx::Transaction<'_, MySql>,
    submission_id: u64,
    code: ResultCode,
    message: &str,
    tests: &[TestResultInput],
) -> CoreResult<u64> {
    let result_id = sqlx::query(
        "INSERT INTO submission_results (submission_id, code, message) VALUES (?, ?, ?)",
    )
    .bind(submission_id)
    .bind(code.as_u8())
    .bind(message)
    .execute(&mut **tx)
    .await?
    .last_insert_id();

    for test in tests {
        sqlx::query(
            "INSERT INTO test_results \
             (submission_result_id, test_case_id, passed, status_code, execution_time_s, peak_memory_kb, error_message, \
              stdout_server_type, stdout_bucket, stdout_path, \
              stderr_server_type, stderr_bucket, stderr_path, \
              diff_server_type, diff_bucket, diff_path) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(result_id)
        .bind(test.test_case_id)
        .bind(test.passed)
        .bind(test.status_code.as_u8())
        .bind(test.execution_time_s)
        .bind(test.peak_memory_kb)
        .bind(&test.error_message)
        .bind(&test.stdout_ref.server_type)
        .bind(&test.stdout_ref.bucket)
        .bind(&test.stdout_ref.path)
        .bind(&test.stderr_ref.server_type)
        .bind(&test.stderr_ref.bucket)
        .bind(&test.stderr_ref.path)
        .bind(&test.diff_ref.server_type)
        .bind(&test.diff_ref.bucket)
        .bind(&test.diff_ref.path)
        .execute(&mut **tx)
        .await?;
    }

    sqlx::query("UPDATE submissions SET status = 'evaluated', checked_at = NOW() WHERE id = ?")
        .bind(submission_id)
        .execute(&mut **tx)
        .await?;

    Ok(result_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in [
            SubmissionStatus::Received,
            SubmissionStatus::SentForEvaluation,
            SubmissionStatus::Evaluated,
            SubmissionStatus::Lost,
        ] {
            assert_eq!(parse_status(status_str(status)), status);
        }
    }

    #[test]
    fn unrecognized_status_string_falls_back_to_received() {
        assert_eq!(parse_status("garbage"), SubmissionStatus::Received);
    }
}
