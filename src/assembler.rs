use sqlx::MySql;

use crate::broker::messages::{TaskQueueMessage, TestCaseMessage};
use crate::error::{CoreError, CoreResult};
use crate::file_locator::FileLocator;
use crate::models::Submission;
use crate::store::{language, task};

/// Builds a self-contained worker job from an already-loaded submission:
/// its task's test cases (in `order` ascending), the language config, and
/// a reserved output location per test case. Runs inside the caller's
/// transaction so the read set is consistent with the status check
/// around it (the submission row itself is loaded by the caller, since
/// that load is also where the `received` status check happens).
pub async fn build_job(
    tx: &mut sqlx::Transaction<'_, MySql>,
    sub: &Submission,
    file_locator: &dyn FileLocator,
) -> CoreResult<TaskQueueMessage> {
    let lang = language::find_by_id(&mut **tx, sub.language_id)
        .await?
        .ok_or(CoreError::UnknownLanguage(sub.language_id))?;

    let cases = task::test_cases_for_task(&mut **tx, sub.task_id).await?;
    if cases.is_empty() {
        return Err(CoreError::TaskNotReady(sub.task_id));
    }

    let mut test_cases = Vec::with_capacity(cases.len());
    for case in cases {
        let (stdout_result, stderr_result, diff_result) =
            file_locator.reserve_result_files(sub.task_id, sub.user_id, sub.order, case.order);

        test_cases.push(TestCaseMessage {
            order: case.order,
            input_file: case.input_ref,
            expected_output: case.output_ref,
            stdout_result,
            stderr_result,
            diff_result,
            time_limit_ms: case.time_limit_ms,
            memory_limit_kb: case.memory_limit_kb,
        });
    }

    Ok(TaskQueueMessage {
        order: sub.order,
        language_type: lang.r#type,
        language_version: lang.version,
        submission_file: sub.file_ref.clone(),
        test_cases,
    })
}
