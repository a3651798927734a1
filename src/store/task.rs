use sqlx::{MySql, Row};

use crate::error::CoreResult;
use crate::models::{FileLocation, TestCase};

/// Reads a task's test cases in `order` ascending. The `order` column is
/// contiguous `[1..n]` per task by construction; callers must not assume
/// that here, only that iteration order matches ascending `order`.
pub async fn test_cases_for_task<'c, E>(executor: E, task_id: u64) -> CoreResult<Vec<TestCase>>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let rows = sqlx::query(
        "SELECT id, task_id, `order`, input_server_type, input_bucket, input_path, \
         output_server_type, output_bucket, output_path, time_limit_ms, memory_limit_kb \
         FROM test_cases WHERE task_id = ? ORDER BY `order` ASC",
    )
    .bind(task_id)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TestCase {
            id: row.get::<u64, _>("id"),
            task_id: row.get::<u64, _>("task_id"),
            order: row.get::<u32, _>("order"),
            input_ref: FileLocation {
                server_type: row.get("input_server_type"),
                bucket: row.get("input_bucket"),
                path: row.get("input_path"),
            },
            output_ref: FileLocation {
                server_type: row.get("output_server_type"),
                bucket: row.get("output_bucket"),
                path: row.get("output_path"),
            },
            time_limit_ms: row.get::<u32, _>("time_limit_ms"),
            memory_limit_kb: row.get::<u64, _>("memory_limit_kb"),
        })
        .collect())
}
