use sqlx::{MySql, Row};

use crate::error::CoreResult;

/// Durable `message_id ⇄ submission_id` mapping. A listener restart must
/// still be able to resolve in-flight replies, so this table is never an
/// in-memory cache.
pub async fn put<'c, E>(executor: E, message_id: &str, submission_id: u64, priority: u8) -> CoreResult<()>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    sqlx::query(
        "INSERT INTO queue_correlations (message_id, submission_id, priority) VALUES (?, ?, ?)",
    )
    .bind(message_id)
    .bind(submission_id)
    .bind(priority)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_submission_id<'c, E>(executor: E, message_id: &str) -> CoreResult<Option<u64>>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let row = sqlx::query("SELECT submission_id FROM queue_correlations WHERE message_id = ?")
        .bind(message_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|r| r.get::<u64, _>("submission_id")))
}

/// Retention is not strictly required for correctness — stale rows are
/// harmless — but deleting keeps the table from growing unbounded.
pub async fn delete<'c, E>(executor: E, message_id: &str) -> CoreResult<()>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    sqlx::query("DELETE FROM queue_correlations WHERE message_id = ?")
        .bind(message_id)
        .execute(executor)
        .await?;
    Ok(())
}
