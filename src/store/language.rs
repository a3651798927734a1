use sqlx::{MySql, Row};

use crate::broker::messages::LanguageAnnouncement;
use crate::error::CoreResult;
use crate::models::LanguageConfig;

pub async fn find_by_id<'c, E>(executor: E, language_id: u64) -> CoreResult<Option<LanguageConfig>>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let row = sqlx::query(
        "SELECT id, `type`, version, extension, disabled FROM language_configs WHERE id = ?",
    )
    .bind(language_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| LanguageConfig {
        id: row.get::<u64, _>("id"),
        r#type: row.get("type"),
        version: row.get("version"),
        extension: row.get("extension"),
        disabled: row.get("disabled"),
    }))
}

/// Reinitializes the registry from a handshake: upserts every announced
/// `(name, version)` with its extension, and disables anything that was
/// previously known but is no longer announced. An empty `languages`
/// list therefore disables every prior entry.
pub async fn upsert_from_handshake(
    tx: &mut sqlx::Transaction<'_, MySql>,
    languages: &[LanguageAnnouncement],
) -> CoreResult<()> {
    let mut announced_pairs: Vec<(String, String)> = Vec::new();

    for language in languages {
        for version in &language.versions {
            sqlx::query(
                "INSERT INTO language_configs (`type`, version, extension, disabled) \
                 VALUES (?, ?, ?, FALSE) \
                 ON DUPLICATE KEY UPDATE extension = VALUES(extension), disabled = FALSE",
            )
            .bind(&language.name)
            .bind(version)
            .bind(&language.extension)
            .execute(&mut **tx)
            .await?;
            announced_pairs.push((language.name.clone(), version.clone()));
        }
    }

    if announced_pairs.is_empty() {
        sqlx::query("UPDATE language_configs SET disabled = TRUE")
            .execute(&mut **tx)
            .await?;
        return Ok(());
    }

    let placeholders = announced_pairs
        .iter()
        .map(|_| "(`type` = ? AND version = ?)")
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!(
        "UPDATE language_configs SET disabled = TRUE WHERE NOT ({})",
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for (name, version) in &announced_pairs {
        query = query.bind(name).bind(version);
    }
    query.execute(&mut **tx).await?;

    Ok(())
}
