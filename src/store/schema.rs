use anyhow::Result;
use sqlx::{MySql, Pool};

pub async fn initialize_schema(pool: &Pool<MySql>) -> Result<()> {
    log::info!("Initializing database schema...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            task_id BIGINT UNSIGNED NOT NULL,
            user_id BIGINT UNSIGNED NOT NULL,
            contest_id BIGINT UNSIGNED NULL,
            `order` INT UNSIGNED NOT NULL,
            language_id BIGINT UNSIGNED NOT NULL,
            file_server_type VARCHAR(64) NOT NULL,
            file_bucket VARCHAR(255) NOT NULL,
            file_path VARCHAR(1024) NOT NULL,
            status VARCHAR(32) NOT NULL DEFAULT 'received',
            submitted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            checked_at TIMESTAMP NULL,
            INDEX idx_task_id (task_id),
            INDEX idx_user_id (user_id),
            INDEX idx_status (status)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_cases (
            id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            task_id BIGINT UNSIGNED NOT NULL,
            `order` INT UNSIGNED NOT NULL,
            input_server_type VARCHAR(64) NOT NULL,
            input_bucket VARCHAR(255) NOT NULL,
            input_path VARCHAR(1024) NOT NULL,
            output_server_type VARCHAR(64) NOT NULL,
            output_bucket VARCHAR(255) NOT NULL,
            output_path VARCHAR(1024) NOT NULL,
            time_limit_ms INT UNSIGNED NOT NULL,
            memory_limit_kb BIGINT UNSIGNED NOT NULL,
            UNIQUE KEY uq_task_order (task_id, `order`),
            INDEX idx_task_id (task_id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submission_results (
            id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            submission_id BIGINT UNSIGNED NOT NULL UNIQUE,
            code TINYINT UNSIGNED NOT NULL,
            message TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (submission_id) REFERENCES submissions(id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_results (
            id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            submission_result_id BIGINT UNSIGNED NOT NULL,
            test_case_id BIGINT UNSIGNED NOT NULL,
            passed BOOLEAN NOT NULL,
            status_code TINYINT UNSIGNED NOT NULL,
            execution_time_s DOUBLE NOT NULL,
            peak_memory_kb BIGINT UNSIGNED NOT NULL,
            error_message TEXT NULL,
            stdout_server_type VARCHAR(64) NULL,
            stdout_bucket VARCHAR(255) NULL,
            stdout_path VARCHAR(1024) NULL,
            stderr_server_type VARCHAR(64) NULL,
            stderr_bucket VARCHAR(255) NULL,
            stderr_path VARCHAR(1024) NULL,
            diff_server_type VARCHAR(64) NULL,
            diff_bucket VARCHAR(255) NULL,
            diff_path VARCHAR(1024) NULL,
            UNIQUE KEY uq_result_case (submission_result_id, test_case_id),
            FOREIGN KEY (submission_result_id) REFERENCES submission_results(id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS language_configs (
            id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            `type` VARCHAR(64) NOT NULL,
            version VARCHAR(64) NOT NULL,
            extension VARCHAR(32) NOT NULL,
            disabled BOOLEAN NOT NULL DEFAULT FALSE,
            UNIQUE KEY uq_type_version (`type`, version)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_correlations (
            message_id VARCHAR(32) NOT NULL PRIMARY KEY,
            submission_id BIGINT UNSIGNED NOT NULL,
            published_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            priority TINYINT UNSIGNED NOT NULL,
            INDEX idx_submission_id (submission_id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#,
    )
    .execute(pool)
    .await?;

    log::info!("Database schema initialized successfully");
    Ok(())
}
