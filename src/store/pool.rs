use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{pool::PoolOptions, MySql, Pool};

use crate::config::Config;

const MAX_RETRIES: u32 = 10;
const INITIAL_RETRY_DELAY_SECS: u64 = 2;
const MAX_RETRY_DELAY_SECS: u64 = 30;

pub async fn create_pool(config: &Config) -> Result<Pool<MySql>> {
    let database_url = config.database_url();
    log::info!(
        "Connecting to MySQL at {}:{}/{} (password hidden)",
        config.db_host, config.db_port, config.db_name
    );

    let mut last_error = None;

    for attempt in 1..=MAX_RETRIES {
        let pool_options = PoolOptions::<MySql>::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800));

        match pool_options.connect(&database_url).await {
            Ok(pool) => match sqlx::query("SELECT 1").fetch_one(&pool).await {
                Ok(_) => {
                    log::info!("Database connection established on attempt {}", attempt);
                    return Ok(pool);
                }
                Err(e) => {
                    log::warn!("Connection pool created but test query failed: {}", e);
                    last_error = Some(anyhow::anyhow!("{}", e));
                }
            },
            Err(e) => {
                log::warn!("Connection attempt {} of {} failed: {}", attempt, MAX_RETRIES, e);
                last_error = Some(anyhow::anyhow!("{}", e));
            }
        }

        if attempt < MAX_RETRIES {
            let delay_secs = std::cmp::min(
                INITIAL_RETRY_DELAY_SECS * (1u64 << (attempt - 1)),
                MAX_RETRY_DELAY_SECS,
            );
            log::info!("Waiting {} seconds before next attempt...", delay_secs);
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("failed to connect after {} attempts", MAX_RETRIES)))
        .context("failed to establish database connection after all retries")
}
