use std::sync::Arc;

use serde_json::json;
use sqlx::MySqlPool;

use crate::broker::messages::QueueMessage;
use crate::broker::BrokerClient;
use crate::error::{CoreError, CoreResult};
use crate::file_locator::FileLocator;
use crate::models::SubmissionStatus;
use crate::store::{correlation, submission};
use crate::assembler;

/// Ids above this ceiling cannot round-trip through a decimal `message_id`
/// within the 63-bit budget the reference implementation assumes. See
/// DESIGN.md for the resolution of this open question.
pub const MAX_SUBMISSION_ID: u64 = (1u64 << 62) - 1;

pub struct DispatchService {
    pool: MySqlPool,
    broker: Arc<BrokerClient>,
    file_locator: Arc<dyn FileLocator>,
    worker_queue: String,
    response_queue: String,
}

impl DispatchService {
    pub fn new(
        pool: MySqlPool,
        broker: Arc<BrokerClient>,
        file_locator: Arc<dyn FileLocator>,
        worker_queue: impl Into<String>,
        response_queue: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            broker,
            file_locator,
            worker_queue: worker_queue.into(),
            response_queue: response_queue.into(),
        }
    }

    /// Persist-then-publish. A publish failure rolls the whole
    /// transaction back, leaving the submission `received` so a later
    /// retry is possible; at-most-once dispatch comes from the store's
    /// `message_id` uniqueness and the forward-only status transition,
    /// not from any in-process lock.
    pub async fn dispatch(&self, submission_id: u64, priority: u8) -> CoreResult<String> {
        if priority > 3 {
            return Err(CoreError::IllegalState(submission_id));
        }
        if submission_id > MAX_SUBMISSION_ID {
            return Err(CoreError::SubmissionIdOverflow(submission_id));
        }

        let mut tx = self.pool.begin().await?;

        let sub = submission::load_for_update(&mut *tx, submission_id).await?;
        if sub.status != SubmissionStatus::Received {
            return Err(CoreError::IllegalState(submission_id));
        }

        let job = assembler::build_job(&mut tx, &sub, self.file_locator.as_ref()).await?;
        let message_id = submission_id.to_string();

        correlation::put(&mut *tx, &message_id, submission_id, priority).await?;

        let envelope = QueueMessage {
            r#type: "task".to_string(),
            message_id: message_id.clone(),
            payload: serde_json::to_value(&job)?,
        };
        let body = serde_json::to_vec(&envelope)?;

        if let Err(e) = self
            .broker
            .publish(&self.worker_queue, &self.response_queue, &body, priority)
            .await
        {
            log::warn!("dispatch publish failed for submission {}: {}", submission_id, e);
            tx.rollback().await?;
            return Err(e);
        }

        submission::set_status(&mut *tx, submission_id, SubmissionStatus::SentForEvaluation).await?;
        tx.commit().await?;

        Ok(message_id)
    }

    /// Fire-and-forget: prompts the worker fleet to re-announce its
    /// language set. Called after every broker reconnect.
    pub async fn publish_handshake(&self) {
        let envelope = QueueMessage {
            r#type: "handshake".to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            payload: json!({}),
        };
        self.publish_probe(envelope).await;
    }

    /// Fire-and-forget: asks the worker fleet to report its current load.
    pub async fn publish_status_request(&self) {
        let envelope = QueueMessage {
            r#type: "status".to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            payload: json!({}),
        };
        self.publish_probe(envelope).await;
    }

    async fn publish_probe(&self, envelope: QueueMessage) {
        let body = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                log::error!("failed to encode {} probe: {}", envelope.r#type, e);
                return;
            }
        };
        if let Err(e) = self
            .broker
            .publish(&self.worker_queue, &self.response_queue, &body, 0)
            .await
        {
            log::warn!("failed to publish {} probe: {}", envelope.r#type, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_id_ceiling_matches_the_spec_open_question() {
        assert_eq!(MAX_SUBMISSION_ID, (1u64 << 62) - 1);
        assert!(MAX_SUBMISSION_ID < (1u64 << 62));
    }
}
