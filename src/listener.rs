use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::StreamExt;
use futures_util::FutureExt;
use sqlx::MySqlPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::broker::messages::{
    HandShakeResponsePayload, QueueResponseMessage, StatusResponsePayload, TaskResponsePayload,
};
use crate::broker::{BrokerClient, Delivery};
use crate::dispatch::DispatchService;
use crate::error::{CoreError, CoreResult};
use crate::file_locator::FileLocator;
use crate::models::{ResultCode, TestStatus, WorkerFleetSnapshot, WorkerSnapshotEntry};
use crate::status_cache::WorkerStatusCache;
use crate::store::submission::{self, TestResultInput};
use crate::store::{correlation, task};

const MAX_REQUEUE_ATTEMPTS: u32 = 3;

enum Outcome {
    Ack,
    RejectNoRequeue,
    RejectRequeue,
}

/// Consumes the response queue and reconciles each delivery against the
/// submission store, language registry, or worker status cache depending
/// on message type. One task, sequential handlers — per-submission
/// ordering within a single consumer is preserved by construction.
pub struct ResponseListener {
    pool: MySqlPool,
    broker: Arc<BrokerClient>,
    response_queue: String,
    status_cache: WorkerStatusCache,
    file_locator: Arc<dyn FileLocator>,
    requeue_attempts: Mutex<HashMap<String, u32>>,
}

impl ResponseListener {
    pub fn new(
        pool: MySqlPool,
        broker: Arc<BrokerClient>,
        response_queue: impl Into<String>,
        status_cache: WorkerStatusCache,
        file_locator: Arc<dyn FileLocator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            broker,
            response_queue: response_queue.into(),
            status_cache,
            file_locator,
            requeue_attempts: Mutex::new(HashMap::new()),
        })
    }

    /// Registers the reconnect hook (handshake re-announce) and spawns
    /// the supervisor loop. Non-blocking.
    pub fn start(self: &Arc<Self>, dispatch: Arc<DispatchService>, cancellation: CancellationToken) {
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            broker
                .on_reconnect(move || {
                    let dispatch = Arc::clone(&dispatch);
                    async move {
                        dispatch.publish_handshake().await;
                    }
                    .boxed()
                })
                .await;
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(cancellation).await;
        });
    }

    async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        loop {
            if cancellation.is_cancelled() {
                return;
            }

            if !self.broker.is_connected() {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = cancellation.cancelled() => return,
                }
                continue;
            }

            let mut stream = match self.broker.consume(&self.response_queue).await {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("listener failed to start consuming: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            loop {
                tokio::select! {
                    next = stream.next() => {
                        match next {
                            Some(delivery) => self.handle_one(delivery).await,
                            None => break,
                        }
                    }
                    _ = cancellation.cancelled() => return,
                }
            }
        }
    }

    async fn handle_one(&self, delivery: Delivery) {
        let outcome = AssertUnwindSafe(self.process(&delivery.body))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                log::error!("response handler panicked: {:?}", panic);
                Outcome::RejectNoRequeue
            });

        let ack_result = match outcome {
            Outcome::Ack => delivery.ack().await,
            Outcome::RejectNoRequeue => delivery.reject_no_requeue().await,
            Outcome::RejectRequeue => delivery.reject_requeue().await,
        };
        if let Err(e) = ack_result {
            log::error!("failed to ack/reject delivery: {}", e);
        }
    }

    async fn process(&self, body: &[u8]) -> Outcome {
        let envelope: QueueResponseMessage = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("rejecting malformed envelope: {}", e);
                return Outcome::RejectNoRequeue;
            }
        };

        match self.reconcile(&envelope).await.map_err(CoreError::classify_transient) {
            Ok(()) => {
                self.clear_attempts(&envelope.message_id).await;
                Outcome::Ack
            }
            Err(CoreError::AlreadyEvaluated(id)) => {
                log::info!("submission {} already evaluated, dropping duplicate delivery", id);
                self.clear_attempts(&envelope.message_id).await;
                Outcome::Ack
            }
            Err(CoreError::TransientStoreError(e)) => {
                let attempts = self.bump_attempts(&envelope.message_id).await;
                if attempts <= MAX_REQUEUE_ATTEMPTS {
                    log::warn!(
                        "transient store error for {} (attempt {}/{}): {}",
                        envelope.message_id, attempts, MAX_REQUEUE_ATTEMPTS, e
                    );
                    Outcome::RejectRequeue
                } else {
                    log::error!(
                        "giving up on {} after {} attempts: {}",
                        envelope.message_id, attempts, e
                    );
                    self.clear_attempts(&envelope.message_id).await;
                    Outcome::RejectNoRequeue
                }
            }
            Err(e) => {
                log::error!("rejecting {} ({}): {}", envelope.message_id, envelope.r#type, e);
                self.clear_attempts(&envelope.message_id).await;
                Outcome::RejectNoRequeue
            }
        }
    }

    async fn bump_attempts(&self, message_id: &str) -> u32 {
        let mut attempts = self.requeue_attempts.lock().await;
        let count = attempts.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    async fn clear_attempts(&self, message_id: &str) {
        self.requeue_attempts.lock().await.remove(message_id);
    }

    async fn reconcile(&self, envelope: &QueueResponseMessage) -> CoreResult<()> {
        match envelope.r#type.as_str() {
            "task" => self.reconcile_task(envelope).await,
            "handshake" => self.reconcile_handshake(envelope).await,
            "status" => self.reconcile_status(envelope).await,
            other => Err(CoreError::MalformedMessage(format!("unknown message type '{}'", other))),
        }
    }

    async fn reconcile_task(&self, envelope: &QueueResponseMessage) -> CoreResult<()> {
        let submission_id: u64 = envelope.message_id.parse().map_err(|_| {
            CoreError::MalformedMessage(format!("non-numeric message_id '{}'", envelope.message_id))
        })?;

        if submission::has_result(&self.pool, submission_id).await? {
            return Err(CoreError::AlreadyEvaluated(submission_id));
        }

        let payload: TaskResponsePayload = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| CoreError::MalformedMessage(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        if submission::has_result(&mut *tx, submission_id).await? {
            tx.rollback().await?;
            return Err(CoreError::AlreadyEvaluated(submission_id));
        }

        let sub = submission::load_for_update(&mut *tx, submission_id).await?;
        let cases = task::test_cases_for_task(&mut *tx, sub.task_id).await?;
        let case_id_by_order: HashMap<u32, u64> = cases.into_iter().map(|c| (c.order, c.id)).collect();

        let code = ResultCode::from_wire(payload.status_code.clamp(0, 255) as u8);
        let mut tests = Vec::with_capacity(payload.test_results.len());
        for entry in &payload.test_results {
            let test_case_id = *case_id_by_order.get(&entry.order).ok_or_else(|| {
                CoreError::MalformedMessage(format!("unknown test case order {}", entry.order))
            })?;
            let (stdout_ref, stderr_ref, diff_ref) = self.file_locator.reserve_result_files(
                sub.task_id,
                sub.user_id,
                sub.order,
                entry.order,
            );
            tests.push(TestResultInput {
                test_case_id,
                passed: entry.passed,
                status_code: TestStatus::from(entry.status_code.clamp(0, 255) as u8),
                execution_time_s: entry.execution_time,
                peak_memory_kb: entry.peak_memory,
                error_message: if entry.error_message.is_empty() {
                    None
                } else {
                    Some(entry.error_message.clone())
                },
                stdout_ref,
                stderr_ref,
                diff_ref,
            });
        }

        submission::create_submission_result(&mut tx, submission_id, code, &payload.message, &tests).await?;
        correlation::delete(&mut *tx, &envelope.message_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reconcile_handshake(&self, envelope: &QueueResponseMessage) -> CoreResult<()> {
        let payload: HandShakeResponsePayload = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| CoreError::MalformedMessage(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        crate::store::language::upsert_from_handshake(&mut tx, &payload.languages).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reconcile_status(&self, envelope: &QueueResponseMessage) -> CoreResult<()> {
        let payload: StatusResponsePayload = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| CoreError::MalformedMessage(e.to_string()))?;

        let workers = payload
            .worker_status
            .into_iter()
            .map(|w| WorkerSnapshotEntry {
                id: w.worker_id,
                status: w.status.into(),
                processing_message_id: w.processing_message_id,
            })
            .collect();

        self.status_cache
            .replace(WorkerFleetSnapshot {
                busy: payload.busy_workers,
                total: payload.total_workers,
                workers,
                observed_at: Utc::now(),
            })
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_clamping_matches_wire_table() {
        assert_eq!(ResultCode::from_wire(0u8.clamp(0, 255)), ResultCode::Invalid);
        assert_eq!(ResultCode::from_wire(200i64.clamp(0, 255) as u8), ResultCode::Invalid);
    }
}
