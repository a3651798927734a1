use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{Stream, StreamExt};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Mutex as StdMutex;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};

const RECONNECT_TICK: Duration = Duration::from_secs(60);

/// Per-connection-attempt state, per the supervisor's state machine. A
/// failure in any of the last three states must unwind the resources
/// already opened, in reverse acquisition order, before returning to
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Dialing,
    ChannelsOpening,
    QueuesDeclaring,
    Ready,
}

impl ConnectionState {
    /// Resources open when failure strikes in this state, oldest-last
    /// (i.e. already in teardown order).
    pub fn opened_resources(self) -> &'static [&'static str] {
        match self {
            ConnectionState::Disconnected | ConnectionState::Dialing => &[],
            ConnectionState::ChannelsOpening => &["connection"],
            ConnectionState::QueuesDeclaring | ConnectionState::Ready => {
                &["consume_channel", "publish_channel", "connection"]
            }
        }
    }
}

/// A single inbound message, carrying what's needed to ack/reject it
/// later without exposing the underlying `lapin` channel.
pub struct Delivery {
    pub body: Vec<u8>,
    pub reply_to: Option<String>,
    channel: Channel,
    delivery_tag: u64,
}

impl Delivery {
    pub async fn ack(&self) -> Result<(), lapin::Error> {
        self.channel
            .basic_ack(self.delivery_tag, BasicAckOptions::default())
            .await
    }

    /// Dead-letter semantics: reject without requeue.
    pub async fn reject_no_requeue(&self) -> Result<(), lapin::Error> {
        self.channel
            .basic_reject(
                self.delivery_tag,
                BasicRejectOptions { requeue: false },
            )
            .await
    }

    /// Reject but ask the broker to requeue — used by the bounded
    /// transient-store-error retry path.
    pub async fn reject_requeue(&self) -> Result<(), lapin::Error> {
        self.channel
            .basic_reject(self.delivery_tag, BasicRejectOptions { requeue: true })
            .await
    }
}

pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;
type ReconnectHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Always-healing connection to the broker. Maintains two independent
/// channels — publish and consume — so a stalled consumer can never
/// back-pressure a producer, and vice versa.
pub struct BrokerClient {
    url: String,
    worker_queue: String,
    response_queue: String,

    connection: RwLock<Option<Connection>>,
    publish_channel: RwLock<Option<Channel>>,
    consume_channel: RwLock<Option<Channel>>,

    connected: AtomicBool,
    reconnect_hooks: Mutex<Vec<ReconnectHook>>,
    shutdown: StdMutex<Option<oneshot::Sender<()>>>,
}

impl BrokerClient {
    pub fn new(url: impl Into<String>, worker_queue: impl Into<String>, response_queue: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            worker_queue: worker_queue.into(),
            response_queue: response_queue.into(),
            connection: RwLock::new(None),
            publish_channel: RwLock::new(None),
            consume_channel: RwLock::new(None),
            connected: AtomicBool::new(false),
            reconnect_hooks: Mutex::new(Vec::new()),
            shutdown: StdMutex::new(None),
        })
    }

    /// Non-blocking. Spawns the background supervisor; returns immediately
    /// regardless of whether the first connection attempt succeeds.
    pub fn start(self: &Arc<Self>, cancellation: CancellationToken) {
        let (tx, rx) = oneshot::channel();
        *self.shutdown.lock().unwrap() = Some(tx);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.supervise(rx, cancellation).await;
        });
    }

    /// Idempotent intent, but a second call is a programming error: the
    /// shutdown channel can only be closed once.
    pub async fn shutdown(&self) {
        let sender = self
            .shutdown
            .lock()
            .unwrap()
            .take()
            .expect("broker client shut down twice");
        let _ = sender.send(());
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Registers a callback invoked after a successful *reconnect* (the
    /// initial connection never fires it). Each invocation runs on its
    /// own task so a slow hook cannot stall the supervisor.
    pub async fn on_reconnect<F>(&self, hook: F)
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.reconnect_hooks.lock().await.push(Arc::new(hook));
    }

    pub async fn publish(
        &self,
        queue: &str,
        reply_to: &str,
        body: &[u8],
        priority: u8,
    ) -> CoreResult<()> {
        let channel = {
            let guard = self.publish_channel.read().await;
            guard.clone().ok_or(CoreError::ChannelUnavailable)?
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_reply_to(reply_to.into())
            .with_priority(priority);

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// Lazily consumes `queue` with manual acknowledgement. Each item is
    /// ack/reject-able through `Delivery`.
    pub async fn consume(&self, queue: &str) -> CoreResult<DeliveryStream> {
        let channel = {
            let guard = self.consume_channel.read().await;
            guard.clone().ok_or(CoreError::ChannelUnavailable)?
        };

        let consumer = channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(CoreError::from)?;

        let channel_for_stream = channel.clone();
        let stream = consumer.into_stream().filter_map(move |delivery_result| {
            let channel = channel_for_stream.clone();
            async move {
                match delivery_result {
                    Ok(delivery) => Some(Delivery {
                        body: delivery.data.clone(),
                        reply_to: delivery.properties.reply_to().as_ref().map(|s| s.to_string()),
                        channel,
                        delivery_tag: delivery.delivery_tag,
                    }),
                    Err(e) => {
                        log::error!("error receiving delivery from {}: {}", queue, e);
                        None
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn supervise(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(RECONNECT_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut is_first_attempt = true;

        loop {
            if !is_first_attempt {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut shutdown_rx => {
                        log::info!("broker supervisor shutting down");
                        break;
                    }
                    _ = cancellation.cancelled() => {
                        log::info!("broker supervisor cancelled");
                        break;
                    }
                }
            }

            if !self.is_connected() {
                match Arc::clone(&self).connect_once().await {
                    Ok(()) => {
                        self.connected.store(true, Ordering::SeqCst);
                        if !is_first_attempt {
                            self.fire_reconnect_hooks().await;
                        }
                        log::info!("broker connection ready");
                    }
                    Err(e) => {
                        log::warn!("broker (re)connect failed, retrying in {:?}: {}", RECONNECT_TICK, e);
                    }
                }
            }

            is_first_attempt = false;
        }

        self.close_resources().await;
    }

    /// Dials, opens both channels, and declares both queues. Takes an
    /// owned `Arc<Self>` (rather than `&self`) so the connection's error
    /// callback can hold a `Weak` handle back and flip `connected` to
    /// `false` the moment the broker drops the connection from under
    /// us — otherwise a `Ready` connection that dies has no path back to
    /// `Disconnected` and the supervisor's "already connected" gate never
    /// re-fires `connect_once`.
    async fn connect_once(self: Arc<Self>) -> Result<(), lapin::Error> {
        let mut state = ConnectionState::Dialing;
        let connection = match Connection::connect(&self.url, ConnectionProperties::default()).await {
            Ok(c) => c,
            Err(e) => return Err(e),
        };
        let weak_self: Weak<Self> = Arc::downgrade(&self);
        connection.on_error(move |err| {
            log::warn!("broker connection error: {}", err);
            if let Some(this) = weak_self.upgrade() {
                this.connected.store(false, Ordering::SeqCst);
            }
        });

        state = ConnectionState::ChannelsOpening;
        let publish_channel = match connection.create_channel().await {
            Ok(c) => c,
            Err(e) => {
                self.rollback(state, Some(connection), None, None).await;
                return Err(e);
            }
        };
        let consume_channel = match connection.create_channel().await {
            Ok(c) => c,
            Err(e) => {
                // Both channels count as "ChannelsOpening" here since the
                // publish channel above already succeeded — fall through
                // to the coarser QueuesDeclaring teardown list, which is a
                // superset and closes everything opened so far.
                state = ConnectionState::QueuesDeclaring;
                self.rollback(state, Some(connection), Some(publish_channel), None).await;
                return Err(e);
            }
        };

        state = ConnectionState::QueuesDeclaring;
        if let Err(e) = Self::declare_queues(&publish_channel, &self.worker_queue, &self.response_queue).await {
            self.rollback(state, Some(connection), Some(publish_channel), Some(consume_channel)).await;
            return Err(e);
        }

        *self.connection.write().await = Some(connection);
        *self.publish_channel.write().await = Some(publish_channel);
        *self.consume_channel.write().await = Some(consume_channel);
        Ok(())
    }

    async fn declare_queues(channel: &Channel, worker_queue: &str, response_queue: &str) -> Result<(), lapin::Error> {
        let mut args = FieldTable::default();
        args.insert("x-max-priority".into(), AMQPValue::ShortShortUInt(3));

        for queue in [worker_queue, response_queue] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        exclusive: false,
                        auto_delete: false,
                        ..Default::default()
                    },
                    args.clone(),
                )
                .await?;
        }
        Ok(())
    }

    /// Closes whatever was opened so far, in reverse order, per the
    /// `ConnectionState::opened_resources` teardown table.
    async fn rollback(
        &self,
        state: ConnectionState,
        connection: Option<Connection>,
        publish_channel: Option<Channel>,
        consume_channel: Option<Channel>,
    ) {
        for resource in state.opened_resources() {
            match *resource {
                "consume_channel" => {
                    if let Some(ch) = &consume_channel {
                        let _ = ch.close(200, "rollback").await;
                    }
                }
                "publish_channel" => {
                    if let Some(ch) = &publish_channel {
                        let _ = ch.close(200, "rollback").await;
                    }
                }
                "connection" => {
                    if let Some(conn) = &connection {
                        let _ = conn.close(200, "rollback").await;
                    }
                }
                _ => {}
            }
        }
    }

    async fn close_resources(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(ch) = self.consume_channel.write().await.take() {
            let _ = ch.close(200, "shutdown").await;
        }
        if let Some(ch) = self.publish_channel.write().await.take() {
            let _ = ch.close(200, "shutdown").await;
        }
        if let Some(conn) = self.connection.write().await.take() {
            let _ = conn.close(200, "shutdown").await;
        }
    }

    async fn fire_reconnect_hooks(&self) {
        let hooks = self.reconnect_hooks.lock().await.clone();
        for hook in hooks {
            tokio::spawn(async move {
                hook().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_order_matches_acquisition_depth() {
        assert!(ConnectionState::Disconnected.opened_resources().is_empty());
        assert!(ConnectionState::Dialing.opened_resources().is_empty());
        assert_eq!(ConnectionState::ChannelsOpening.opened_resources(), &["connection"]);
        assert_eq!(
            ConnectionState::QueuesDeclaring.opened_resources(),
            &["consume_channel", "publish_channel", "connection"]
        );
        assert_eq!(
            ConnectionState::Ready.opened_resources(),
            &["consume_channel", "publish_channel", "connection"]
        );
    }
}
