//! Publish account events on the broker and consume communication feedback.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::account::AccountService;
use crate::config::Messaging;
use crate::error::Result;

const CONNECTION_NAME: &str = "accounts_client";
const CONSUMER_TAG: &str = "accounts_communication_status";
const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/json";
const PERSISTENT: u8 = 2;

/// Logical destination of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Ask the message service to notify the account holder.
    Communication,
    /// Generic stream for downstream consumers.
    AccountCreated,
}

/// Outbound event channel.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Best-effort delivery. Returns whether the broker accepted the event.
    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> bool;
}

/// AMQP publisher. Without a connection every event is dropped and
/// reported as not delivered.
#[derive(Debug, Clone, Default)]
pub struct AmqpPublisher {
    conn: Option<Arc<Connection>>,
    communication_queue: String,
    created_queue: String,
    status_queue: String,
}

impl AmqpPublisher {
    /// Connect to the broker described by `config`.
    pub async fn new(config: &Messaging) -> Result<Self> {
        let properties = ConnectionProperties::default()
            .with_connection_name(CONNECTION_NAME.into());
        let conn = Connection::connect(&config.address, properties).await?;

        tracing::info!(queue = config.communication_queue, "rabbitmq connected");

        Ok(Self {
            conn: Some(Arc::new(conn)),
            communication_queue: config.communication_queue.clone(),
            created_queue: config.created_queue.clone(),
            status_queue: config.status_queue.clone(),
        })
    }

    fn queue(&self, topic: Topic) -> &str {
        match topic {
            Topic::Communication => &self.communication_queue,
            Topic::AccountCreated => &self.created_queue,
        }
    }

    async fn create_channel(conn: &Connection, queue: &str) -> Result<Channel> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    async fn try_publish(&self, topic: Topic, payload: &[u8]) -> Result<bool> {
        let Some(conn) = &self.conn else {
            tracing::debug!(?topic, "no broker configured, event dropped");
            return Ok(false);
        };
        let queue = self.queue(topic);
        let channel = Self::create_channel(conn, queue).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                event_properties(),
            )
            .await?
            .await?;

        let delivered = acknowledged(&confirmation);
        tracing::trace!(?topic, queue, delivered, "event sent");
        Ok(delivered)
    }

    /// Toggle the communication switch of every account number received on
    /// the status queue. Runs until the broker closes the consumer.
    pub async fn consume_status_updates(&self, service: AccountService) -> Result<()> {
        let Some(conn) = &self.conn else {
            return Ok(());
        };
        let channel = Self::create_channel(conn, &self.status_queue).await?;
        let mut consumer = channel
            .basic_consume(
                &self.status_queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue = self.status_queue, "listening for communication updates");

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;

            if let Err(err) = handle_status_update(&service, &delivery.data).await {
                tracing::warn!(error = %err, "communication update rejected");
            }

            delivery.ack(BasicAckOptions::default()).await?;
        }

        Ok(())
    }
}

/// JSON content, persisted by the broker on durable queues.
fn event_properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_encoding(CONTENT_ENCODING.into())
        .with_content_type(CONTENT_TYPE.into())
        .with_delivery_mode(PERSISTENT)
}

/// Only a broker ack counts as delivered. Nacks and channels without
/// confirms do not.
fn acknowledged(confirmation: &Confirmation) -> bool {
    matches!(confirmation, Confirmation::Ack(_))
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, topic: Topic, payload: Vec<u8>) -> bool {
        match self.try_publish(topic, &payload).await {
            Ok(delivered) => delivered,
            Err(err) => {
                tracing::warn!(?topic, error = %err, "failed to publish event");
                false
            },
        }
    }
}

/// Apply one communication-status message. The payload is the JSON account
/// number.
pub async fn handle_status_update(service: &AccountService, payload: &[u8]) -> Result<i64> {
    let account_number: i64 = serde_json::from_slice(payload)?;

    tracing::info!(account_number, "updating the communication status");
    service.update_communication_status(account_number).await?;

    Ok(account_number)
}

/// Publisher capturing events in-process.
#[cfg(test)]
pub mod testing {
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

    use super::*;

    pub struct RecordingPublisher {
        events: UnboundedSender<(Topic, Vec<u8>)>,
        delivered: bool,
    }

    impl RecordingPublisher {
        /// `delivered` is what every publish reports back.
        pub fn new(delivered: bool) -> (Self, UnboundedReceiver<(Topic, Vec<u8>)>) {
            let (events, receiver) = unbounded_channel();
            (Self { events, delivered }, receiver)
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, topic: Topic, payload: Vec<u8>) -> bool {
            let _ = self.events.send((topic, payload));
            self.delivered
        }
    }
}
