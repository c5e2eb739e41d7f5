use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use super::{BusError, Delivery, MessageBus, Outcome, QueueConsumer};

// ============================================================================
// AMQP Bus - production implementation over lapin
// ============================================================================
//
// One connection per process. Publishing goes through a dedicated channel
// with publisher confirms enabled, so Ok from publish means the broker has
// the message durably. Each consumer gets its own channel because prefetch
// (basic.qos) is channel-scoped.
//
// ============================================================================

pub struct AmqpBus {
    connection: Connection,
    publish_channel: Channel,
}

fn operation_error(error: lapin::Error) -> BusError {
    BusError::Operation(error.to_string())
}

impl AmqpBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let publish_channel = connection
            .create_channel()
            .await
            .map_err(operation_error)?;
        publish_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(operation_error)?;

        tracing::info!(%url, "Connected to AMQP broker");
        Ok(Self {
            connection,
            publish_channel,
        })
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn declare_fanout(&self, exchange: &str) -> Result<(), BusError> {
        self.publish_channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(operation_error)?;
        tracing::debug!(exchange, "Declared durable fanout exchange");
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
        self.publish_channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(operation_error)?;
        tracing::debug!(queue, "Declared durable queue");
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str) -> Result<(), BusError> {
        self.publish_channel
            .queue_bind(
                queue,
                exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(operation_error)?;
        tracing::debug!(queue, exchange, "Bound queue to exchange");
        Ok(())
    }

    async fn publish(&self, exchange: &str, payload: &[u8]) -> Result<(), BusError> {
        let confirmation = self
            .publish_channel
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(operation_error)?
            .await
            .map_err(operation_error)?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(BusError::Operation(format!(
                "broker refused publish to {exchange}"
            )));
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Box<dyn QueueConsumer>, BusError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(operation_error)?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(operation_error)?;

        let consumer = channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(operation_error)?;

        tracing::info!(queue, prefetch, "Consuming from queue");
        Ok(Box::new(AmqpConsumer {
            _channel: channel,
            inner: consumer,
            unsettled: HashMap::new(),
        }))
    }
}

struct AmqpConsumer {
    // Held so the channel (and its qos) outlives the consumer stream.
    _channel: Channel,
    inner: lapin::Consumer,
    unsettled: HashMap<u64, Acker>,
}

#[async_trait]
impl QueueConsumer for AmqpConsumer {
    async fn next_delivery(&mut self) -> Result<Delivery, BusError> {
        let delivery = self
            .inner
            .next()
            .await
            .ok_or(BusError::Closed)?
            .map_err(operation_error)?;

        let tag = delivery.delivery_tag;
        self.unsettled.insert(tag, delivery.acker);
        Ok(Delivery {
            payload: delivery.data,
            redelivered: delivery.redelivered,
            tag,
        })
    }

    async fn settle(&mut self, tag: u64, outcome: Outcome) -> Result<(), BusError> {
        let acker = self
            .unsettled
            .remove(&tag)
            .ok_or_else(|| BusError::Operation(format!("unknown delivery tag {tag}")))?;

        match outcome {
            Outcome::Ack => acker.ack(BasicAckOptions::default()).await,
            Outcome::Requeue => {
                acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
            }
            Outcome::Reject => {
                acker
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
            }
        }
        .map_err(operation_error)
    }
}
