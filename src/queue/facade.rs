//! The broker operations, one function each.
//!
//! Every function is a single call into [`lapin`] with fixed parameters: there is no retry,
//! no reconnection and no recovery. Failures are returned as [`QueueError`]s.
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ExchangeKind, Queue,
};
use std::time::Duration;
use tracing::debug;

use crate::amqp::{configuration::QueueSettings, ConnectionFactory};
use crate::queue::{with_deadline, Deliveries, Operation, QueueError};

/// Content type attached to every published message.
pub const CONTENT_TYPE: &str = "text/html";

/// Deadline applied by [`publish`].
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Reply code sent to the broker when closing a channel or a connection.
const REPLY_SUCCESS: u16 = 200;

/// Dial the broker described by `settings`.
pub async fn connect(settings: &QueueSettings) -> Result<Connection, QueueError> {
    ConnectionFactory::new_from_config(settings)
        .new_connection()
        .await
}

/// Open a channel on `connection`.
///
/// Fails if the connection is closed or the broker refuses to allocate a channel.
#[tracing::instrument(level = "debug", skip(connection))]
pub async fn open_channel(connection: &Connection) -> Result<Channel, QueueError> {
    connection
        .create_channel()
        .await
        .map_err(|e| QueueError::Channel(e.into()))
}

/// Open a channel on `connection` and put it in confirm mode: every publish on it waits
/// for the broker to ack or nack the message.
#[tracing::instrument(level = "debug", skip(connection))]
pub async fn open_confirm_channel(connection: &Connection) -> Result<Channel, QueueError> {
    let channel = open_channel(connection).await?;
    channel
        .confirm_select(ConfirmSelectOptions { nowait: false })
        .await
        .map_err(|e| QueueError::Channel(e.into()))?;
    Ok(channel)
}

/// Declare a durable fanout exchange named `name`.
///
/// Declaring the same exchange twice is a no-op. Declaring a name that already exists with
/// another type fails, and the broker closes the channel.
#[tracing::instrument(level = "debug", skip(channel))]
pub async fn declare_exchange(channel: &Channel, name: &str) -> Result<(), QueueError> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                passive: false,
                durable: true,
                auto_delete: false,
                internal: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Declare {
            operation: Operation::DeclareExchange,
            entity: format!("exchange {name:?}"),
            source: e.into(),
        })
}

/// Declare an anonymous queue, named by the broker and exclusive to this connection.
///
/// The queue is not durable. It is not auto-deleted either: it goes away when the
/// declaring connection closes.
#[tracing::instrument(level = "debug", skip(channel))]
pub async fn declare_queue(channel: &Channel) -> Result<Queue, QueueError> {
    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                passive: false,
                durable: false,
                exclusive: true,
                auto_delete: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Declare {
            operation: Operation::DeclareQueue,
            entity: "an anonymous queue".into(),
            source: e.into(),
        })?;
    debug!(queue = queue.name().as_str(), "Declared queue");
    Ok(queue)
}

/// Bind `queue` to `exchange`, with an empty routing key.
#[tracing::instrument(level = "debug", skip(channel, queue), fields(queue = queue.name().as_str()))]
pub async fn bind_queue(
    channel: &Channel,
    queue: &Queue,
    exchange: &str,
) -> Result<(), QueueError> {
    channel
        .queue_bind(
            queue.name().as_str(),
            exchange,
            "",
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Bind {
            queue: queue.name().as_str().to_owned(),
            exchange: exchange.to_owned(),
            source: e.into(),
        })
}

/// Publish `body` to `exchange`, giving up after [`DEFAULT_PUBLISH_TIMEOUT`].
///
/// See [`publish_with_timeout`].
pub async fn publish(
    channel: &Channel,
    exchange: &str,
    body: impl AsRef<[u8]>,
) -> Result<(), QueueError> {
    publish_with_timeout(channel, exchange, body, DEFAULT_PUBLISH_TIMEOUT).await
}

/// Publish `body` to `exchange` as a single `text/html` message.
///
/// The routing key is empty, the message is neither mandatory nor immediate.
/// `timeout` bounds the whole operation, including the wait for the broker confirmation
/// when `channel` is in confirm mode. Failures are not retried.
#[tracing::instrument(level = "debug", skip(channel, body), fields(size = body.as_ref().len()))]
pub async fn publish_with_timeout(
    channel: &Channel,
    exchange: &str,
    body: impl AsRef<[u8]>,
    timeout: Duration,
) -> Result<(), QueueError> {
    let publish_error = |source: anyhow::Error| QueueError::Publish {
        exchange: exchange.to_owned(),
        source,
    };
    let publish_future = async {
        let confirm = channel
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions {
                    mandatory: false,
                    // The immediate flag was dropped in RabbitMQ 3.0 - see https://www.rabbitmq.com/blog/2012/11/19/breaking-things-with-rabbitmq-3-0/
                    immediate: false,
                },
                body.as_ref(),
                BasicProperties::default().with_content_type(CONTENT_TYPE.into()),
            )
            .await
            .map_err(|e| publish_error(e.into()))?
            .await
            .map_err(|e| publish_error(e.into()))?;

        match confirm {
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
            Confirmation::Nack(_) => Err(publish_error(anyhow::anyhow!(
                "The RabbitMq broker nacked the publishing of the message"
            ))),
        }
    };

    with_deadline(Operation::Publish, timeout, publish_future).await
}

/// Start consuming from `queue`.
///
/// The consumer uses auto-ack: messages are acknowledged as soon as the broker hands them
/// over, which makes delivery at-most-once. Callers needing at-least-once semantics must
/// not rely on this function.
#[tracing::instrument(level = "debug", skip(channel, queue), fields(queue = queue.name().as_str()))]
pub async fn consume(channel: &Channel, queue: &Queue) -> Result<Deliveries, QueueError> {
    let queue_name = queue.name().as_str();
    let consumer = channel
        .basic_consume(
            queue_name,
            "",
            BasicConsumeOptions {
                no_local: false,
                no_ack: true,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Consume {
            queue: queue_name.to_owned(),
            source: e.into(),
        })?;
    debug!(consumer_tag = consumer.tag().as_str(), "Consumer registered");
    Ok(Deliveries::new(queue_name, consumer))
}

/// Close `channel`. Closing a channel that is already closed is an error.
#[tracing::instrument(level = "debug", skip(channel), fields(channel_id = channel.id()))]
pub async fn close_channel(channel: &Channel) -> Result<(), QueueError> {
    channel
        .close(REPLY_SUCCESS, "OK")
        .await
        .map_err(|e| QueueError::Close {
            operation: Operation::CloseChannel,
            source: e.into(),
        })
}

/// Close `connection`, and every channel opened on it.
/// Closing a connection that is already closed is an error.
#[tracing::instrument(level = "debug", skip(connection))]
pub async fn close_connection(connection: &Connection) -> Result<(), QueueError> {
    connection
        .close(REPLY_SUCCESS, "OK")
        .await
        .map_err(|e| QueueError::Close {
            operation: Operation::CloseConnection,
            source: e.into(),
        })
}
