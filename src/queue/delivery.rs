use amq_protocol_types::{DeliveryTag, ShortString};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use lapin::BasicProperties;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::queue::QueueError;

/// A message received from a queue.
///
/// # Acknowledgement
///
/// Deliveries are consumed in auto-ack mode: the broker considers the message acknowledged
/// as soon as it has been handed over to this client, not when you are done processing it.
/// If the process crashes while handling a `Delivery`, that message is lost.
/// Delivery is therefore at-most-once.
#[derive(Debug, PartialEq)]
pub struct Delivery {
    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange the message was published to.
    pub exchange: ShortString,

    /// The routing key of the message. Always empty for messages published
    /// through this crate, fanout exchanges ignore it.
    pub routing_key: ShortString,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,
}

impl Delivery {
    /// The content type the message was published with, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.properties.content_type().as_ref().map(ShortString::as_str)
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
        }
    }
}

/// The lazy, unbounded sequence of messages delivered to a consumer.
///
/// Messages are yielded in the order the broker sends them. The stream ends when the
/// channel (or the connection) it was created on is closed: closing is the only way to
/// cancel a consumer.
///
/// See [`Delivery`] for the acknowledgement semantics.
pub struct Deliveries {
    queue_name: String,
    consumer_tag: String,
    inner: BoxStream<'static, Result<lapin::message::Delivery, lapin::Error>>,
}

impl Deliveries {
    pub(crate) fn new(queue_name: &str, consumer: lapin::Consumer) -> Self {
        Self {
            queue_name: queue_name.to_owned(),
            consumer_tag: consumer.tag().as_str().to_owned(),
            inner: consumer.boxed(),
        }
    }

    /// The name of the queue messages are consumed from.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// The consumer tag assigned by the broker.
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }
}

impl std::fmt::Debug for Deliveries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deliveries")
            .field("queue_name", &self.queue_name)
            .field("consumer_tag", &self.consumer_tag)
            .finish_non_exhaustive()
    }
}

impl Stream for Deliveries {
    type Item = Result<Delivery, QueueError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(delivery))) => Poll::Ready(Some(Ok(delivery.into()))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(QueueError::Consume {
                queue: self.queue_name.clone(),
                source: e.into(),
            }))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
