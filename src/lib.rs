//! `fanout-queue` is a thin facade, built on top of [`lapin`], to broadcast messages
//! through RabbitMq fanout exchanges.
//!
//! It covers a single flow: connect, open a channel, declare a durable fanout exchange,
//! declare an exclusive anonymous queue, bind it to the exchange, then publish to the
//! exchange or consume from the queue.
//!
//! [`QueueConnection`](crate::queue::QueueConnection) is the best starting point. The bare
//! operations it is made of live in [`queue::facade`].
//!
//! ## What this crate does not do
//!
//! There is no retry, no reconnection and no pooling: every failure is returned to the
//! caller as a [`QueueError`](crate::queue::QueueError).
//! Consumers run in auto-ack mode, so delivery is at-most-once.
//!
//! ## Logging
//!
//! Operations emit [`tracing`] spans and events. Installing a subscriber is up to the
//! application.

pub mod amqp;
pub mod queue;
