use std::fmt;
use std::time::Duration;

/// The broker operations exposed by this crate.
///
/// Every [`QueueError`] can tell which one of them failed, see [`QueueError::operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    OpenChannel,
    DeclareExchange,
    DeclareQueue,
    BindQueue,
    Publish,
    Consume,
    CloseChannel,
    CloseConnection,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Operation::Connect => "connect to the broker",
            Operation::OpenChannel => "open a channel",
            Operation::DeclareExchange => "declare an exchange",
            Operation::DeclareQueue => "declare a queue",
            Operation::BindQueue => "bind a queue",
            Operation::Publish => "publish a message",
            Operation::Consume => "consume from a queue",
            Operation::CloseChannel => "close a channel",
            Operation::CloseConnection => "close a connection",
        };
        f.write_str(description)
    }
}

/// Error returned by every operation of the queue facade.
///
/// None of the operations panic: it is up to the caller to decide whether to retry,
/// escalate or shut down.
#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to the RabbitMq broker at {address}")]
    Connection {
        address: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to open a channel on the RabbitMq connection")]
    Channel(#[source] anyhow::Error),
    #[error("Failed to declare {entity}")]
    Declare {
        /// Either [`Operation::DeclareExchange`] or [`Operation::DeclareQueue`].
        operation: Operation,
        /// What was being declared, e.g. `exchange "events"` or `an anonymous queue`.
        entity: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to bind queue {queue:?} to exchange {exchange:?}")]
    Bind {
        queue: String,
        exchange: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to publish a message to exchange {exchange:?}")]
    Publish {
        exchange: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("The timeout threshold ({timeout:?}) was reached while trying to {operation}")]
    Timeout {
        operation: Operation,
        timeout: Duration,
    },
    #[error("Failed to consume from queue {queue:?}")]
    Consume {
        queue: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to {operation}")]
    Close {
        operation: Operation,
        #[source]
        source: anyhow::Error,
    },
}

impl QueueError {
    /// The operation that failed.
    pub fn operation(&self) -> Operation {
        match self {
            QueueError::Connection { .. } => Operation::Connect,
            QueueError::Channel(_) => Operation::OpenChannel,
            QueueError::Declare { operation, .. } => *operation,
            QueueError::Bind { .. } => Operation::BindQueue,
            QueueError::Publish { .. } => Operation::Publish,
            QueueError::Timeout { operation, .. } => *operation,
            QueueError::Consume { .. } => Operation::Consume,
            QueueError::Close { operation, .. } => *operation,
        }
    }

    /// `true` if the operation gave up because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueueError::Timeout { .. })
    }
}

/// Await `future`, giving up with [`QueueError::Timeout`] once `timeout` has elapsed.
pub(crate) async fn with_deadline<T, F>(
    operation: Operation,
    timeout: Duration,
    future: F,
) -> Result<T, QueueError>
where
    F: std::future::Future<Output = Result<T, QueueError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(QueueError::Timeout { operation, timeout }),
    }
}
