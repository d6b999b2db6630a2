use lapin::{Channel, Connection, Queue};
use std::time::Duration;
use tracing::info;

use crate::amqp::configuration::QueueSettings;
use crate::queue::{facade, with_deadline, Deliveries, Operation, QueueError};

/// A session with a RabbitMq broker.
///
/// `QueueConnection` owns the connection, the channel and the anonymous queue it opened,
/// so that each step builds on the previous ones:
///
/// ```rust,no_run
/// use fanout_queue::amqp::configuration::QueueSettings;
/// use fanout_queue::queue::QueueConnection;
/// use futures_util::StreamExt;
///
/// async fn listen() -> Result<(), fanout_queue::queue::QueueError> {
///     let mut session = QueueConnection::init(QueueSettings::default()).await?;
///     session.open_channel().await?;
///     let mut deliveries = session.subscribe("events").await?;
///
///     while let Some(delivery) = deliveries.next().await {
///         println!("{}", String::from_utf8_lossy(&delivery?.data));
///     }
///     session.close_connection().await
/// }
/// ```
///
/// # Deadlines
///
/// Publishing is bounded by [`QueueSettings::publish_timeout`], connecting by
/// [`QueueSettings::connection_timeout`], everything else by
/// [`QueueSettings::operation_timeout`].
///
/// # Ownership
///
/// A session is meant to be used by a single task: operations that open or close a handle
/// take `&mut self`.
pub struct QueueConnection {
    settings: QueueSettings,
    connection: Option<Connection>,
    channel: Option<Channel>,
    queue: Option<Queue>,
}

impl std::fmt::Debug for QueueConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConnection")
            .field("address", &self.settings.address())
            .field("connected", &self.connection.is_some())
            .field("channel_id", &self.channel.as_ref().map(Channel::id))
            .field("queue", &self.queue.as_ref().map(|q| q.name().as_str()))
            .finish()
    }
}

impl QueueConnection {
    /// Create a session. Nothing is dialed until [`QueueConnection::connect`] is called.
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            connection: None,
            channel: None,
            queue: None,
        }
    }

    /// Create a session and connect it to the broker.
    pub async fn init(settings: QueueSettings) -> Result<Self, QueueError> {
        let mut session = Self::new(settings);
        session.connect().await?;
        Ok(session)
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// The open connection, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// The open channel, if any.
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// The queue declared on the current channel, if any.
    pub fn queue(&self) -> Option<&Queue> {
        self.queue.as_ref()
    }

    /// Dial the broker.
    ///
    /// A connection previously held by this session is replaced, together with its channel
    /// and queue. It is not closed: close it first if you want a clean handover.
    pub async fn connect(&mut self) -> Result<&Connection, QueueError> {
        let connection = facade::connect(&self.settings).await?;
        info!(address = %self.settings.address(), "Connected to RabbitMq");
        self.channel = None;
        self.queue = None;
        Ok(self.connection.insert(connection))
    }

    /// Open a channel on the session connection, replacing the current channel (and queue).
    ///
    /// The channel is put in confirm mode if [`QueueSettings::publisher_confirms`] is set.
    pub async fn open_channel(&mut self) -> Result<&Channel, QueueError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| QueueError::Channel(anyhow::anyhow!("The connection is not open")))?;
        let confirms = self.settings.publisher_confirms;
        let channel = with_deadline(Operation::OpenChannel, self.timeout(), async {
            if confirms {
                facade::open_confirm_channel(connection).await
            } else {
                facade::open_channel(connection).await
            }
        })
        .await?;
        self.queue = None;
        Ok(self.channel.insert(channel))
    }

    /// Declare a durable fanout exchange on the session channel.
    pub async fn declare_exchange(&self, name: &str) -> Result<(), QueueError> {
        let channel = self.channel.as_ref().ok_or_else(|| QueueError::Declare {
            operation: Operation::DeclareExchange,
            entity: format!("exchange {name:?}"),
            source: anyhow::anyhow!("The channel is not open"),
        })?;
        with_deadline(
            Operation::DeclareExchange,
            self.timeout(),
            facade::declare_exchange(channel, name),
        )
        .await
    }

    /// Declare an anonymous exclusive queue on the session channel and keep its descriptor.
    pub async fn declare_queue(&mut self) -> Result<&Queue, QueueError> {
        let channel = self.channel.as_ref().ok_or_else(|| QueueError::Declare {
            operation: Operation::DeclareQueue,
            entity: "an anonymous queue".into(),
            source: anyhow::anyhow!("The channel is not open"),
        })?;
        let queue = with_deadline(
            Operation::DeclareQueue,
            self.timeout(),
            facade::declare_queue(channel),
        )
        .await?;
        Ok(self.queue.insert(queue))
    }

    /// Bind the session queue to `exchange`.
    pub async fn bind_queue(&self, exchange: &str) -> Result<(), QueueError> {
        let (channel, queue) = match (&self.channel, &self.queue) {
            (Some(channel), Some(queue)) => (channel, queue),
            (channel, _) => {
                let reason = if channel.is_none() {
                    "The channel is not open"
                } else {
                    "No queue has been declared"
                };
                return Err(QueueError::Bind {
                    queue: String::new(),
                    exchange: exchange.to_owned(),
                    source: anyhow::anyhow!(reason),
                });
            }
        };
        with_deadline(
            Operation::BindQueue,
            self.timeout(),
            facade::bind_queue(channel, queue, exchange),
        )
        .await
    }

    /// Publish `body` to `exchange` on the session channel.
    ///
    /// See [`facade::publish_with_timeout`].
    pub async fn publish(
        &self,
        exchange: &str,
        body: impl AsRef<[u8]>,
    ) -> Result<(), QueueError> {
        let channel = self.channel.as_ref().ok_or_else(|| QueueError::Publish {
            exchange: exchange.to_owned(),
            source: anyhow::anyhow!("The channel is not open"),
        })?;
        let timeout = self.settings.publish_timeout();
        facade::publish_with_timeout(channel, exchange, body, timeout).await
    }

    /// Start consuming from the session queue.
    ///
    /// Messages are auto-acked: see [`Deliveries`] for what that implies.
    pub async fn consume(&self) -> Result<Deliveries, QueueError> {
        let (channel, queue) = match (&self.channel, &self.queue) {
            (Some(channel), Some(queue)) => (channel, queue),
            (channel, _) => {
                let reason = if channel.is_none() {
                    "The channel is not open"
                } else {
                    "No queue has been declared"
                };
                return Err(QueueError::Consume {
                    queue: String::new(),
                    source: anyhow::anyhow!(reason),
                });
            }
        };
        with_deadline(
            Operation::Consume,
            self.timeout(),
            facade::consume(channel, queue),
        )
        .await
    }

    /// Declare `exchange`, declare a fresh anonymous queue, bind the two and start consuming.
    pub async fn subscribe(&mut self, exchange: &str) -> Result<Deliveries, QueueError> {
        self.declare_exchange(exchange).await?;
        self.declare_queue().await?;
        self.bind_queue(exchange).await?;
        self.consume().await
    }

    /// Close the session channel. The queue declared on it is forgotten.
    ///
    /// Fails if the session holds no channel, or if the broker already closed it.
    pub async fn close_channel(&mut self) -> Result<(), QueueError> {
        self.queue = None;
        let channel = self.channel.take().ok_or_else(|| QueueError::Close {
            operation: Operation::CloseChannel,
            source: anyhow::anyhow!("The channel is not open"),
        })?;
        with_deadline(
            Operation::CloseChannel,
            self.timeout(),
            facade::close_channel(&channel),
        )
        .await
    }

    /// Close the session connection, together with its channel and queue.
    ///
    /// Fails if the session holds no connection, or if it was already closed.
    pub async fn close_connection(&mut self) -> Result<(), QueueError> {
        self.queue = None;
        self.channel = None;
        let connection = self.connection.take().ok_or_else(|| QueueError::Close {
            operation: Operation::CloseConnection,
            source: anyhow::anyhow!("The connection is not open"),
        })?;
        with_deadline(
            Operation::CloseConnection,
            self.timeout(),
            facade::close_connection(&connection),
        )
        .await?;
        info!(address = %self.settings.address(), "Disconnected from RabbitMq");
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.settings.operation_timeout()
    }
}
