use crate::amqp::configuration::QueueSettings;
use crate::queue::{with_deadline, Operation, QueueError};
use lapin::{uri::AMQPUri, ConnectionProperties};
use tracing::warn;

#[derive(Clone)]
/// All the information required to connect to a RabbitMq broker.
pub struct ConnectionFactory {
    uri: AMQPUri,
    /// The broker address without credentials, used in diagnostics.
    address: String,
    /// The timeout observed when trying to connect to RabbitMq.
    connection_timeout: std::time::Duration,
}

impl ConnectionFactory {
    /// Create a new connection factory from settings.
    ///
    /// If the connection timeout is left unspecified, it will be defaulted to 10 seconds.
    pub fn new_from_config(settings: &QueueSettings) -> Self {
        Self {
            uri: settings.amqp_uri(),
            address: settings.address(),
            connection_timeout: settings.connection_timeout(),
        }
    }

    /// The broker address this factory dials, without the password.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Create a new connection to a RabbitMq broker.
    ///
    /// No retry is attempted: an unreachable broker, rejected credentials or a dial that
    /// outlives the connection timeout are all reported to the caller.
    #[tracing::instrument(name = "rabbitmq_connect", skip(self), fields(address = %self.address))]
    pub async fn new_connection(&self) -> Result<lapin::Connection, QueueError> {
        let properties =
            ConnectionProperties::default().with_executor(tokio_executor_trait::Tokio::current());
        let connection = with_deadline(Operation::Connect, self.connection_timeout, async {
            lapin::Connection::connect_uri(self.uri.clone(), properties)
                .await
                .map_err(|e| QueueError::Connection {
                    address: self.address.clone(),
                    source: e.into(),
                })
        })
        .await?;
        // Register a callback to log connection errors.
        connection.on_error(|e| {
            warn!("RabbitMQ broken connection: {:?}", e);
        });
        Ok(connection)
    }
}
