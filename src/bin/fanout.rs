//! Publish to, or listen on, a RabbitMq fanout exchange.
//!
//! ```text
//! fanout publish <exchange> <body>
//! fanout listen <exchange>
//! ```
//!
//! The broker is configured through `AMQP_HOST`, `AMQP_PORT`, `AMQP_USERNAME`,
//! `AMQP_PASSWORD` and `AMQP_VHOST`. Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use fanout_queue::amqp::configuration::QueueSettings;
use fanout_queue::queue::QueueConnection;
use futures_util::StreamExt;
use shutdown_handler::ShutdownHandler;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: fanout publish <exchange> <body> | fanout listen <exchange>";

enum Command {
    Publish { exchange: String, body: String },
    Listen { exchange: String },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let command = match (args.next().as_deref(), args.next(), args.next()) {
            (Some("publish"), Some(exchange), Some(body)) => Command::Publish { exchange, body },
            (Some("listen"), Some(exchange), None) => Command::Listen { exchange },
            _ => bail!(USAGE),
        };
        if args.next().is_some() {
            bail!(USAGE);
        }
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let command = Command::parse(std::env::args().skip(1))?;
    let settings = QueueSettings::from_env().context("Invalid RabbitMq configuration")?;

    let mut session = QueueConnection::init(settings).await?;
    session.open_channel().await?;

    let outcome = match command {
        Command::Publish { exchange, body } => publish(&session, &exchange, &body).await,
        Command::Listen { exchange } => listen(&mut session, &exchange).await,
    };

    if let Err(e) = session.close_connection().await {
        warn!(error = ?e, "Failed to close the RabbitMq connection");
    }
    outcome
}

async fn publish(session: &QueueConnection, exchange: &str, body: &str) -> Result<()> {
    session.declare_exchange(exchange).await?;
    session.publish(exchange, body).await?;
    info!(exchange, "Message published");
    Ok(())
}

async fn listen(session: &mut QueueConnection, exchange: &str) -> Result<()> {
    let shutdown = ShutdownHandler::sigterm()?;
    let mut deliveries = session.subscribe(exchange).await?;
    info!(
        exchange,
        queue = deliveries.queue_name(),
        "Listening for messages"
    );

    let signal = shutdown.wait_for_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => {
                info!("Shutdown requested");
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            delivery = deliveries.next() => match delivery {
                Some(delivery) => println!("{}", String::from_utf8_lossy(&delivery?.data)),
                None => {
                    warn!("The broker closed the consumer");
                    return Ok(());
                }
            },
        }
    }
}
