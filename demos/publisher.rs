use fanout_queue::amqp::configuration::QueueSettings;
use fanout_queue::queue::QueueConnection;
use futures_util::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First of all we build the configuration for our session.
    // We are using the out-of-the-box parameters for the default RabbitMq Docker image.
    let settings = QueueSettings::default();

    // A session keeps the connection, the channel and the queue it opened.
    // Each step builds on the previous one.
    let mut listener = QueueConnection::init(settings.clone()).await?;
    listener.open_channel().await?;

    // `subscribe` declares the fanout exchange, declares an anonymous exclusive queue,
    // binds the two together and starts consuming.
    //
    // Every queue bound to `events` gets a copy of every message published to it:
    // the routing key plays no part in a fanout exchange.
    let mut deliveries = listener.subscribe("events").await?;

    // A second session plays the publisher.
    // Publishing gives up after 5 seconds, unless configured otherwise.
    let mut publisher = QueueConnection::init(settings).await?;
    publisher.open_channel().await?;
    publisher.publish("events", "hello").await?;

    // Deliveries are auto-acked: the broker forgets about a message as soon as it has
    // handed it over. If we crashed right now, "hello" would be lost.
    if let Some(delivery) = deliveries.next().await {
        println!("Received: {}", String::from_utf8_lossy(&delivery?.data));
    }

    // Closing the listener connection ends the delivery stream and drops its queue.
    listener.close_connection().await?;
    publisher.close_connection().await?;
    Ok(())
}
