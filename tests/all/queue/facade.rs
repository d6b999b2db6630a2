use crate::helpers::{assert_no_delivery, exchange_name, get_channel, next_delivery};
use fake::{Fake, Faker};
use fanout_queue::amqp::options::ExchangeDeclareOptions;
use fanout_queue::amqp::types::FieldTable;
use fanout_queue::amqp::ExchangeKind;
use fanout_queue::queue::{facade, Operation, QueueError};
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[tokio::test]
async fn declaring_the_same_exchange_twice_succeeds() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    let exchange = exchange_name();

    // Act
    let first = facade::declare_exchange(&channel, &exchange).await;
    let second = facade::declare_exchange(&channel, &exchange).await;

    // Assert
    assert!(first.is_ok(), "{first:?}");
    assert!(second.is_ok(), "{second:?}");
}

#[tokio::test]
async fn declaring_an_existing_exchange_with_another_type_fails() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    let exchange = exchange_name();
    channel
        .exchange_declare(
            &exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions::default(),
            FieldTable::default(),
        )
        .await
        .unwrap();

    // Act
    let error = facade::declare_exchange(&channel, &exchange)
        .await
        .unwrap_err();

    // Assert
    assert_eq!(error.operation(), Operation::DeclareExchange);
    assert!(matches!(error, QueueError::Declare { .. }));
}

#[tokio::test]
async fn every_queue_declaration_gets_a_distinct_broker_assigned_name() {
    // Arrange
    let (_connection, channel) = get_channel().await;

    // Act
    let mut names = HashSet::new();
    for _ in 0..5 {
        let queue = facade::declare_queue(&channel).await.unwrap();
        names.insert(queue.name().as_str().to_owned());
    }

    // Assert
    assert_eq!(names.len(), 5);
    assert!(names.iter().all(|name| !name.is_empty()));
}

#[tokio::test]
async fn a_new_queue_is_empty_and_has_no_consumer() {
    let (_connection, channel) = get_channel().await;

    let queue = facade::declare_queue(&channel).await.unwrap();

    assert_eq!(queue.message_count(), 0);
    assert_eq!(queue.consumer_count(), 0);
}

#[tokio::test]
async fn binding_to_a_missing_exchange_fails() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    let queue = facade::declare_queue(&channel).await.unwrap();
    let exchange = exchange_name();

    // Act
    let error = facade::bind_queue(&channel, &queue, &exchange)
        .await
        .unwrap_err();

    // Assert
    match error {
        QueueError::Bind {
            queue: queue_name,
            exchange: exchange_name,
            ..
        } => {
            assert_eq!(queue_name, queue.name().as_str());
            assert_eq!(exchange_name, exchange);
        }
        e => panic!("Unexpected error: {e:?}"),
    }
}

#[tokio::test]
async fn publishing_returns_within_the_deadline() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    let exchange = exchange_name();
    facade::declare_exchange(&channel, &exchange).await.unwrap();
    let body: Vec<u8> = Faker.fake();

    // Act
    let started = Instant::now();
    let outcome = facade::publish(&channel, &exchange, &body).await;

    // Assert
    assert!(outcome.is_ok(), "{outcome:?}");
    assert!(started.elapsed() < facade::DEFAULT_PUBLISH_TIMEOUT);
}

#[tokio::test]
async fn publishing_on_a_closed_channel_fails() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    let exchange = exchange_name();
    facade::declare_exchange(&channel, &exchange).await.unwrap();
    facade::close_channel(&channel).await.unwrap();

    // Act
    let error = facade::publish(&channel, &exchange, "hello")
        .await
        .unwrap_err();

    // Assert
    assert_eq!(error.operation(), Operation::Publish);
    assert!(!error.is_timeout());
}

#[tokio::test]
async fn messages_are_published_as_text_html() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    let exchange = exchange_name();
    facade::declare_exchange(&channel, &exchange).await.unwrap();
    let queue = facade::declare_queue(&channel).await.unwrap();
    facade::bind_queue(&channel, &queue, &exchange).await.unwrap();
    let mut deliveries = facade::consume(&channel, &queue).await.unwrap();

    // Act
    facade::publish(&channel, &exchange, "<p>hello</p>")
        .await
        .unwrap();

    // Assert
    let delivery = next_delivery(&mut deliveries).await;
    assert_eq!(delivery.content_type(), Some(facade::CONTENT_TYPE));
    assert_eq!(delivery.exchange.as_str(), exchange);
    assert_eq!(delivery.routing_key.as_str(), "");
    assert!(!delivery.redelivered);
}

#[tokio::test]
async fn closing_the_channel_ends_the_delivery_stream() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    let queue = facade::declare_queue(&channel).await.unwrap();
    let mut deliveries = facade::consume(&channel, &queue).await.unwrap();
    let waiting = tokio::spawn(async move {
        use futures_util::StreamExt;
        deliveries.next().await.is_none()
    });

    // Act
    facade::close_channel(&channel).await.unwrap();

    // Assert
    let ended = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .expect("The consumer was not unblocked by closing the channel")
        .unwrap();
    assert!(ended);
}

#[tokio::test]
async fn consuming_from_a_closed_channel_fails() {
    let (_connection, channel) = get_channel().await;
    let queue = facade::declare_queue(&channel).await.unwrap();
    facade::close_channel(&channel).await.unwrap();

    let error = facade::consume(&channel, &queue).await.unwrap_err();

    assert_eq!(error.operation(), Operation::Consume);
}

#[tokio::test]
async fn closing_a_channel_twice_is_a_close_error() {
    // Arrange
    let (_connection, channel) = get_channel().await;
    facade::close_channel(&channel).await.unwrap();

    // Act
    let error = facade::close_channel(&channel).await.unwrap_err();

    // Assert
    assert!(matches!(
        error,
        QueueError::Close {
            operation: Operation::CloseChannel,
            ..
        }
    ));
}

#[tokio::test]
async fn closing_a_connection_twice_is_a_close_error() {
    // Arrange
    let (connection, _channel) = get_channel().await;
    facade::close_connection(&connection).await.unwrap();

    // Act
    let error = facade::close_connection(&connection).await.unwrap_err();

    // Assert
    assert!(matches!(
        error,
        QueueError::Close {
            operation: Operation::CloseConnection,
            ..
        }
    ));
}

#[tokio::test]
async fn a_confirm_channel_publishes_with_broker_acknowledgement() {
    // Arrange
    let (connection, _channel) = get_channel().await;
    let channel = facade::open_confirm_channel(&connection).await.unwrap();
    let exchange = exchange_name();
    facade::declare_exchange(&channel, &exchange).await.unwrap();
    let queue = facade::declare_queue(&channel).await.unwrap();
    facade::bind_queue(&channel, &queue, &exchange).await.unwrap();
    let mut deliveries = facade::consume(&channel, &queue).await.unwrap();

    // Act
    facade::publish(&channel, &exchange, "confirmed").await.unwrap();

    // Assert
    assert_eq!(next_delivery(&mut deliveries).await.data, b"confirmed");
    assert_no_delivery(&mut deliveries).await;
}
