// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Connected binding queue tests
//!
//! Connection lifecycle of binding contexts against a mock factory.

use std::sync::Arc;
use std::time::Duration;

use sqltools_catalog::{BoundSymbol, ConnectionFactory, ServerConnection};
use sqltools_lsp::{
    BindingRequest, ConnectedBindingContext, ConnectedBindingQueue, ItemState, QueueSettings,
};
use sqltools_test_utils::{
    ConnectionFixtures, MockConnectionFactory, MockMetadataProviderBuilder,
};
use tokio_util::sync::CancellationToken;

const FEATURE: &str = "IntelliSense";

fn connected_queue(factory: &Arc<MockConnectionFactory>) -> ConnectedBindingQueue {
    ConnectedBindingQueue::with_settings(
        factory.clone() as Arc<dyn ConnectionFactory>,
        QueueSettings {
            binding_timeout: Duration::from_secs(2),
            wait_for_lock_timeout: Duration::from_secs(2),
        },
    )
}

#[tokio::test]
async fn test_documents_share_one_connection() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);

    let first = ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop());
    let second = ConnectionFixtures::info("file:///b.sql", ConnectionFixtures::shop());

    let key = queue
        .add_connection_context(Some(&first), true, FEATURE, false)
        .await;
    assert_eq!(key, "localhost_shop_sa_SqlLogin_NULL_NULL");
    let again = queue
        .add_connection_context(Some(&second), true, FEATURE, false)
        .await;

    assert_eq!(key, again);
    assert_eq!(factory.open_count(), 1);
    assert!(queue.is_binding_context_connected(&key).await);

    let context = queue.get_or_create_binding_context(&key).await;
    assert_eq!(context.key(), key);
    assert_eq!(context.server_version().as_deref(), Some("mock-16.0"));
    assert_eq!(context.connection_details(), Some(ConnectionFixtures::shop()));
    assert!(context.binder().is_some());
    assert!(context.metadata_provider().is_some());
}

#[tokio::test]
async fn test_overwrite_replaces_connection() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);
    let info = ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop());

    queue
        .add_connection_context(Some(&info), true, FEATURE, false)
        .await;
    let key = queue
        .add_connection_context(Some(&info), true, FEATURE, true)
        .await;

    assert_eq!(factory.open_count(), 2);
    let connections = factory.connections();
    assert!(!connections[0].is_open());
    assert!(connections[1].is_open());
    assert!(queue.is_binding_context_connected(&key).await);
}

#[tokio::test]
async fn test_connection_timeout_has_a_floor() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);

    let mut quick = ConnectionFixtures::shop();
    quick.connect_timeout = Some(5);
    let mut patient = ConnectionFixtures::warehouse();
    patient.connect_timeout = Some(90);

    queue
        .add_connection_context(
            Some(&ConnectionFixtures::info("file:///a.sql", quick)),
            false,
            FEATURE,
            false,
        )
        .await;
    queue
        .add_connection_context(
            Some(&ConnectionFixtures::info("file:///b.sql", patient)),
            false,
            "Query",
            false,
        )
        .await;

    assert_eq!(
        factory.open_requests(),
        vec![
            (FEATURE.to_string(), Duration::from_secs(30)),
            ("Query".to_string(), Duration::from_secs(90)),
        ]
    );
}

#[tokio::test]
async fn test_failed_connect_keeps_disconnected_context() {
    let factory = Arc::new(MockConnectionFactory::new());
    factory.set_failing(true);
    let queue = connected_queue(&factory);
    let info = ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop());

    let key = queue
        .add_connection_context(Some(&info), true, FEATURE, false)
        .await;
    assert_eq!(key, "localhost_shop_sa_SqlLogin_NULL_NULL");
    assert!(queue.queue().binding_context_exists(&key).await);
    assert!(!queue.is_binding_context_connected(&key).await);

    let context = queue.get_or_create_binding_context(&key).await;
    assert!(context.binder().is_none());
    assert_eq!(context.connection_details(), Some(ConnectionFixtures::shop()));

    factory.set_failing(false);
    queue
        .add_connection_context(Some(&info), true, FEATURE, true)
        .await;
    assert!(queue.is_binding_context_connected(&key).await);
}

#[tokio::test]
async fn test_operation_resolves_through_binder() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);
    let info = ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop());
    let key = queue
        .add_connection_context(Some(&info), true, FEATURE, false)
        .await;

    let handle = queue
        .queue_binding_operation(BindingRequest::new(
            key,
            |context: &ConnectedBindingContext, _: &CancellationToken| {
                let binder = context
                    .binder()
                    .ok_or_else(|| anyhow::anyhow!("not connected"))?;
                Ok(binder.resolve("orders.user_id")?)
            },
        ))
        .unwrap();

    match handle.wait().await {
        Ok(Some(BoundSymbol::Column { table, column })) => {
            assert_eq!(table, "orders");
            assert_eq!(column.name, "user_id");
        }
        other => panic!("expected column, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_metadata_times_out() {
    let provider = MockMetadataProviderBuilder::new()
        .with_standard_schema()
        .with_delay(Duration::from_millis(300))
        .build();
    let factory = Arc::new(MockConnectionFactory::with_provider(provider));
    let queue = connected_queue(&factory);
    let info = ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop());
    let key = queue
        .add_connection_context(Some(&info), true, FEATURE, false)
        .await;

    let handle = queue
        .queue_binding_operation(
            BindingRequest::new(
                key,
                |context: &ConnectedBindingContext, _: &CancellationToken| match context.binder() {
                    Some(binder) => Ok(binder.resolve("users")?.map(|symbol| symbol.describe())),
                    None => Ok(None),
                },
            )
            .with_timeout_operation(|_| None)
            .with_binding_timeout(Duration::from_millis(50)),
        )
        .unwrap();

    let outcome = handle.outcome().await;
    assert_eq!(outcome.state, ItemState::TimedOut);
    assert_eq!(outcome.result, Ok(None));
}

#[tokio::test]
async fn test_close_connections_matches_server_and_database() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);

    let shop = queue
        .add_connection_context(
            Some(&ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop())),
            true,
            FEATURE,
            false,
        )
        .await;
    let warehouse = queue
        .add_connection_context(
            Some(&ConnectionFixtures::info("file:///b.sql", ConnectionFixtures::warehouse())),
            true,
            FEATURE,
            false,
        )
        .await;

    assert_eq!(queue.close_connections("LOCALHOST", "Shop").await, 1);
    assert!(!queue.queue().binding_context_exists(&shop).await);
    assert!(queue.is_binding_context_connected(&warehouse).await);
    assert!(!factory.connections()[0].is_open());

    assert_eq!(queue.close_connections("otherhost", "warehouse").await, 0);
}

#[tokio::test]
async fn test_remove_binding_context_disconnects() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);
    let info = ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop());

    queue
        .add_connection_context(Some(&info), true, FEATURE, false)
        .await;
    assert!(queue.remove_binding_context(&info).await);
    assert!(!factory.connections()[0].is_open());
    assert!(!queue.remove_binding_context(&info).await);
}

#[tokio::test]
async fn test_prune_idle_contexts_disconnects() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);
    let info = ConnectionFixtures::info("file:///a.sql", ConnectionFixtures::shop());
    let key = queue
        .add_connection_context(Some(&info), true, FEATURE, false)
        .await;

    assert!(queue.prune_idle_contexts(Duration::from_secs(3600)).await.is_empty());
    assert_eq!(queue.prune_idle_contexts(Duration::ZERO).await, vec![key.clone()]);
    assert!(!queue.is_binding_context_connected(&key).await);
    assert!(!factory.connections()[0].is_open());
}

#[tokio::test]
async fn test_shutdown_closes_every_connection() {
    let factory = Arc::new(MockConnectionFactory::new());
    let queue = connected_queue(&factory);

    for (uri, details) in [
        ("file:///a.sql", ConnectionFixtures::shop()),
        ("file:///b.sql", ConnectionFixtures::warehouse()),
    ] {
        queue
            .add_connection_context(Some(&ConnectionFixtures::info(uri, details)), true, FEATURE, false)
            .await;
    }

    queue.shutdown(Duration::from_secs(1)).await;
    assert!(queue.queue().binding_context_keys().await.is_empty());
    assert!(factory.connections().iter().all(|c| !c.is_open()));

    let handle = queue
        .queue_binding_operation(BindingRequest::new(
            "anything",
            |_: &ConnectedBindingContext, _: &CancellationToken| Ok(()),
        ))
        .unwrap();
    assert!(handle.wait().await.is_err());
}
