// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Language service tests
//!
//! Hover and completion from buffer text through the binding queue to the
//! playground schema.

use std::io::Write;
use std::sync::Arc;

use sqltools_catalog::{BoundSymbol, ConnectionDetails, StaticConnectionFactory};
use sqltools_lsp::{LanguageService, ServiceConfig};
use sqltools_test_utils::{ConnectionFixtures, MockConnectionFactory, SqlFixtures};
use sqltools_workspace::{
    BufferPosition, BufferRange, ContentChange, FileChange, PositionEncoding, WorkspaceError,
};
use tokio_test::{assert_err, assert_ok};

const URI: &str = "file:///scripts/report.sql";

fn connected_config() -> ServiceConfig {
    ServiceConfig::default().with_connection(ConnectionDetails::new("localhost", "shop"))
}

fn service(config: ServiceConfig) -> LanguageService {
    LanguageService::new(Arc::new(StaticConnectionFactory::default()), config)
}

fn names(symbols: &[BoundSymbol]) -> Vec<&str> {
    symbols.iter().map(BoundSymbol::name).collect()
}

#[tokio::test]
async fn test_hover_describes_qualified_table() {
    let service = service(connected_config());
    let key = service
        .open_document(URI, "SELECT * FROM dbo.users")
        .await
        .unwrap();
    assert!(service.binding_queue().is_binding_context_connected(&key).await);

    let hover = service
        .hover(URI, BufferPosition::new(1, 20))
        .await
        .unwrap()
        .unwrap();
    assert!(hover.contents.starts_with("**table** `dbo.users`"));
    assert_eq!(hover.range, BufferRange::from_coords(1, 15, 1, 24));
}

#[tokio::test]
async fn test_hover_describes_column() {
    let service = service(connected_config());
    service
        .open_document(URI, "SELECT orders.status FROM dbo.orders")
        .await;

    let hover = service
        .hover(URI, BufferPosition::new(1, 16))
        .await
        .unwrap()
        .unwrap();
    assert!(hover.contents.starts_with("**column** `orders.status`"));
    assert_eq!(hover.range, BufferRange::from_coords(1, 8, 1, 21));
}

#[tokio::test]
async fn test_hover_outside_identifier_or_unknown_name() {
    let service = service(connected_config());
    service
        .open_document(URI, "SELECT  no_such_thing")
        .await;

    assert!(service.hover(URI, BufferPosition::new(1, 8)).await.unwrap().is_none());
    assert!(service.hover(URI, BufferPosition::new(1, 12)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_hover_without_connection() {
    let service = service(ServiceConfig::default());
    assert!(service.open_document(URI, "SELECT * FROM dbo.users").await.is_none());

    let hover = service.hover(URI, BufferPosition::new(1, 20)).await.unwrap();
    assert!(hover.is_none());
}

#[tokio::test]
async fn test_hover_on_unknown_document() {
    let service = service(connected_config());
    let result = service.hover("file:///missing.sql", BufferPosition::new(1, 1)).await;
    assert!(matches!(result, Err(WorkspaceError::FileNotFound(_))));
}

#[tokio::test]
async fn test_completion_by_prefix() {
    let service = service(connected_config());
    service.open_document(URI, "SELECT ord").await;

    let symbols = service
        .completion(URI, BufferPosition::new(1, 11))
        .await
        .unwrap();
    assert_eq!(names(&symbols), ["orders", "order_items", "order_id"]);
}

#[tokio::test]
async fn test_completion_after_table_dot() {
    let service = service(connected_config());
    service.open_document(URI, "SELECT orders.").await;

    let symbols = service
        .completion(URI, BufferPosition::new(1, 15))
        .await
        .unwrap();
    assert_eq!(
        names(&symbols),
        ["id", "user_id", "total", "status", "created_at"]
    );
    assert!(
        symbols
            .iter()
            .all(|symbol| matches!(symbol, BoundSymbol::Column { table, .. } if table == "orders"))
    );

    let everything = service
        .completion(URI, BufferPosition::new(1, 8))
        .await
        .unwrap();
    assert!(!everything.is_empty());
}

#[tokio::test]
async fn test_edits_are_visible_to_hover() {
    let service = service(connected_config());
    service.open_document(URI, "SELECT 1").await;

    service
        .change_document(
            URI,
            vec![ContentChange::Full("SELECT email FROM dbo.users".to_string())],
        )
        .await
        .unwrap();

    let hover = service
        .hover(URI, BufferPosition::new(1, 9))
        .await
        .unwrap()
        .unwrap();
    assert!(hover.contents.starts_with("**column** `users.email`"));
}

#[tokio::test]
async fn test_hover_counts_utf16_columns() {
    let service = service(connected_config());
    assert_eq!(service.position_encoding().await, PositionEncoding::Utf16);
    service
        .open_document(URI, "/* \u{1F4CA} */ SELECT * FROM dbo.users")
        .await;

    // The emoji is two UTF-16 units, so `dbo.users` starts at unit column 24
    let hover = service
        .hover(URI, BufferPosition::new(1, 28))
        .await
        .unwrap()
        .unwrap();
    assert!(hover.contents.starts_with("**table** `dbo.users`"));
    assert_eq!(hover.range, BufferRange::from_coords(1, 24, 1, 33));

    service.set_position_encoding(PositionEncoding::Utf32).await;
    let hover = service
        .hover(URI, BufferPosition::new(1, 27))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hover.range, BufferRange::from_coords(1, 23, 1, 32));
}

#[tokio::test]
async fn test_utf16_edit_after_emoji() {
    let service = service(connected_config());
    service.open_document(URI, "-- \u{1F4CA}\nSELECT x").await;

    service
        .change_document(
            URI,
            vec![ContentChange::Incremental(FileChange::replace(
                BufferPosition::new(1, 6),
                BufferPosition::new(1, 6),
                " totals",
            ))],
        )
        .await
        .unwrap();

    let text = service
        .workspace()
        .with_file(URI, |file| file.contents())
        .await
        .unwrap();
    assert_eq!(text.lines().next(), Some("-- \u{1F4CA} totals"));
}

#[tokio::test]
async fn test_analysis_disabled_buffer() {
    let service = service(connected_config());
    service.open_document(URI, "SELECT * FROM dbo.users").await;

    service.workspace().set_analysis_enabled(URI, false).await.unwrap();
    assert!(service.hover(URI, BufferPosition::new(1, 20)).await.unwrap().is_none());
    assert!(
        service
            .completion(URI, BufferPosition::new(1, 24))
            .await
            .unwrap()
            .is_empty()
    );

    service.workspace().set_analysis_enabled(URI, true).await.unwrap();
    assert!(service.hover(URI, BufferPosition::new(1, 20)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_intellisense_disabled() {
    let config = ServiceConfig {
        intellisense_enabled: false,
        ..connected_config()
    };
    let service = service(config);

    assert!(service.open_document(URI, SqlFixtures::system_objects()).await.is_none());
    let symbols = service.completion(URI, BufferPosition::new(1, 7)).await.unwrap();
    assert!(symbols.is_empty());
}

#[tokio::test]
async fn test_update_config_rebinds_open_documents() {
    let service = service(ServiceConfig::default());
    service.open_document(URI, "SELECT * FROM dbo.users").await;
    assert!(service.document_key(URI).await.is_none());

    assert_ok!(service.update_config(connected_config()).await);
    let key = service.document_key(URI).await.unwrap();
    assert!(service.binding_queue().is_binding_context_connected(&key).await);
    assert!(service.hover(URI, BufferPosition::new(1, 20)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_config_loads_schema_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"{"tables": [{"name": "invoices", "schema": "billing", "columns": [
            {"name": "invoice_id", "dataType": "bigInt"}
        ]}]}"#,
    )
    .unwrap();

    let service = service(connected_config());
    service.open_document(URI, "SELECT * FROM billing.invoices").await;
    assert!(service.hover(URI, BufferPosition::new(1, 25)).await.unwrap().is_none());

    assert_ok!(
        service
            .update_config(connected_config().with_metadata_path(file.path()))
            .await
    );
    let hover = service
        .hover(URI, BufferPosition::new(1, 25))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hover.contents, "**table** `billing.invoices`");

    let missing = connected_config().with_metadata_path("/no/such/schema.json");
    assert_err!(service.update_config(missing).await);
    assert_eq!(service.config().await.metadata_path.as_deref(), Some(file.path()));
}

#[tokio::test]
async fn test_failed_connection_is_retried() {
    let factory = Arc::new(MockConnectionFactory::new());
    factory.set_failing(true);
    let config = ServiceConfig::default().with_connection(ConnectionFixtures::shop());
    let service = LanguageService::new(factory.clone(), config);

    let key = service.open_document(URI, "SELECT 1").await.unwrap();
    assert!(!service.binding_queue().is_binding_context_connected(&key).await);

    factory.set_failing(false);
    service.open_document("file:///other.sql", "SELECT 2").await;
    assert!(service.binding_queue().is_binding_context_connected(&key).await);
    assert_eq!(factory.open_count(), 2);
}

#[tokio::test]
async fn test_close_and_shutdown() {
    let service = service(connected_config());
    service.open_document(URI, "SELECT 1").await;

    assert!(service.close_document(URI).await);
    assert!(service.document_key(URI).await.is_none());
    assert!(!service.close_document(URI).await);

    service.open_document(URI, "SELECT 1").await;
    service.shutdown().await;
    assert!(service.document_key(URI).await.is_none());
    assert!(
        service
            .binding_queue()
            .queue()
            .binding_context_keys()
            .await
            .is_empty()
    );
}
