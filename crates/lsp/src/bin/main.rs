// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

use std::sync::Arc;
use std::time::Duration;

use sqltools_catalog::{ConnectionFactory, StaticConnectionFactory, StaticMetadataProvider};
use sqltools_lsp::{LanguageService, LspBackend, ServiceConfig, connection_factory_for};
use tower_lsp::{LspService, Server};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How often idle binding contexts are swept
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize logging; stdout carries the protocol
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    tracing::info!("Starting SQL tools language server");

    let config = ServiceConfig::default_runtime_fallback();
    let factory: Arc<dyn ConnectionFactory> = match connection_factory_for(&config).await {
        Ok(factory) => factory,
        Err(e) => {
            tracing::warn!("Falling back to the playground schema: {}", e);
            Arc::new(StaticConnectionFactory::new(
                StaticMetadataProvider::playground(),
            ))
        }
    };
    let service = Arc::new(LanguageService::new(factory, config));

    // Evict idle connection contexts
    let pruner = Arc::clone(&service);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let pruned = pruner.prune_idle_contexts().await;
            if !pruned.is_empty() {
                tracing::info!("Pruned {} idle binding contexts", pruned.len());
            }
        }
    });

    // Create stdin/stdout streams
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    // Create the LSP service
    let (lsp_service, socket) =
        LspService::new(move |client| LspBackend::new(client, Arc::clone(&service)));

    Server::new(stdin, stdout, socket).serve(lsp_service).await;
}
