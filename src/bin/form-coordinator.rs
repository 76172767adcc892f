//! # Form Coordinator Service
//!
//! Dials PostgreSQL, Redis and RabbitMQ (two broker connections: one for
//! consuming requests, one for publishing events), then runs the
//! consumption engine and the envelope dispatcher until SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use form_coordinator::cache::{CacheGateway, RedisCacheGateway};
use form_coordinator::config::ConfigManager;
use form_coordinator::constants::system;
use form_coordinator::health::{CacheHealth, HealthRegistry, NotifierHealth, RepositoryHealth};
use form_coordinator::logging::init_tracing;
use form_coordinator::messaging::{
    BrokerPublisher, ConsumptionEngine, EngineConfig, NotificationGateway, RabbitMqTransport,
};
use form_coordinator::orchestration::{EnvelopeDispatcher, FormOrchestrator};
use form_coordinator::persistence::{FormRepository, PostgresFormRepository};
use form_coordinator::resilience::connect_with_retry;
use form_coordinator::shutdown::CloserGroup;
use form_coordinator::web::{self, WebState};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config();
    info!(
        service = system::SERVICE_NAME,
        environment = %manager.environment(),
        config = ?config.sanitized(),
        "🚀 Starting form coordinator"
    );

    let database = &config.database;
    let repository = Arc::new(
        connect_with_retry(
            "postgres",
            database.connect_attempts,
            Duration::from_secs(database.connect_interval_seconds),
            || PostgresFormRepository::connect(database),
        )
        .await
        .context("failed to connect to PostgreSQL")?,
    );
    repository
        .ensure_schema()
        .await
        .context("failed to ensure form schema")?;

    let redis = &config.redis;
    let cache = Arc::new(
        connect_with_retry(
            "redis",
            redis.connect_attempts,
            Duration::from_secs(redis.connect_interval_seconds),
            || RedisCacheGateway::connect(&redis.url),
        )
        .await
        .context("failed to connect to Redis")?,
    );

    let rabbitmq = &config.rabbitmq;
    let broker_interval = Duration::from_secs(rabbitmq.connect_interval_seconds);

    let publisher = Arc::new(BrokerPublisher::new(
        Arc::new(RabbitMqTransport::new(&rabbitmq.url, "form-coordinator-publisher")),
        &rabbitmq.output_exchange,
    ));
    connect_with_retry("rabbitmq-publisher", rabbitmq.connect_attempts, broker_interval, || {
        publisher.connect()
    })
    .await
    .context("failed to connect notification publisher")?;

    let engine = Arc::new(ConsumptionEngine::new(
        Arc::new(RabbitMqTransport::new(&rabbitmq.url, "form-coordinator-consumer")),
        EngineConfig::from(rabbitmq),
    ));
    engine
        .subscribe(&rabbitmq.request_exchange, &rabbitmq.routing_key)
        .await
        .context("failed to register request exchange")?;
    connect_with_retry("rabbitmq-consumer", rabbitmq.connect_attempts, broker_interval, || {
        engine.connect()
    })
    .await
    .context("failed to connect consumption engine")?;

    let repository_handle: Arc<dyn FormRepository> = repository.clone();
    let cache_handle: Arc<dyn CacheGateway> = cache.clone();
    let notifier_handle: Arc<dyn NotificationGateway> = publisher.clone();

    let orchestrator = Arc::new(FormOrchestrator::from_config(
        repository_handle.clone(),
        cache_handle.clone(),
        notifier_handle.clone(),
        &config.retry,
    ));
    let dispatcher = Arc::new(EnvelopeDispatcher::new(orchestrator, &config.requests));

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(rabbitmq.delivery_queue_capacity);

    let engine_task = tokio::spawn(engine.clone().run(tx, cancel.clone()));
    let dispatcher_task = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(rx, cancel).await })
    };

    let web_task = if config.health.enabled {
        let registry = HealthRegistry::new()
            .with(Arc::new(RepositoryHealth(repository_handle)))
            .with(Arc::new(CacheHealth(cache_handle)))
            .with(Arc::new(NotifierHealth(notifier_handle)))
            .with(engine.clone());
        Some(
            web::serve(&config.health.bind_address, WebState::new(registry), cancel.clone())
                .await
                .context("failed to start health endpoint")?,
        )
    } else {
        None
    };

    info!("🔄 Form coordinator running... Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, initiating graceful shutdown...");
        }
        result = wait_for_sigterm() => {
            match result {
                Ok(()) => info!("🛑 Received SIGTERM, initiating graceful shutdown..."),
                Err(e) => warn!("⚠️  Error setting up SIGTERM handler: {}", e),
            }
        }
    }

    cancel.cancel();
    for (name, task) in [("consumer", engine_task), ("dispatcher", dispatcher_task)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }
    if let Some(task) = web_task {
        if let Err(e) = task.await {
            warn!(task = "health", error = %e, "Background task ended abnormally");
        }
    }

    let closers = CloserGroup::new()
        .with(engine)
        .with(publisher)
        .with(repository);
    closers.close().await.context("shutdown incomplete")?;

    info!(stats = ?dispatcher.stats(), "✅ Form coordinator shutdown complete");
    Ok(())
}

/// Wait for SIGTERM (container deployments)
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
