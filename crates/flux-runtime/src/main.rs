//! # Flux-Bus Node
//!
//! The demo runtime for the messaging layer. Wires a publisher and/or a
//! subscriber from a TOML configuration file and runs until interrupted.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (path from argv, default `flux-node.toml`)
//! 2. Initialize tracing
//! 3. Configure security keys (before any socket starts)
//! 4. Start the publisher, then its heartbeat loop
//! 5. Start the subscriber and activate its subscriptions
//! 6. Run until ctrl-c, then stop everything within the teardown bound
//!
//! ```bash
//! flux-node node.toml
//! FLUX_LOG=debug flux-node node.toml
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use flux_pubsub::{
    ContentEnvelope, Endpoint, EventRecord, Publisher, Subscriber, Topic, TopicSelector,
};
use flux_runtime::config::{PublisherSection, RuntimeConfig, SubscriberSection};
use flux_telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "flux-node.toml".to_string());
    let config =
        RuntimeConfig::load(&config_path).with_context(|| format!("loading {config_path}"))?;

    init_tracing(&TelemetryConfig {
        log_filter: config.telemetry.log_filter.clone(),
        json_logs: config.telemetry.json_logs,
    })
    .context("initializing tracing")?;

    info!(config = %config_path, "starting flux-node");

    let (shutdown_tx, _) = tokio::sync::watch::channel(false);
    let mut heartbeat_task = None;

    let publisher = match &config.publisher {
        Some(section) => {
            let publisher = start_publisher(section).await?;
            heartbeat_task = Some(tokio::spawn(run_heartbeat(
                Arc::clone(&publisher),
                section.clone(),
                shutdown_tx.subscribe(),
            )));
            Some(publisher)
        }
        None => None,
    };

    let subscriber = match &config.subscriber {
        Some(section) => Some(start_subscriber(section).await?),
        None => None,
    };

    if publisher.is_none() && subscriber.is_none() {
        anyhow::bail!("config declares neither a publisher nor a subscriber role");
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Some(task) = heartbeat_task {
        let _ = task.await;
    }
    if let Some(publisher) = &publisher {
        if let Err(e) = publisher.stop().await {
            error!(error = %e, "publisher stop failed");
        }
    }
    if let Some(subscriber) = &subscriber {
        if let Err(e) = subscriber.stop().await {
            error!(error = %e, "subscriber stop failed");
        }
    }
    info!("flux-node stopped");
    Ok(())
}

async fn start_publisher(section: &PublisherSection) -> Result<Arc<Publisher>> {
    let publisher = Arc::new(Publisher::new(section.port));
    if let Some(secret) = &section.server_private_key {
        publisher
            .set_server_private_key(secret)
            .await
            .context("configuring publisher security")?;
    }
    publisher
        .start()
        .await
        .with_context(|| format!("starting publisher on port {}", section.port))?;
    let port = publisher.local_port().await.context("querying bound port")?;
    info!(port, "publisher listening");
    Ok(publisher)
}

async fn start_subscriber(section: &SubscriberSection) -> Result<Subscriber> {
    let endpoint = Endpoint::parse(&section.ip, section.port)
        .with_context(|| format!("invalid subscriber target {}:{}", section.ip, section.port))?;

    let subscriber = Subscriber::new(
        endpoint,
        Arc::new(|envelope: ContentEnvelope| {
            info!(kind = ?envelope.content_type(), "received broadcast message");
        }),
        Arc::new(|topic: &Topic, envelope: ContentEnvelope| {
            info!(topic = %topic, kind = ?envelope.content_type(), "received topic message");
        }),
    );

    if let (Some(secret), Some(public)) =
        (&section.client_private_key, &section.client_public_key)
    {
        subscriber
            .set_client_keys(secret, public)
            .await
            .context("configuring subscriber client keys")?;
    }
    if let Some(server_key) = &section.server_public_key {
        subscriber
            .set_server_public_key(server_key)
            .await
            .context("configuring trusted server key")?;
    }

    subscriber
        .start()
        .await
        .with_context(|| format!("connecting subscriber to {endpoint}"))?;

    if section.topics.is_empty() {
        subscriber.subscribe().context("activating all-topics subscription")?;
        info!(target = %endpoint, "subscribed to all topics");
    } else {
        let topics: Vec<&str> = section.topics.iter().map(String::as_str).collect();
        subscriber
            .subscribe_topics(&topics)
            .context("activating topic subscriptions")?;
        info!(target = %endpoint, topics = ?section.topics, "subscribed");
    }
    Ok(subscriber)
}

/// Publish a periodic heartbeat event until shutdown.
async fn run_heartbeat(
    publisher: Arc<Publisher>,
    section: PublisherSection,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let selector = match TopicSelector::from_strings(
        &section.topics.iter().map(String::as_str).collect::<Vec<_>>(),
    ) {
        Ok(selector) => selector,
        Err(e) => {
            error!(error = %e, "invalid heartbeat topics; heartbeat disabled");
            return;
        }
    };

    let mut interval = tokio::time::interval(Duration::from_secs(section.heartbeat_secs.max(1)));
    let mut seq: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {
                seq += 1;
                let envelope = ContentEnvelope::Event(EventRecord::new(
                    "heartbeat",
                    serde_json::json!({ "seq": seq }),
                ));
                match publisher.publish_to(&envelope, &selector).await {
                    Ok(sessions) => info!(seq, sessions, "heartbeat published"),
                    Err(e) => {
                        error!(error = %e, "heartbeat publish failed; stopping heartbeat");
                        break;
                    }
                }
            }
        }
    }
}
