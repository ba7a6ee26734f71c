mod config;

use common::nats::NatsClient;
use common::telemetry::{TelemetryConfig, TelemetryProviders, init_telemetry, shutdown_telemetry};
use common::NatsKvTagStore;
use config::ServiceConfig;
use runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use ttn_bridge::{
    BridgeContext, DeviceMap, TokioSleeper, TtnBridge, TtnBridgeConfig, TtnHttpClient,
};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting ttn-bridge service"
    );
    debug!("Configuration: {:?}", config);

    let settings = config.ttn_settings();
    if let Err(e) = settings.check() {
        error!("Invalid TTN settings: {}", e);
        std::process::exit(1);
    }

    let (nats_client, tag_store) = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            std::process::exit(1);
        }
    };

    let transport = match TtnHttpClient::new(settings.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create TTN client: {:#}", e);
            std::process::exit(1);
        }
    };

    let ctx = BridgeContext::new(
        DeviceMap::from_entries(&config.device_entries()),
        tag_store.clone(),
        tag_store,
        config.tag_names(),
        config.debug_enabled,
    );

    let bridge = match TtnBridge::new(
        ctx,
        settings,
        transport.clone(),
        Arc::new(TokioSleeper),
        nats_client.create_consumer_client(),
        TtnBridgeConfig {
            uplink_stream: config.nats_uplink_stream.clone(),
            uplink_subject: config.nats_uplink_subject.clone(),
            consumer_name: config.nats_consumer_name.clone(),
            batch_size: config.nats_batch_size,
            batch_wait: Duration::from_secs(config.nats_batch_wait_secs),
            schedule_interval: Duration::from_secs(config.schedule_interval_secs),
        },
    )
    .await
    {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Failed to initialize TTN bridge: {:#}", e);
            std::process::exit(1);
        }
    };

    // Build runner with all processes
    let mut runner = Runner::new();
    for (name, process) in bridge.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // last handle once the processes have stopped; dropping it closes pooled connections
            drop(transport);
            nats_client.close().await;

            // Shutdown telemetry and flush pending traces
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    let code = runner.run().await;
    std::process::exit(code);
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(NatsClient, Arc<NatsKvTagStore>)> {
    info!("Initializing NATS...");
    let nats_client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;
    nats_client
        .ensure_stream(&config.nats_uplink_stream, &config.nats_uplink_subject)
        .await?;

    info!(bucket = %config.tag_bucket, "Initializing tag store...");
    let tag_store = Arc::new(NatsKvTagStore::new(nats_client.jetstream(), &config.tag_bucket).await?);

    Ok((nats_client, tag_store))
}
