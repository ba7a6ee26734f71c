use crate::domain::{
    BridgeContext, DownlinkDeliverer, DownlinkDispatcher, DownlinkTransport, RetryPolicy, Sleeper,
    TtnSettings, UplinkIngestor,
};
use crate::nats::create_uplink_processor;
use crate::schedule::DownlinkScheduler;
use common::nats::{JetStreamConsumer, NatsConsumer, NatsConsumerConfig};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub type BridgeFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process, shaped for `runner::Runner::with_boxed_process`
pub type BridgeProcess = Box<dyn FnOnce(CancellationToken) -> BridgeFuture + Send>;

pub struct TtnBridgeConfig {
    pub uplink_stream: String,
    pub uplink_subject: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub schedule_interval: Duration,
}

/// The uplink consumer and the downlink schedule, ready to hand to the runner
pub struct TtnBridge {
    uplink_consumer: NatsConsumer,
    scheduler: DownlinkScheduler,
}

impl TtnBridge {
    pub async fn new(
        ctx: BridgeContext,
        settings: TtnSettings,
        transport: Arc<dyn DownlinkTransport>,
        sleeper: Arc<dyn Sleeper>,
        consumer_client: Arc<dyn JetStreamConsumer>,
        config: TtnBridgeConfig,
    ) -> anyhow::Result<Self> {
        info!("Initializing TTN bridge module");

        info!(
            device_mappings = ctx.device_map.len(),
            api_url = %settings.api_url,
            application_id = %display_or_unset(&settings.application_id),
            "TTN bridge setup complete"
        );

        let ingestor = Arc::new(UplinkIngestor::new(ctx.clone()));
        let uplink_consumer = NatsConsumer::new(
            consumer_client,
            NatsConsumerConfig {
                stream_name: config.uplink_stream,
                consumer_name: config.consumer_name,
                subject_filter: config.uplink_subject,
                batch_size: config.batch_size,
                max_wait: config.batch_wait,
            },
            create_uplink_processor(ingestor),
        )
        .await?;

        let deliverer = DownlinkDeliverer::new(
            transport,
            sleeper,
            RetryPolicy::new(settings.max_attempts),
            ctx.errors.clone(),
        );
        let dispatcher = Arc::new(DownlinkDispatcher::new(ctx, settings, deliverer));
        let scheduler = DownlinkScheduler::new(dispatcher, config.schedule_interval);

        Ok(Self {
            uplink_consumer,
            scheduler,
        })
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, BridgeProcess)> {
        let consumer = self.uplink_consumer;
        let uplinks: BridgeProcess = Box::new(move |ctx| -> BridgeFuture {
            Box::pin(async move { consumer.run(ctx).await })
        });

        let scheduler = self.scheduler;
        let downlinks: BridgeProcess = Box::new(move |ctx| -> BridgeFuture {
            Box::pin(async move { scheduler.run(ctx).await })
        });

        vec![
            ("ttn_uplink_consumer", uplinks),
            ("ttn_downlink_schedule", downlinks),
        ]
    }
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() { "(not set)" } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeviceMap, MockDownlinkTransport, RecordingSleeper, TagNames};
    use common::nats::{MockJetStreamConsumer, MockPullConsumer};
    use common::InMemoryTagStore;

    #[tokio::test]
    async fn test_bridge_yields_consumer_and_schedule_processes() {
        let store = Arc::new(InMemoryTagStore::new());
        let ctx = BridgeContext::new(
            DeviceMap::default(),
            store.clone(),
            store,
            TagNames::default(),
            false,
        );
        let mut consumer_client = MockJetStreamConsumer::new();
        consumer_client
            .expect_create_consumer()
            .withf(|config, stream: &str| {
                stream == "ttn_uplinks" && config.filter_subject == "ttn_uplinks.>"
            })
            .times(1)
            .return_once(|_, _| Ok(Box::new(MockPullConsumer::new())));

        let bridge = TtnBridge::new(
            ctx,
            TtnSettings::new("", "", "", ""),
            Arc::new(MockDownlinkTransport::new()),
            Arc::new(RecordingSleeper::new()),
            Arc::new(consumer_client),
            TtnBridgeConfig {
                uplink_stream: "ttn_uplinks".to_string(),
                uplink_subject: "ttn_uplinks.>".to_string(),
                consumer_name: "ttn-bridge".to_string(),
                batch_size: 10,
                batch_wait: Duration::from_secs(5),
                schedule_interval: Duration::from_secs(60),
            },
        )
        .await
        .unwrap();

        let names: Vec<&str> = bridge
            .into_runner_processes()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["ttn_uplink_consumer", "ttn_downlink_schedule"]);
    }

    #[test]
    fn test_unset_values_are_labelled() {
        assert_eq!(display_or_unset(""), "(not set)");
        assert_eq!(display_or_unset("my-app"), "my-app");
    }
}
