use crate::domain::DownlinkDispatcher;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs a downlink check every `period` until cancelled
///
/// The first check runs immediately. A slow check delays the following ones
/// instead of letting them pile up, so ticks never overlap.
pub struct DownlinkScheduler {
    dispatcher: Arc<DownlinkDispatcher>,
    period: Duration,
}

impl DownlinkScheduler {
    pub fn new(dispatcher: Arc<DownlinkDispatcher>, period: Duration) -> Self {
        Self { dispatcher, period }
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!(interval_secs = self.period.as_secs(), "starting downlink schedule");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("downlink schedule stopped");
                    break;
                }
                _ = ticker.tick() => {
                    // an in-flight check is abandoned on shutdown. A push TTN already accepted
                    // but whose request tag was not yet cleared is sent again after restart.
                    tokio::select! {
                        _ = ctx.cancelled() => {
                            info!("downlink schedule stopped during a check");
                            break;
                        }
                        summary = self.dispatcher.run_tick() => {
                            debug!(?summary, "downlink tick finished");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
