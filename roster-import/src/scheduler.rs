use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::pipeline::{Pipeline, TickOutcome};

/// Fires the pipeline once per period until `shutdown` resolves. Failed ticks are
/// already logged by the pipeline and never stop the loop.
pub struct PipelineScheduler {
    pipeline: Arc<Pipeline>,
    period: Duration,
    run_on_start: bool,
    liveness: HealthHandle,
}

impl PipelineScheduler {
    pub fn new(
        pipeline: Arc<Pipeline>,
        period: Duration,
        run_on_start: bool,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            pipeline,
            period,
            run_on_start,
            liveness,
        }
    }

    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let start = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.period
        };
        let mut interval = interval_at(start, self.period);
        // An overrunning tick swallows the firings it missed.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            organization = %self.pipeline.organization(),
            period_secs = self.period.as_secs(),
            run_on_start = self.run_on_start,
            "starting roster import scheduler"
        );
        self.liveness.report_healthy().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {}
            }

            // Shutdown waits for an in-flight tick.
            if let TickOutcome::Completed(report) = self.pipeline.run_tick().await {
                debug!(transitions = ?report.transitions, "tick finished");
            }
            self.liveness.report_healthy().await;
        }

        info!("roster import scheduler stopped");
    }
}
