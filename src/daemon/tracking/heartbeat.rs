use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    daemon::{processing::StoreHandle, storage::document_storage::DocumentStorage},
    domain::{trackable_domain, TrackedDomain},
    utils::{clock::Clock, time::local_bucket},
};

use super::tracker::{ActivityTracker, SampleWindow};

pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// Gaps shorter than this are timer jitter rather than engagement.
const MIN_ATTRIBUTABLE_GAP_MS: i64 = 1000;

/// Decides which measured gaps count as active time. The upper bound is one and a half heartbeat
/// periods: one late tick is tolerated, anything longer is assumed to contain a sleep or suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapPolicy {
    min: TimeDelta,
    max: TimeDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapVerdict {
    /// No previous sample to measure from.
    FirstSample,
    BelowResolution(TimeDelta),
    Suspended(TimeDelta),
    Attribute(TimeDelta),
}

impl GapPolicy {
    pub fn for_period(period: Duration) -> Self {
        let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX / 3);
        Self {
            min: TimeDelta::milliseconds(MIN_ATTRIBUTABLE_GAP_MS),
            max: TimeDelta::milliseconds(period_ms * 3 / 2),
        }
    }

    pub fn max_gap(&self) -> TimeDelta {
        self.max
    }

    pub fn evaluate(&self, previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> GapVerdict {
        let Some(previous) = previous else {
            return GapVerdict::FirstSample;
        };
        let gap = now - previous;
        if gap < self.min {
            GapVerdict::BelowResolution(gap)
        } else if gap > self.max {
            GapVerdict::Suspended(gap)
        } else {
            GapVerdict::Attribute(gap)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The user is away or nothing trackable is in view.
    Untracked,
    Discarded(GapVerdict),
    Attributed {
        domain: TrackedDomain,
        amount: TimeDelta,
    },
}

/// Periodically converts elapsed wall time into time spent on the viewed domain.
pub struct HeartbeatAccumulator<S> {
    tracker: Arc<ActivityTracker<S>>,
    store: StoreHandle,
    policy: GapPolicy,
    period: Duration,
    shutdown: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStorage> HeartbeatAccumulator<S> {
    pub fn new(
        tracker: Arc<ActivityTracker<S>>,
        store: StoreHandle,
        period: Duration,
        shutdown: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            store,
            policy: GapPolicy::for_period(period),
            period,
            shutdown,
            clock,
        }
    }

    /// Takes one sample. The sample clock always moves to the tick time, whatever the verdict, so
    /// the next tick only measures the interval since this one.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let now = self.clock.time();
        let window = self.tracker.advance_sample(now).await;

        let Some(domain) = tracked_domain(&window) else {
            return Ok(TickOutcome::Untracked);
        };

        let amount = match self.policy.evaluate(window.previous, window.now) {
            GapVerdict::Attribute(amount) => amount,
            verdict => return Ok(TickOutcome::Discarded(verdict)),
        };

        let (day, hour) = local_bucket(window.now);
        self.store
            .apply_time_delta(domain.clone(), amount, day, hour)
            .await?;
        Ok(TickOutcome::Attributed { domain, amount })
    }

    /// Executes the heartbeat loop until shutdown.
    pub async fn run(self) -> Result<()> {
        info!(
            "Heartbeat every {:?}, gaps over {} are discarded",
            self.period,
            self.policy.max_gap()
        );
        let mut tick_point = self.clock.instant();
        loop {
            tick_point += self.period;
            let now = self.clock.instant();
            if tick_point + self.period < now {
                // The loop itself was stalled. Skip the missed ticks instead of firing them back
                // to back.
                debug!("Heartbeat schedule fell behind, re-anchoring");
                tick_point = now + self.period;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }

            let span = info_span!("Heartbeat tick");
            match self.tick().instrument(span).await {
                Ok(TickOutcome::Attributed { domain, amount }) => {
                    info!("Attributed {}ms to {domain}", amount.num_milliseconds())
                }
                Ok(outcome) => debug!("Nothing attributed {:?}", outcome),
                Err(e) => error!("Heartbeat failed to commit {e:?}"),
            }
        }
    }
}

fn tracked_domain(window: &SampleWindow) -> Option<TrackedDomain> {
    if !window.user_present {
        return None;
    }
    window.url.as_deref().and_then(trackable_domain)
}
