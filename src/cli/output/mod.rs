//! Reduces the aggregate document into the views printed by the cli. Everything here is a pure
//! function of [AggregateData], nothing is written back.

pub mod analysis;

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta};

use crate::{
    daemon::storage::entities::{AggregateData, DailyBucket},
    domain::TrackedDomain,
    utils::time::date_range,
};

pub const HOURS_IN_DAY: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteUsage {
    pub domain: TrackedDomain,
    pub time: TimeDelta,
    pub visits: u64,
}

impl SiteUsage {
    fn new(domain: TrackedDomain) -> Self {
        Self {
            domain,
            time: TimeDelta::zero(),
            visits: 0,
        }
    }
}

/// Most time first. Equal times are ordered by domain so output is stable.
fn sorted(usages: impl IntoIterator<Item = SiteUsage>) -> Vec<SiteUsage> {
    let mut usages = usages.into_iter().collect::<Vec<_>>();
    usages.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.domain.cmp(&b.domain)));
    usages
}

fn accumulate<'a>(
    usages: &mut BTreeMap<TrackedDomain, SiteUsage>,
    buckets: impl Iterator<Item = (&'a TrackedDomain, &'a DailyBucket)>,
) {
    for (domain, bucket) in buckets {
        let usage = usages
            .entry(domain.clone())
            .or_insert_with(|| SiteUsage::new(domain.clone()));
        usage.time += bucket.time;
        usage.visits += bucket.visit_count;
    }
}

/// Per-domain time and visits of a single local day.
pub fn day_view(data: &AggregateData, day: NaiveDate) -> Vec<SiteUsage> {
    range_view(data, day, 1)
}

/// Sums the daily buckets of `days` consecutive days starting with `start`.
pub fn range_view(data: &AggregateData, start: NaiveDate, days: u32) -> Vec<SiteUsage> {
    let mut usages = BTreeMap::new();
    for day in date_range(start, days) {
        if let Some(domains) = data.daily_stats.get(&day) {
            accumulate(&mut usages, domains.iter());
        }
    }
    sorted(usages.into_values())
}

pub fn week_view(data: &AggregateData, week_start: NaiveDate) -> Vec<SiteUsage> {
    range_view(data, week_start, 7)
}

/// Lifetime totals of every site ever seen.
pub fn all_time_view(data: &AggregateData) -> Vec<SiteUsage> {
    sorted(data.sites.iter().map(|(domain, site)| SiteUsage {
        domain: domain.clone(),
        time: site.total_time,
        visits: site.visit_count,
    }))
}

/// Time spent in each local hour of `day`, across all domains.
pub fn hourly_histogram(data: &AggregateData, day: NaiveDate) -> [TimeDelta; HOURS_IN_DAY] {
    let mut histogram = [TimeDelta::zero(); HOURS_IN_DAY];
    if let Some(hours) = data.hourly_stats.get(&day) {
        for (hour, bucket) in hours {
            if let Some(slot) = histogram.get_mut(*hour as usize) {
                *slot += bucket.time;
            }
        }
    }
    histogram
}
