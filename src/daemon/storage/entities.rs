use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TrackedDomain;

use super::favicon::FaviconLookup;

/// Lifetime statistics of a single domain.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SiteAggregate {
    #[serde(with = "duration_ser")]
    pub total_time: TimeDelta,
    pub visit_count: u64,
    pub first_seen: DateTime<Utc>,
    #[serde(default)]
    pub favicon_ref: Option<String>,
}

impl SiteAggregate {
    pub fn first_seen(moment: DateTime<Utc>, favicon_ref: Option<String>) -> Self {
        Self {
            total_time: TimeDelta::zero(),
            visit_count: 0,
            first_seen: moment,
            favicon_ref,
        }
    }
}

/// Statistics of a domain for one local calendar day.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyBucket {
    #[serde(with = "duration_ser")]
    pub time: TimeDelta,
    pub visit_count: u64,
}

impl Default for DailyBucket {
    fn default() -> Self {
        Self {
            time: TimeDelta::zero(),
            visit_count: 0,
        }
    }
}

/// Time spent during one local hour, across all domains. Stored as a bare duration.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(transparent)]
pub struct HourlyBucket {
    #[serde(with = "duration_ser")]
    pub time: TimeDelta,
}

impl Default for HourlyBucket {
    fn default() -> Self {
        Self {
            time: TimeDelta::zero(),
        }
    }
}

pub type DailyStats = BTreeMap<NaiveDate, BTreeMap<TrackedDomain, DailyBucket>>;
pub type HourlyStats = BTreeMap<NaiveDate, BTreeMap<u32, HourlyBucket>>;

/// The `aggregate` document. Every accumulator is updated within a single document so one write
/// keeps site totals, daily buckets and hourly buckets consistent with each other.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateData {
    pub sites: BTreeMap<TrackedDomain, SiteAggregate>,
    pub daily_stats: DailyStats,
    #[serde(deserialize_with = "hour_keys::deserialize")]
    pub hourly_stats: HourlyStats,
    pub last_updated: Option<DateTime<Utc>>,
}

impl AggregateData {
    pub fn cleared(now: DateTime<Utc>) -> Self {
        Self {
            last_updated: Some(now),
            ..Default::default()
        }
    }

    pub fn from_export(data: ExportedData, now: DateTime<Utc>) -> Self {
        Self {
            sites: data.sites,
            daily_stats: data.daily_stats,
            hourly_stats: data.hourly_stats,
            last_updated: Some(now),
        }
    }

    fn site_entry(
        &mut self,
        domain: &TrackedDomain,
        now: DateTime<Utc>,
        favicons: &dyn FaviconLookup,
    ) -> &mut SiteAggregate {
        self.sites
            .entry(domain.clone())
            .or_insert_with(|| SiteAggregate::first_seen(now, favicons.favicon_for(domain)))
    }

    fn daily_entry(&mut self, domain: &TrackedDomain, day: NaiveDate) -> &mut DailyBucket {
        self.daily_stats
            .entry(day)
            .or_default()
            .entry(domain.clone())
            .or_default()
    }

    /// Adds `amount` to the site total, the day bucket and the hour bucket in one go. Nothing
    /// changes when any of the three would overflow.
    pub fn apply_time_delta(
        &mut self,
        domain: &TrackedDomain,
        amount: TimeDelta,
        day: NaiveDate,
        hour: u32,
        now: DateTime<Utc>,
        favicons: &dyn FaviconLookup,
    ) -> Result<()> {
        let overflow = || anyhow!("Adding {amount} to {domain} overflows its statistics");
        let site_total = self
            .sites
            .get(domain)
            .map_or(TimeDelta::zero(), |site| site.total_time)
            .checked_add(&amount)
            .ok_or_else(overflow)?;
        let day_total = self
            .daily_stats
            .get(&day)
            .and_then(|domains| domains.get(domain))
            .map_or(TimeDelta::zero(), |bucket| bucket.time)
            .checked_add(&amount)
            .ok_or_else(overflow)?;
        let hour_total = self
            .hourly_stats
            .get(&day)
            .and_then(|hours| hours.get(&hour))
            .map_or(TimeDelta::zero(), |bucket| bucket.time)
            .checked_add(&amount)
            .ok_or_else(overflow)?;

        self.site_entry(domain, now, favicons).total_time = site_total;
        self.daily_entry(domain, day).time = day_total;
        self.hourly_stats
            .entry(day)
            .or_default()
            .entry(hour)
            .or_default()
            .time = hour_total;
        self.last_updated = Some(now);
        Ok(())
    }

    pub fn record_visit(
        &mut self,
        domain: &TrackedDomain,
        day: NaiveDate,
        now: DateTime<Utc>,
        favicons: &dyn FaviconLookup,
    ) {
        let site = self.site_entry(domain, now, favicons);
        site.visit_count = site.visit_count.saturating_add(1);
        let bucket = self.daily_entry(domain, day);
        bucket.visit_count = bucket.visit_count.saturating_add(1);
        self.last_updated = Some(now);
    }
}

/// The `tracking` document: what the user is looking at right now.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityState {
    pub current_domain_url: Option<String>,
    pub last_sample_timestamp: Option<DateTime<Utc>>,
    pub user_present: bool,
    pub active_tab_id: Option<u32>,
}

impl Default for ActivityState {
    /// The host only runs while the browser does, so the user is assumed present until an idle
    /// or lock signal says otherwise.
    fn default() -> Self {
        Self {
            current_domain_url: None,
            last_sample_timestamp: None,
            user_present: true,
            active_tab_id: None,
        }
    }
}

/// Aggregate contents as they appear in an export.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportedData {
    pub sites: BTreeMap<TrackedDomain, SiteAggregate>,
    pub daily_stats: DailyStats,
    #[serde(deserialize_with = "hour_keys::deserialize")]
    pub hourly_stats: HourlyStats,
}

impl From<AggregateData> for ExportedData {
    fn from(data: AggregateData) -> Self {
        Self {
            sites: data.sites,
            daily_stats: data.daily_stats,
            hourly_stats: data.hourly_stats,
        }
    }
}

/// `{exportDate, data: {sites, dailyStats, hourlyStats}}`
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub export_date: DateTime<Utc>,
    pub data: ExportedData,
}

impl ExportEnvelope {
    pub fn new(data: AggregateData, export_date: DateTime<Utc>) -> Self {
        Self {
            export_date,
            data: data.into(),
        }
    }
}

/// Durations are kept as whole milliseconds.
mod duration_ser {
    use chrono::TimeDelta;
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = i64::deserialize(deserializer)?;
        TimeDelta::try_milliseconds(ms)
            .ok_or_else(|| D::Error::custom(format!("duration of {ms}ms is out of range")))
    }
}

/// Hour buckets are keyed by the hour of the day. Json keeps object keys as strings, and a
/// document that went through a tagged message arrives with the keys still as strings.
mod hour_keys {
    use std::{collections::BTreeMap, fmt};

    use chrono::NaiveDate;
    use serde::{
        de::{self, Visitor},
        Deserialize, Deserializer,
    };

    use super::{HourlyBucket, HourlyStats};

    #[derive(PartialEq, Eq, PartialOrd, Ord)]
    struct HourOfDay(u32);

    impl HourOfDay {
        fn new<E: de::Error>(hour: u64) -> Result<Self, E> {
            match u32::try_from(hour) {
                Ok(hour) if hour < 24 => Ok(HourOfDay(hour)),
                _ => Err(E::custom(format!("{hour} isn't an hour of the day"))),
            }
        }
    }

    struct HourVisitor;

    impl Visitor<'_> for HourVisitor {
        type Value = HourOfDay;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an hour between 0 and 23")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            HourOfDay::new(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            let hour = u64::try_from(v)
                .map_err(|_| E::custom(format!("{v} isn't an hour of the day")))?;
            HourOfDay::new(hour)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let hour = v
                .parse::<u64>()
                .map_err(|_| E::custom(format!("{v:?} isn't an hour of the day")))?;
            HourOfDay::new(hour)
        }
    }

    impl<'de> Deserialize<'de> for HourOfDay {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(HourVisitor)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HourlyStats, D::Error>
    where
        D: Deserializer<'de>,
    {
        let stats = BTreeMap::<NaiveDate, BTreeMap<HourOfDay, HourlyBucket>>::deserialize(
            deserializer,
        )?;
        Ok(stats
            .into_iter()
            .map(|(day, hours)| {
                let hours = hours
                    .into_iter()
                    .map(|(HourOfDay(hour), bucket)| (hour, bucket))
                    .collect();
                (day, hours)
            })
            .collect())
    }
}
