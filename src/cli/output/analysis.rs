use chrono::TimeDelta;

use crate::utils::percentage::{duration_percentage, Percentage};

use super::SiteUsage;

/// Drops sites that take less than `min_percentage` of the combined time. Returns the kept sites
/// in their original order together with the combined time of all sites, dropped ones included.
pub fn filter_by_share(
    usages: Vec<SiteUsage>,
    min_percentage: Percentage,
) -> (Vec<SiteUsage>, TimeDelta) {
    let total = usages
        .iter()
        .fold(TimeDelta::zero(), |acc, usage| acc + usage.time);

    let kept = usages
        .into_iter()
        .filter(|usage| duration_percentage(usage.time, total) >= min_percentage)
        .collect();
    (kept, total)
}
