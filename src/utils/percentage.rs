use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || value.is_nan() {
            None
        } else {
            Some(Percentage(value))
        }
    }

    pub fn zero() -> Percentage {
        Percentage(0.)
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches("%");
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `whole` taken by `value`. An empty whole yields zero.
pub fn duration_percentage(value: Duration, whole: Duration) -> Percentage {
    if whole.num_milliseconds() <= 0 {
        return Percentage::zero();
    }
    Percentage::new_opt(value.num_milliseconds() as f64 / whole.num_milliseconds() as f64 * 100.)
        .unwrap_or_else(Percentage::zero)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{duration_percentage, Percentage};

    #[test]
    fn test_parse_percentage() {
        assert_eq!(*"5%".parse::<Percentage>().unwrap(), 5.);
        assert_eq!(*"2.5".parse::<Percentage>().unwrap(), 2.5);
        assert!("-1%".parse::<Percentage>().is_err());
    }

    #[test]
    fn test_duration_percentage() {
        assert_eq!(
            *duration_percentage(Duration::seconds(15), Duration::seconds(60)),
            25.
        );
        assert_eq!(
            *duration_percentage(Duration::seconds(15), Duration::zero()),
            0.
        );
    }
}
