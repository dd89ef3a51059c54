use std::fmt::Display;

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, TimeDelta};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;
use tracing::debug;

use crate::{
    daemon::storage::{
        document_storage::{load_document, DocumentStorage},
        entities::AggregateData,
        AGGREGATE_KEY,
    },
    utils::{
        percentage::{duration_percentage, Percentage},
        time::{date_to_key, format_duration},
    },
};

use super::{
    output::{
        all_time_view, analysis::filter_by_share, day_view, hourly_histogram, week_view,
        SiteUsage, HOURS_IN_DAY,
    },
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Period {
    /// Sites of a single day.
    Today,
    /// Sites of the week containing the day, starting on Monday.
    Week,
    /// Lifetime totals.
    All,
    /// Hour by hour activity of a single day.
    Hours,
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(long, value_enum, default_value_t = Period::Today)]
    period: Period,
    #[arg(
        long,
        short,
        help = "Day to report on instead of today. Examples are \"yesterday\", \"3 days ago\", \"15/03/2025\""
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        short = 'p',
        long = "percentage",
        help = "Filter sites to have at least specified percentage",
        default_value = "1%"
    )]
    min_percentage: Percentage,
    #[arg(long, help = "Print at most this many sites")]
    limit: Option<usize>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Report {
    Sites {
        title: String,
        usages: Vec<SiteUsage>,
        total: TimeDelta,
    },
    Hours {
        title: String,
        histogram: [TimeDelta; HOURS_IN_DAY],
    },
}

/// Command to process `report` command. Prints the statistics collected by the host for the
/// requested period.
pub async fn process_report_command(
    command: ReportCommand,
    storage: &impl DocumentStorage,
) -> Result<()> {
    let day = resolve_day(command.date.as_deref(), command.date_style, Local::now())?;
    let data: AggregateData = load_document(storage, AGGREGATE_KEY).await?;
    debug!("Building {:?} report for {day}", command.period);

    let report = build_report(
        &data,
        command.period,
        day,
        command.min_percentage,
        command.limit,
    );
    print_report(&report);
    Ok(())
}

/// Turns the optional date expression into the day it names. Defaults to today.
fn resolve_day(
    date: Option<&str>,
    date_style: DateStyle,
    now: DateTime<Local>,
) -> Result<DateTime<Local>> {
    let Some(date) = date else {
        return Ok(now);
    };
    match parse_date_string(date, now, date_style.into()) {
        Ok(v) => Ok(v.with_timezone(&Local)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {e}"),
            )
            .into()),
    }
}

pub fn build_report(
    data: &AggregateData,
    period: Period,
    day: DateTime<Local>,
    min_percentage: Percentage,
    limit: Option<usize>,
) -> Report {
    let date = day.date_naive();
    let (title, usages) = match period {
        Period::Today => (date_to_key(date), day_view(data, date)),
        Period::Week => {
            let week_start = day.beginning_of_week().date_naive();
            (
                format!(
                    "{} to {}",
                    date_to_key(week_start),
                    date_to_key(week_end(week_start))
                ),
                week_view(data, week_start),
            )
        }
        Period::All => ("All time".to_string(), all_time_view(data)),
        Period::Hours => {
            return Report::Hours {
                title: date_to_key(date),
                histogram: hourly_histogram(data, date),
            }
        }
    };

    let (mut usages, total) = filter_by_share(usages, min_percentage);
    if let Some(limit) = limit {
        usages.truncate(limit);
    }
    Report::Sites {
        title,
        usages,
        total,
    }
}

fn print_report(report: &Report) {
    match report {
        Report::Sites {
            title,
            usages,
            total,
        } => {
            println!(
                "{}\t{}",
                Style::new().bold().paint(title),
                format_duration(*total)
            );
            if usages.is_empty() {
                println!("No activity recorded");
            }
            for usage in usages {
                println!(
                    "{}%\t{}\t{}\t{}",
                    *duration_percentage(usage.time, *total) as i32,
                    format_duration(usage.time),
                    visits(usage.visits),
                    Colour::Green.paint(usage.domain.as_str())
                );
            }
        }
        Report::Hours { title, histogram } => {
            println!("{}", Style::new().bold().paint(title));
            let busiest = histogram
                .iter()
                .max()
                .copied()
                .unwrap_or_else(TimeDelta::zero);
            for (hour, time) in histogram.iter().enumerate() {
                println!(
                    "{hour:02}:00\t{}\t{}",
                    hour_bar(*time, busiest),
                    format_duration(*time)
                );
            }
        }
    }
}

fn visits(count: u64) -> String {
    match count {
        1 => "1 visit".to_string(),
        n => format!("{n} visits"),
    }
}

const BAR_WIDTH: i64 = 30;

fn hour_bar(time: TimeDelta, busiest: TimeDelta) -> String {
    if busiest.num_milliseconds() <= 0 {
        return String::new();
    }
    let width = time.num_milliseconds() * BAR_WIDTH / busiest.num_milliseconds();
    "#".repeat(width.max(0) as usize)
}

fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + TimeDelta::days(6)
}
