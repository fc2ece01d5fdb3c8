//! Location mark filter and average

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use super::{parse_param, Composed, QueryParams};
use crate::error::{Error, Result};
use crate::model::{Gender, LocationMark};

/// Birth date cutoff for an age of `years`: midnight UTC of today's calendar
/// date `years` years ago. A Feb 29 that does not exist becomes Mar 1.
pub fn birth_cutoff(now: DateTime<Utc>, years: u32) -> i64 {
    let today = now.date_naive();
    let Ok(year) = i32::try_from(i64::from(today.year()) - i64::from(years)) else {
        return i64::MIN;
    };
    NaiveDate::from_ymd_opt(year, today.month(), today.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(i64::MIN)
}

/// Compiled filter over a location's marks
#[derive(Debug, Default)]
pub struct MarkFilter {
    /// Keep marks with `visited_at > from_date`
    pub from_date: Option<i64>,
    /// Keep marks with `visited_at < to_date`
    pub to_date: Option<i64>,
    /// Keep users born at or before this instant (`fromAge`)
    pub born_until: Option<i64>,
    /// Keep users born at or after this instant (`toAge`)
    pub born_since: Option<i64>,
    pub gender: Option<Gender>,
    predicate: Composed<LocationMark>,
}

impl MarkFilter {
    /// Filter that accepts every mark
    pub fn all() -> Self {
        Self::default()
    }

    /// Compile against the current time
    pub fn compile<P: QueryParams + ?Sized>(params: &P) -> Result<Self> {
        Self::compile_at(params, Utc::now())
    }

    /// Compile `fromDate`, `toDate`, `fromAge`, `toAge` and `gender`, with
    /// ages measured from `now`
    pub fn compile_at<P: QueryParams + ?Sized>(params: &P, now: DateTime<Utc>) -> Result<Self> {
        let mut filter = Self::default();

        if let Some(from) = parse_param::<i64, _>(params, "fromDate")? {
            filter.from_date = Some(from);
            filter.predicate.push(move |m| m.visited_at > from);
        }

        if let Some(to) = parse_param::<i64, _>(params, "toDate")? {
            filter.to_date = Some(to);
            filter.predicate.push(move |m| m.visited_at < to);
        }

        if let Some(age) = parse_param::<u32, _>(params, "fromAge")? {
            let cutoff = birth_cutoff(now, age);
            filter.born_until = Some(cutoff);
            filter.predicate.push(move |m| m.birth_date <= cutoff);
        }

        // toAge=N still admits users aged N, so the bound is one year further back
        if let Some(age) = parse_param::<u32, _>(params, "toAge")? {
            let cutoff = birth_cutoff(now, age.saturating_add(1));
            filter.born_since = Some(cutoff);
            filter.predicate.push(move |m| m.birth_date >= cutoff);
        }

        if let Some(raw) = params.param("gender") {
            let gender = Gender::from_code(raw)
                .ok_or_else(|| Error::InvalidFilter(format!("invalid gender: {:?}", raw)))?;
            filter.gender = Some(gender);
            filter.predicate.push(move |m| m.gender == gender);
        }

        Ok(filter)
    }

    pub fn matches(&self, mark: &LocationMark) -> bool {
        self.predicate.matches(mark)
    }
}

/// Mean of the matching marks; `0.0` when nothing matches
pub fn average_mark<'a>(
    marks: impl IntoIterator<Item = &'a LocationMark>,
    filter: &MarkFilter,
) -> f64 {
    let (sum, count) = marks
        .into_iter()
        .filter(|m| filter.matches(m))
        .fold((0u64, 0u64), |(sum, count), m| (sum + u64::from(m.mark), count + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
