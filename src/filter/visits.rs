//! Visit listing filter

use std::ops::Range;

use super::{parse_param, Composed, QueryParams};
use crate::error::{Error, Result};
use crate::model::UserVisit;

/// Compiled filter over a user's visit history
#[derive(Debug, Default)]
pub struct VisitFilter {
    /// Keep visits with `visited_at > from_date`
    pub from_date: Option<i64>,
    /// Keep visits with `visited_at < to_date`
    pub to_date: Option<i64>,
    /// Every sub-filter, dates included
    predicate: Composed<UserVisit>,
}

impl VisitFilter {
    /// Filter that accepts every visit
    pub fn all() -> Self {
        Self::default()
    }

    /// Compile `fromDate`, `toDate`, `country` and `toDistance`
    pub fn compile<P: QueryParams + ?Sized>(params: &P) -> Result<Self> {
        let mut filter = Self::default();

        if let Some(from) = parse_param::<i64, _>(params, "fromDate")? {
            filter.from_date = Some(from);
            filter.predicate.push(move |v| v.visited_at > from);
        }

        if let Some(to) = parse_param::<i64, _>(params, "toDate")? {
            filter.to_date = Some(to);
            filter.predicate.push(move |v| v.visited_at < to);
        }

        if let Some(country) = params.param("country") {
            if country.is_empty() {
                return Err(Error::InvalidFilter("invalid country: empty".into()));
            }
            let country = country.to_string();
            filter.predicate.push(move |v| v.country == country);
        }

        if let Some(max) = parse_param::<u32, _>(params, "toDistance")? {
            filter.predicate.push(move |v| v.distance < max);
        }

        Ok(filter)
    }

    pub fn matches(&self, visit: &UserVisit) -> bool {
        self.predicate.matches(visit)
    }

    /// Index range of `visits` (sorted by date) inside the date bounds
    pub fn date_range(&self, visits: &[UserVisit]) -> Range<usize> {
        let start = match self.from_date {
            Some(from) => visits.partition_point(|v| v.visited_at <= from),
            None => 0,
        };
        let end = match self.to_date {
            Some(to) => visits.partition_point(|v| v.visited_at < to),
            None => visits.len(),
        };
        start..end.max(start)
    }

    /// Matching visits of a date-sorted slice, in order
    pub fn apply(&self, visits: &[UserVisit]) -> Vec<UserVisit> {
        visits[self.date_range(visits)]
            .iter()
            .filter(|v| self.matches(v))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(visited_at: i64, country: &str, distance: u32) -> UserVisit {
        UserVisit {
            mark: 1,
            visited_at,
            place: String::new(),
            visit_id: visited_at as u32,
            location_id: 1,
            country: country.into(),
            distance,
        }
    }

    fn sorted() -> Vec<UserVisit> {
        vec![
            visit(10, "A", 1),
            visit(20, "B", 50),
            visit(20, "A", 5),
            visit(30, "A", 100),
            visit(40, "B", 2),
        ]
    }

    fn dates(visits: &[UserVisit]) -> Vec<i64> {
        visits.iter().map(|v| v.visited_at).collect()
    }

    #[test]
    fn test_no_params_accepts_all() {
        let pairs: &[(&str, &str)] = &[];
        let filter = VisitFilter::compile(pairs).unwrap();
        assert_eq!(filter.apply(&sorted()).len(), 5);
    }

    #[test]
    fn test_date_bounds_are_exclusive() {
        let pairs: &[(&str, &str)] = &[("fromDate", "10"), ("toDate", "40")];
        let filter = VisitFilter::compile(pairs).unwrap();
        let visits = sorted();
        assert_eq!(filter.date_range(&visits), 1..4);
        assert_eq!(dates(&filter.apply(&visits)), vec![20, 20, 30]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let pairs: &[(&str, &str)] = &[("fromDate", "35"), ("toDate", "15")];
        let filter = VisitFilter::compile(pairs).unwrap();
        assert!(filter.date_range(&sorted()).is_empty());
        assert!(filter.apply(&sorted()).is_empty());
    }

    #[test]
    fn test_country_and_distance() {
        let pairs: &[(&str, &str)] = &[("country", "A"), ("toDistance", "100")];
        let filter = VisitFilter::compile(pairs).unwrap();
        assert_eq!(dates(&filter.apply(&sorted())), vec![10, 20]);
    }

    #[test]
    fn test_invalid_params() {
        for pairs in [
            &[("fromDate", "abc")][..],
            &[("toDate", "")][..],
            &[("toDistance", "-1")][..],
            &[("country", "")][..],
        ] {
            assert!(VisitFilter::compile(pairs).is_err(), "{:?}", pairs);
        }
    }
}
