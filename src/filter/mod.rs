//! Filter Compiler
//!
//! Turns optional query parameters into one composed predicate over index
//! records. Date bounds are also kept as plain values so a sorted visit list
//! can be narrowed by binary search before the remaining predicates run.
//!
//! Parameter names follow the public query strings: `fromDate`, `toDate`,
//! `country`, `toDistance` for visits and `fromDate`, `toDate`, `fromAge`,
//! `toAge`, `gender` for marks. A present parameter that fails to parse
//! rejects the whole filter.

mod marks;
mod visits;

pub use marks::{average_mark, birth_cutoff, MarkFilter};
pub use visits::VisitFilter;

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Source of raw query parameters
pub trait QueryParams {
    /// Raw value of `name`, if present
    fn param(&self, name: &str) -> Option<&str>;
}

impl QueryParams for HashMap<String, String> {
    fn param(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl QueryParams for HashMap<&str, &str> {
    fn param(&self, name: &str) -> Option<&str> {
        self.get(name).copied()
    }
}

impl QueryParams for [(&str, &str)] {
    fn param(&self, name: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

/// Boxed sub-filter
pub type Predicate<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

/// Logical AND of sub-filters
pub struct Composed<R> {
    predicates: Vec<Predicate<R>>,
}

impl<R> Default for Composed<R> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }
}

impl<R> Composed<R> {
    pub fn push(&mut self, predicate: impl Fn(&R) -> bool + Send + Sync + 'static) {
        self.predicates.push(Box::new(predicate));
    }

    /// True when every sub-filter accepts `record`
    pub fn matches(&self, record: &R) -> bool {
        self.predicates.iter().all(|p| p(record))
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl<R> std::fmt::Debug for Composed<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composed")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

/// Parse `name` as `T` when present
fn parse_param<T: FromStr, P: QueryParams + ?Sized>(params: &P, name: &str) -> Result<Option<T>> {
    match params.param(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidFilter(format!("invalid {}: {:?}", name, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_impls() {
        let mut owned = HashMap::new();
        owned.insert("country".to_string(), "Peru".to_string());
        assert_eq!(owned.param("country"), Some("Peru"));
        assert_eq!(owned.param("toDistance"), None);

        let pairs: &[(&str, &str)] = &[("fromDate", "5")];
        assert_eq!(pairs.param("fromDate"), Some("5"));
    }

    #[test]
    fn test_parse_param() {
        let pairs: &[(&str, &str)] = &[("n", "12"), ("bad", "1x"), ("empty", "")];
        assert_eq!(parse_param::<u32, _>(pairs, "n").unwrap(), Some(12));
        assert_eq!(parse_param::<u32, _>(pairs, "missing").unwrap(), None);
        assert!(parse_param::<u32, _>(pairs, "bad").is_err());
        assert!(parse_param::<i64, _>(pairs, "empty").is_err());
    }

    #[test]
    fn test_composed_is_conjunction() {
        let mut composed: Composed<u32> = Composed::default();
        assert!(composed.matches(&7));
        composed.push(|v| *v > 5);
        composed.push(|v| *v % 2 == 1);
        assert!(composed.matches(&7));
        assert!(!composed.matches(&8));
        assert!(!composed.matches(&3));
        assert_eq!(composed.len(), 2);
    }
}
