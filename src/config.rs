//! Store Configuration
//!
//! Capacity ceilings, shard counts and field limits for the store.

use tracing::warn;

use crate::error::{Error, Result};

/// Default shard count (prime, spreads dense ids evenly)
pub const DEFAULT_SHARD_COUNT: usize = 509;

/// Default ceiling for user ids
pub const DEFAULT_MAX_USERS: u32 = 1_000_000;

/// Default ceiling for location ids
pub const DEFAULT_MAX_LOCATIONS: u32 = 1_000_000;

/// Default ceiling for visit ids
pub const DEFAULT_MAX_VISITS: u32 = 10_000_000;

/// 1930-01-01T00:00:00Z
pub const BIRTH_DATE_MIN: i64 = -1_262_304_000;

/// 1999-01-01T00:00:00Z
pub const BIRTH_DATE_MAX: i64 = 915_148_800;

/// 2000-01-01T00:00:00Z
pub const VISITED_AT_MIN: i64 = 946_684_800;

/// 2015-01-01T00:00:00Z
pub const VISITED_AT_MAX: i64 = 1_420_070_400;

/// Field limits checked before any record is stored
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Maximum email length in characters
    pub email_len: usize,
    /// Maximum first/last name length in characters
    pub name_len: usize,
    /// Maximum country length in characters
    pub country_len: usize,
    /// Maximum city length in characters
    pub city_len: usize,
    /// Inclusive birth date window, unchecked when `None`
    pub birth_date: Option<(i64, i64)>,
    /// Inclusive visit date window, unchecked when `None`
    pub visited_at: Option<(i64, i64)>,
    /// Highest accepted mark
    pub max_mark: u8,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            email_len: 100,
            name_len: 50,
            country_len: 50,
            city_len: 50,
            birth_date: None,
            visited_at: None,
            max_mark: 5,
        }
    }
}

impl Limits {
    /// Limits with the documented timestamp windows enforced
    pub fn strict() -> Self {
        Self {
            birth_date: Some((BIRTH_DATE_MIN, BIRTH_DATE_MAX)),
            visited_at: Some((VISITED_AT_MIN, VISITED_AT_MAX)),
            ..Self::default()
        }
    }
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of lock shards per table and per index
    pub shard_count: usize,
    /// Highest storable user id
    pub max_users: u32,
    /// Highest storable location id
    pub max_locations: u32,
    /// Highest storable visit id
    pub max_visits: u32,
    /// Field limits
    pub limits: Limits,
    /// Check visit foreign keys before the visit row is written.
    ///
    /// Off by default: a visit with an unknown user or location is still
    /// written, the insert reports the error and no index entries are made.
    pub strict_foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            max_users: DEFAULT_MAX_USERS,
            max_locations: DEFAULT_MAX_LOCATIONS,
            max_visits: DEFAULT_MAX_VISITS,
            limits: Limits::default(),
            strict_foreign_keys: false,
        }
    }
}

impl StoreConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(Error::Config("shard_count must be greater than 0".into()));
        }
        if self.max_users == 0 || self.max_locations == 0 || self.max_visits == 0 {
            return Err(Error::Config("table capacities must be greater than 0".into()));
        }
        if !is_prime(self.shard_count) {
            warn!(
                shard_count = self.shard_count,
                "shard count is not prime, ids may cluster on few shards"
            );
        }
        Ok(())
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}
