// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use chrono::TimeDelta;
use serde::Deserialize;
use url::Url;

use crate::{classify::DEFAULT_HISTORICAL_CUTOFF_HOURS, error::QueryError};

pub const DEFAULT_CLUSTER: &str = "primary";
pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_CACHE_TTL_SECS: i64 = 30 * 60;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;
pub const MAX_HISTORICAL_CUTOFF_HOURS: i64 = 24 * 366 * 10;

#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "PlannerConfigFields")]
pub struct PlannerConfig {
    pub base_url: Url,
    pub cluster: String,
    pub historical_cutoff_hours: i64,
    pub default_limit: u32,
}

#[derive(Deserialize)]
struct PlannerConfigFields {
    base_url: Url,
    #[serde(default = "default_cluster")]
    cluster: String,
    #[serde(default = "default_cutoff_hours")]
    historical_cutoff_hours: i64,
    #[serde(default = "default_limit")]
    default_limit: u32,
}

impl TryFrom<PlannerConfigFields> for PlannerConfig {
    type Error = QueryError;

    fn try_from(fields: PlannerConfigFields) -> Result<Self, Self::Error> {
        let config = Self {
            base_url: fields.base_url,
            cluster: fields.cluster,
            historical_cutoff_hours: fields.historical_cutoff_hours,
            default_limit: fields.default_limit,
        };
        config.validate()?;
        Ok(config)
    }
}

impl PlannerConfig {
    pub fn new(base_url: &str) -> Result<Self, QueryError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| QueryError::Config(format!("invalid base URL {base_url}: {err}")))?;
        let config = Self {
            base_url,
            cluster: default_cluster(),
            historical_cutoff_hours: default_cutoff_hours(),
            default_limit: default_limit(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-run after changing any public field.
    pub fn validate(&self) -> Result<(), QueryError> {
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(QueryError::Config(format!(
                "base URL must be http or https, got {}",
                self.base_url.scheme()
            )));
        }
        if self.cluster.is_empty() {
            return Err(QueryError::Config("cluster name must not be empty".into()));
        }
        if !(1..=1_000).contains(&self.default_limit) {
            return Err(QueryError::Config(format!(
                "default limit must be between 1 and 1000, got {}",
                self.default_limit
            )));
        }
        self.historical_cutoff().map(|_| ())
    }

    pub fn historical_cutoff(&self) -> Result<TimeDelta, QueryError> {
        if self.historical_cutoff_hours > MAX_HISTORICAL_CUTOFF_HOURS {
            return Err(QueryError::Config(format!(
                "historical cutoff hours must be at most {MAX_HISTORICAL_CUTOFF_HOURS}, got {}",
                self.historical_cutoff_hours
            )));
        }
        positive_delta(
            self.historical_cutoff_hours,
            TimeDelta::try_hours,
            "historical cutoff hours",
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "CacheConfigFields")]
pub struct CacheConfig {
    pub ttl_secs: i64,
    pub max_entries: usize,
}

#[derive(Deserialize)]
struct CacheConfigFields {
    #[serde(default = "default_ttl_secs")]
    ttl_secs: i64,
    #[serde(default = "default_max_entries")]
    max_entries: usize,
}

impl TryFrom<CacheConfigFields> for CacheConfig {
    type Error = QueryError;

    fn try_from(fields: CacheConfigFields) -> Result<Self, Self::Error> {
        let config = Self {
            ttl_secs: fields.ttl_secs,
            max_entries: fields.max_entries,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.max_entries == 0 {
            return Err(QueryError::Config("cache max entries must be positive".into()));
        }
        self.ttl().map(|_| ())
    }

    pub fn ttl(&self) -> Result<TimeDelta, QueryError> {
        positive_delta(self.ttl_secs, TimeDelta::try_seconds, "cache TTL seconds")
    }
}

fn positive_delta(
    value: i64,
    build: fn(i64) -> Option<TimeDelta>,
    name: &str,
) -> Result<TimeDelta, QueryError> {
    match build(value) {
        Some(delta) if value > 0 => Ok(delta),
        _ => Err(QueryError::Config(format!(
            "{name} must be a positive in-range value, got {value}"
        ))),
    }
}

fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}

fn default_cutoff_hours() -> i64 {
    DEFAULT_HISTORICAL_CUTOFF_HOURS
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_ttl_secs() -> i64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let config = PlannerConfig::new("https://connect.example.com").unwrap();
        assert_eq!(config.cluster, "primary");
        assert_eq!(config.default_limit, 100);
        assert_eq!(config.historical_cutoff().unwrap(), TimeDelta::hours(24));
    }

    #[test]
    fn rejects_bad_base_urls() {
        assert!(matches!(PlannerConfig::new("not a url"), Err(QueryError::Config(_))));
        assert!(matches!(
            PlannerConfig::new("ftp://files.example.com"),
            Err(QueryError::Config(_))
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"base_url":"https://connect.example.com","cluster":"secondary"}"#)
                .unwrap();
        assert_eq!(config.cluster, "secondary");
        assert_eq!(config.historical_cutoff_hours, 24);

        let cache: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cache.ttl().unwrap(), TimeDelta::minutes(30));
        assert_eq!(cache.max_entries, 100);
    }

    #[test]
    fn rejects_out_of_range_cutoffs() {
        for hours in [0, -6, 10_000_000_000, i64::MAX] {
            let mut config = PlannerConfig::new("https://connect.example.com").unwrap();
            config.historical_cutoff_hours = hours;
            assert!(
                matches!(config.historical_cutoff(), Err(QueryError::Config(_))),
                "hours {hours}"
            );
            assert!(matches!(config.validate(), Err(QueryError::Config(_))));
        }
    }

    #[test]
    fn deserialize_runs_the_same_checks() {
        for raw in [
            r#"{"base_url":"ftp://files.example.com"}"#,
            r#"{"base_url":"https://connect.example.com","historical_cutoff_hours":-1}"#,
            r#"{"base_url":"https://connect.example.com","historical_cutoff_hours":10000000000}"#,
            r#"{"base_url":"https://connect.example.com","default_limit":0}"#,
        ] {
            assert!(serde_json::from_str::<PlannerConfig>(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn rejects_bad_cache_settings() {
        for ttl_secs in [0, -1, i64::MAX] {
            let config = CacheConfig {
                ttl_secs,
                max_entries: 10,
            };
            assert!(matches!(config.ttl(), Err(QueryError::Config(_))), "ttl {ttl_secs}");
        }
        let config = CacheConfig {
            ttl_secs: 60,
            max_entries: 0,
        };
        assert!(matches!(config.validate(), Err(QueryError::Config(_))));
        assert!(serde_json::from_str::<CacheConfig>(r#"{"ttl_secs":0}"#).is_err());
    }
}
