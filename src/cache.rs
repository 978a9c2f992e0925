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

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    clock::SharedClock,
    config::CacheConfig,
    error::QueryError,
    filters::DataType,
    planner::{LogEntry, QueryMetadata},
};

const CACHE_ID_LEN: usize = 12;

#[derive(Clone, Debug)]
pub struct CacheKeyOptions<'a> {
    pub sources: &'a [String],
    pub limit: u32,
    pub data_type: DataType,
}

/// First 12 hex chars of a SHA-256 over the query and its options.
pub fn generate_cache_id(query: &str, options: &CacheKeyOptions<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update([0u8]);
    for source in options.sources {
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(options.limit.to_be_bytes());
    hasher.update(options.data_type.as_str().as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(CACHE_ID_LEN);
    id
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CacheLookupError {
    #[error("Cache ID not found or expired")]
    NotFound,
    #[error("Invalid log index: {index}. Valid range: 0-{}", last_index(.len))]
    InvalidIndex { index: i64, len: usize },
}

fn last_index(len: &usize) -> i64 {
    i64::try_from(*len).unwrap_or(i64::MAX) - 1
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CachedLogDetails {
    pub log: LogEntry,
    pub metadata: QueryMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_caches: usize,
    pub total_logs: usize,
    /// Milliseconds since the oldest live entry was stored.
    pub oldest_cache_age: Option<i64>,
}

#[derive(Debug)]
struct CacheRecord {
    rows: Vec<LogEntry>,
    metadata: QueryMetadata,
    created_at: DateTime<Utc>,
}

pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheRecord>>,
    clock: SharedClock,
    ttl: TimeDelta,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(config: CacheConfig, clock: SharedClock) -> Result<Self, QueryError> {
        config.validate()?;
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            ttl: config.ttl()?,
            max_entries: config.max_entries,
        })
    }

    pub fn cache_log_results(&self, id: &str, rows: Vec<LogEntry>, metadata: QueryMetadata) {
        let now = self.clock.now();
        let mut entries = self.lock();
        let swept = self.sweep_locked(&mut entries, now);
        if swept > 0 {
            debug!("dropped {swept} expired result caches");
        }
        if !entries.contains_key(id) {
            let capacity = self.max_entries;
            while entries.len() >= capacity {
                let Some(oldest) = oldest_id(&entries) else {
                    break;
                };
                entries.remove(&oldest);
                info!("evicted result cache {oldest}: capacity {capacity} reached");
            }
        }
        debug!("cached {} rows under {id}", rows.len());
        entries.insert(id.to_string(), CacheRecord {
            rows,
            metadata,
            created_at: now,
        });
    }

    pub fn get_cached_log_details(
        &self,
        id: &str,
        index: i64,
    ) -> Result<CachedLogDetails, CacheLookupError> {
        let now = self.clock.now();
        let entries = self.lock();
        let record = entries
            .get(id)
            .filter(|record| !self.is_expired(record, now))
            .ok_or(CacheLookupError::NotFound)?;
        let log = usize::try_from(index)
            .ok()
            .and_then(|position| record.rows.get(position))
            .ok_or(CacheLookupError::InvalidIndex {
                index,
                len: record.rows.len(),
            })?;
        Ok(CachedLogDetails {
            log: log.clone(),
            metadata: record.metadata.clone(),
        })
    }

    pub fn get_log_cache_stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.lock();
        let live: Vec<&CacheRecord> = entries
            .values()
            .filter(|record| !self.is_expired(record, now))
            .collect();
        CacheStats {
            total_caches: live.len(),
            total_logs: live.iter().map(|record| record.rows.len()).sum(),
            oldest_cache_age: live
                .iter()
                .map(|record| record.created_at)
                .min()
                .map(|oldest| (now - oldest).num_milliseconds()),
        }
    }

    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        self.sweep_locked(&mut entries, now)
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        if !entries.is_empty() {
            info!("clearing {} result caches", entries.len());
        }
        entries.clear();
    }

    fn sweep_locked(&self, entries: &mut HashMap<String, CacheRecord>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        entries.retain(|_, record| !self.is_expired(record, now));
        before - entries.len()
    }

    fn is_expired(&self, record: &CacheRecord, now: DateTime<Utc>) -> bool {
        now - record.created_at > self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn oldest_id(entries: &HashMap<String, CacheRecord>) -> Option<String> {
    entries
        .iter()
        .min_by_key(|(_, record)| record.created_at)
        .map(|(id, _)| id.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::{clock::ManualClock, planner::Row};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn cache(clock: &Arc<ManualClock>, config: CacheConfig) -> ResultCache {
        ResultCache::new(config, clock.clone()).unwrap()
    }

    fn entries(count: usize) -> Vec<LogEntry> {
        (0..count)
            .map(|i| {
                let row: Row = json!({"dt": "2024-06-01 11:00:00", "raw": format!("line-{i}")})
                    .as_object()
                    .cloned()
                    .unwrap();
                LogEntry::from_row(row, Some("api"))
            })
            .collect()
    }

    fn metadata() -> QueryMetadata {
        QueryMetadata {
            sources_queried: "api".into(),
            executed_sql: "SELECT dt, raw FROM logs ORDER BY dt DESC LIMIT 3".into(),
            request_url: "https://connect.example.com/".into(),
            api_used: "direct".into(),
            total_rows: 3,
        }
    }

    fn key(sources: &[String], limit: u32) -> CacheKeyOptions<'_> {
        CacheKeyOptions {
            sources,
            limit,
            data_type: DataType::Union,
        }
    }

    #[test]
    fn cache_ids_are_deterministic_and_fixed_length() {
        let sources = vec!["api".to_string()];
        let id = generate_cache_id("SELECT 1", &key(&sources, 100));
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, generate_cache_id("SELECT 1", &key(&sources, 100)));
        assert_ne!(id, generate_cache_id("SELECT 2", &key(&sources, 100)));
        assert_ne!(id, generate_cache_id("SELECT 1", &key(&sources, 50)));
        let other = vec!["worker".to_string()];
        assert_ne!(id, generate_cache_id("SELECT 1", &key(&other, 100)));
    }

    #[test]
    fn lookups_return_rows_and_report_bad_indices() {
        let clock = clock();
        let cache = cache(&clock, CacheConfig::default());
        cache.cache_log_results("abc", entries(3), metadata());

        for index in 0..3 {
            let details = cache.get_cached_log_details("abc", index).unwrap();
            assert_eq!(details.log.raw(), Some(format!("line-{index}").as_str()));
            assert_eq!(details.metadata, metadata());
        }
        let err = cache.get_cached_log_details("abc", 3).unwrap_err();
        assert_eq!(err.to_string(), "Invalid log index: 3. Valid range: 0-2");
        let err = cache.get_cached_log_details("abc", -1).unwrap_err();
        assert_eq!(err, CacheLookupError::InvalidIndex { index: -1, len: 3 });
        assert_eq!(
            cache.get_cached_log_details("nope", 0).unwrap_err().to_string(),
            "Cache ID not found or expired"
        );
    }

    #[test]
    fn empty_results_are_cached() {
        let clock = clock();
        let cache = cache(&clock, CacheConfig::default());
        cache.cache_log_results("empty", Vec::new(), metadata());
        assert_eq!(
            cache.get_cached_log_details("empty", 0).unwrap_err().to_string(),
            "Invalid log index: 0. Valid range: 0--1"
        );
        assert_eq!(cache.get_log_cache_stats().total_caches, 1);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = clock();
        let cache = cache(&clock, CacheConfig::default());
        cache.cache_log_results("abc", entries(1), metadata());
        clock.advance(Duration::minutes(30));
        assert!(cache.get_cached_log_details("abc", 0).is_ok());
        clock.advance(Duration::seconds(1));
        assert_eq!(
            cache.get_cached_log_details("abc", 0),
            Err(CacheLookupError::NotFound)
        );
        assert_eq!(cache.get_log_cache_stats().total_caches, 0);
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[test]
    fn overwrite_replaces_rows_and_timestamp() {
        let clock = clock();
        let cache = cache(&clock, CacheConfig::default());
        cache.cache_log_results("abc", entries(1), metadata());
        clock.advance(Duration::minutes(20));
        cache.cache_log_results("abc", entries(2), metadata());
        clock.advance(Duration::minutes(20));
        assert!(cache.get_cached_log_details("abc", 1).is_ok());
    }

    #[test]
    fn stats_cover_live_entries() {
        let clock = clock();
        let cache = cache(&clock, CacheConfig::default());
        assert_eq!(
            cache.get_log_cache_stats(),
            CacheStats {
                total_caches: 0,
                total_logs: 0,
                oldest_cache_age: None
            }
        );
        cache.cache_log_results("a", entries(2), metadata());
        clock.advance(Duration::seconds(5));
        cache.cache_log_results("b", entries(3), metadata());
        clock.advance(Duration::seconds(1));
        let stats = cache.get_log_cache_stats();
        assert_eq!(stats.total_caches, 2);
        assert_eq!(stats.total_logs, 5);
        assert_eq!(stats.oldest_cache_age, Some(6_000));
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({"totalCaches": 2, "totalLogs": 5, "oldestCacheAge": 6000})
        );
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let clock = clock();
        let cache = cache(&clock, CacheConfig {
            ttl_secs: 1800,
            max_entries: 2,
        });
        cache.cache_log_results("first", entries(1), metadata());
        clock.advance(Duration::seconds(1));
        cache.cache_log_results("second", entries(1), metadata());
        clock.advance(Duration::seconds(1));
        cache.cache_log_results("third", entries(1), metadata());
        assert_eq!(
            cache.get_cached_log_details("first", 0),
            Err(CacheLookupError::NotFound)
        );
        assert!(cache.get_cached_log_details("second", 0).is_ok());
        assert!(cache.get_cached_log_details("third", 0).is_ok());
    }

    #[test]
    fn clear_drops_everything() {
        let clock = clock();
        let cache = cache(&clock, CacheConfig::default());
        cache.cache_log_results("a", entries(1), metadata());
        cache.clear();
        assert_eq!(cache.get_log_cache_stats().total_caches, 0);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_interfere() {
        let clock = clock();
        let cache = Arc::new(cache(&clock, CacheConfig::default()));
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let id = format!("id-{i}");
                    cache.cache_log_results(&id, entries(i + 1), metadata());
                    cache.get_cached_log_details(&id, i as i64).is_ok()
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(cache.get_log_cache_stats().total_logs, (1..=8).sum::<usize>());
    }

    #[test]
    fn invalid_settings_are_rejected_up_front() {
        let clock = clock();
        let result = ResultCache::new(
            CacheConfig {
                ttl_secs: i64::MAX,
                max_entries: 10,
            },
            clock.clone(),
        );
        assert!(matches!(result, Err(QueryError::Config(_))));
        let result = ResultCache::new(
            CacheConfig {
                ttl_secs: 60,
                max_entries: 0,
            },
            clock,
        );
        assert!(matches!(result, Err(QueryError::Config(_))));
    }
}
