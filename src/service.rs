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

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{
        CacheKeyOptions, CacheLookupError, CacheStats, CachedLogDetails, ResultCache,
        generate_cache_id,
    },
    classify::TimeWindowClassifier,
    clock::SharedClock,
    error::QueryError,
    filters::{DataType, Filters, StructuredQueryParams},
    planner::{
        LogEntry, MultiSourceQueryPlanner, QueryExecutor, QueryMetadata, QueryPlan, QueryResult,
        QueryStats, SourceSelection,
    },
    query::{log_search_query, structured_query},
    validate::validate_limit,
};

#[derive(Clone, Debug, Deserialize)]
pub struct LogSearchRequest {
    #[serde(default)]
    pub filters: Option<Filters>,
    pub selection: SourceSelection,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogSearchOutcome {
    pub cache_id: String,
    pub data_type: DataType,
    pub entries: Vec<LogEntry>,
    pub metadata: QueryMetadata,
    pub stats: QueryStats,
}

/// Classify, build, plan, execute and cache, in that order.
#[derive(Clone)]
pub struct QueryService {
    planner: MultiSourceQueryPlanner,
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<ResultCache>,
    classifier: TimeWindowClassifier,
    clock: SharedClock,
}

impl QueryService {
    pub fn new(
        planner: MultiSourceQueryPlanner,
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<ResultCache>,
        clock: SharedClock,
    ) -> Result<Self, QueryError> {
        let classifier = TimeWindowClassifier::new(planner.config().historical_cutoff()?);
        Ok(Self {
            planner,
            executor,
            cache,
            classifier,
            clock,
        })
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn explain(&self, request: &LogSearchRequest) -> Result<QueryPlan, QueryError> {
        plan_search(&self.planner, &self.classifier, self.clock.now(), request).await
    }

    pub async fn query_logs(&self, request: &LogSearchRequest) -> Result<LogSearchOutcome, QueryError> {
        let plan = self.explain(request).await?;
        let result = self.planner.execute(self.executor.as_ref(), &plan).await?;
        let cache_id = generate_cache_id(&plan.logical_sql, &CacheKeyOptions {
            sources: &plan.sources,
            limit: plan.limit,
            data_type: plan.data_type,
        });
        self.cache
            .cache_log_results(&cache_id, result.entries.clone(), result.metadata.clone());
        info!(
            "log search over [{}] returned {} rows, cached as {cache_id}",
            result.metadata.sources_queried, result.metadata.total_rows
        );
        Ok(LogSearchOutcome {
            cache_id,
            data_type: plan.data_type,
            entries: result.entries,
            metadata: result.metadata,
            stats: result.stats,
        })
    }

    pub async fn run_structured(
        &self,
        params: &StructuredQueryParams,
        selection: &SourceSelection,
    ) -> Result<QueryResult, QueryError> {
        let query = structured_query(params)?;
        let sources = self.planner.resolve(selection).await?;
        let plan = self.planner.plan(&query, params.filters.as_ref(), &sources)?;
        self.planner.execute(self.executor.as_ref(), &plan).await
    }

    pub fn log_details(&self, cache_id: &str, index: i64) -> Result<CachedLogDetails, CacheLookupError> {
        self.cache.get_cached_log_details(cache_id, index)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.get_log_cache_stats()
    }

    pub fn shutdown(&self) {
        self.cache.clear();
    }
}

/// Validates, classifies, renders and plans a log search. Nothing is executed.
pub async fn plan_search(
    planner: &MultiSourceQueryPlanner,
    classifier: &TimeWindowClassifier,
    now: DateTime<Utc>,
    request: &LogSearchRequest,
) -> Result<QueryPlan, QueryError> {
    let limit = validate_limit(
        request
            .limit
            .unwrap_or_else(|| i64::from(planner.config().default_limit)),
    )?;
    let filters = request.filters.as_ref();
    let data_type = classifier.classify(filters, now);
    let query = log_search_query(filters, data_type, limit)?;
    let sources = planner.resolve(&request.selection).await?;
    planner.plan(&query, filters, &sources)
}
