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

mod directory;
mod executor;
mod merge;

use std::{fmt::Display, sync::Arc};

use futures_util::future::try_join_all;
use log::{debug, info};
use serde::Serialize;
use url::Url;

pub use directory::{
    CatalogSource, Directory, PhysicalSource, SourceCatalog, SourceLocation, SourceSelection,
    StaticDirectory, resolve_selection,
};
pub use executor::{
    ExecutionRequest, ExecutorError, HistoricalTarget, QueryExecutor, QueryOutput, QueryStats, Row,
};
pub use merge::{LogEntry, merge_by_dt, rows_to_entries};

use crate::{
    config::PlannerConfig,
    error::QueryError,
    filters::{DataType, Filters, TimeWindow},
    query::{LogQuery, time::parse_timestamp},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ApiUsed {
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "historical-optimized")]
    HistoricalOptimized,
    #[serde(rename = "multi-source-optimized")]
    MultiSourceOptimized,
}

impl ApiUsed {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiUsed::Direct => "direct",
            ApiUsed::HistoricalOptimized => "historical-optimized",
            ApiUsed::MultiSourceOptimized => "multi-source-optimized",
        }
    }
}

impl Display for ApiUsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PhysicalQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<HistoricalTarget>,
}

impl PhysicalQuery {
    pub fn request(&self) -> ExecutionRequest {
        ExecutionRequest {
            sql: self.sql.clone(),
            target: self.target.clone(),
        }
    }

    pub fn request_url(&self, base: &Url) -> Url {
        match &self.target {
            Some(target) => target.request_url(base),
            None => base.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub data_type: DataType,
    pub api_used: ApiUsed,
    pub logical_sql: String,
    pub sources: Vec<String>,
    pub queries: Vec<PhysicalQuery>,
    pub limit: u32,
}

impl QueryPlan {
    /// Fan-out plans show the logical query; everything else shows the
    /// statement that is actually sent.
    pub fn displayed_sql(&self) -> &str {
        match (self.api_used, self.queries.as_slice()) {
            (ApiUsed::MultiSourceOptimized, _) | (_, []) => &self.logical_sql,
            (_, [first, ..]) => &first.sql,
        }
    }

    pub fn sources_queried(&self) -> String {
        self.sources.join(", ")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, serde::Deserialize)]
pub struct QueryMetadata {
    pub sources_queried: String,
    pub executed_sql: String,
    pub request_url: String,
    pub api_used: String,
    pub total_rows: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub entries: Vec<LogEntry>,
    pub metadata: QueryMetadata,
    pub stats: QueryStats,
}

#[derive(Clone)]
pub struct MultiSourceQueryPlanner {
    directory: Arc<dyn Directory>,
    config: PlannerConfig,
}

impl MultiSourceQueryPlanner {
    pub fn new(directory: Arc<dyn Directory>, config: PlannerConfig) -> Self {
        Self { directory, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub async fn resolve(
        &self,
        selection: &SourceSelection,
    ) -> Result<Vec<PhysicalSource>, QueryError> {
        resolve_selection(self.directory.as_ref(), selection).await
    }

    pub fn plan(
        &self,
        query: &LogQuery,
        filters: Option<&Filters>,
        sources: &[PhysicalSource],
    ) -> Result<QueryPlan, QueryError> {
        let data_type = query.data_type();
        let (api_used, queries) = match (sources, data_type) {
            ([], _) => {
                return Err(QueryError::validation("At least one source must be selected"));
            }
            ([source], DataType::Historical) => {
                let target = historical_target(source, filters);
                let api_used = if target.is_some() {
                    ApiUsed::HistoricalOptimized
                } else {
                    ApiUsed::Direct
                };
                let sql = query.render(&format!("({})", self.historical_scan(query, source)));
                (api_used, vec![PhysicalQuery {
                    source: Some(source.logical_name.clone()),
                    sql,
                    target,
                }])
            }
            (many, DataType::Historical) => {
                let queries = many
                    .iter()
                    .map(|source| PhysicalQuery {
                        source: Some(source.logical_name.clone()),
                        sql: query.render(&format!("({})", self.historical_scan(query, source))),
                        target: historical_target(source, filters),
                    })
                    .collect();
                (ApiUsed::MultiSourceOptimized, queries)
            }
            ([source], DataType::Recent) => (ApiUsed::Direct, vec![PhysicalQuery {
                source: Some(source.logical_name.clone()),
                sql: query.render(&format!("({})", live_scan(query, source))),
                target: None,
            }]),
            (many, DataType::Recent) => {
                let scans = many
                    .iter()
                    .map(|source| live_scan(query, source))
                    .collect::<Vec<_>>()
                    .join(" UNION ALL ");
                (ApiUsed::Direct, vec![PhysicalQuery {
                    source: None,
                    sql: query.render(&format!("({scans})")),
                    target: None,
                }])
            }
            ([source], DataType::Union) => (ApiUsed::Direct, vec![PhysicalQuery {
                source: Some(source.logical_name.clone()),
                sql: query.render(&format!("({})", self.union_scan(query, source))),
                target: None,
            }]),
            (many, DataType::Union) => {
                let scans = many
                    .iter()
                    .map(|source| format!("({})", self.union_scan(query, source)))
                    .collect::<Vec<_>>()
                    .join(" UNION ALL ");
                (ApiUsed::Direct, vec![PhysicalQuery {
                    source: None,
                    sql: query.render(&format!("({scans})")),
                    target: None,
                }])
            }
        };

        let plan = QueryPlan {
            data_type,
            api_used,
            logical_sql: query.logical_sql(),
            sources: sources.iter().map(|s| s.logical_name.clone()).collect(),
            queries,
            limit: query.limit(),
        };
        info!(
            "planned {} query over [{}] using {}",
            plan.data_type,
            plan.sources_queried(),
            plan.api_used
        );
        for physical in &plan.queries {
            debug!("physical SQL: {}", physical.sql);
        }
        Ok(plan)
    }

    /// Runs every physical query. Fan-out plans run concurrently and fail as
    /// a whole when any source fails.
    pub async fn execute(
        &self,
        executor: &dyn QueryExecutor,
        plan: &QueryPlan,
    ) -> Result<QueryResult, QueryError> {
        let base = &self.config.base_url;
        let (entries, stats, request_url) = match plan.api_used {
            ApiUsed::MultiSourceOptimized => {
                info!("fanning out to {} sources", plan.queries.len());
                let outputs = try_join_all(plan.queries.iter().map(|physical| async move {
                    let output = executor.execute(&physical.request()).await?;
                    Ok::<_, ExecutorError>((physical, output))
                }))
                .await?;
                let mut stats = QueryStats::default();
                let batches = outputs
                    .into_iter()
                    .map(|(physical, output)| {
                        stats += output.stats;
                        rows_to_entries(output.rows, physical.source.as_deref())
                    })
                    .collect();
                let entries = merge_by_dt(batches, plan.limit as usize);
                (entries, stats, base.to_string())
            }
            ApiUsed::Direct | ApiUsed::HistoricalOptimized => {
                let physical = plan.queries.first().ok_or_else(|| {
                    QueryError::validation("At least one source must be selected")
                })?;
                let output = executor.execute(&physical.request()).await?;
                let entries = rows_to_entries(output.rows, physical.source.as_deref());
                (entries, output.stats, physical.request_url(base).to_string())
            }
        };
        debug!(
            "query over [{}] returned {} rows (rows_read={}, bytes_read={})",
            plan.sources_queried(),
            entries.len(),
            stats.rows_read,
            stats.bytes_read
        );
        let metadata = QueryMetadata {
            sources_queried: plan.sources_queried(),
            executed_sql: plan.displayed_sql().to_string(),
            request_url,
            api_used: plan.api_used.as_str().to_string(),
            total_rows: entries.len(),
        };
        Ok(QueryResult {
            entries,
            metadata,
            stats,
        })
    }

    fn historical_scan(&self, query: &LogQuery, source: &PhysicalSource) -> String {
        format!(
            "SELECT {}, {} FROM {} WHERE _row_type = 1",
            query.scan_columns().join(", "),
            source.label(),
            source.historical_table(&self.config.cluster)
        )
    }

    fn union_scan(&self, query: &LogQuery, source: &PhysicalSource) -> String {
        format!(
            "{} UNION DISTINCT ({})",
            live_scan(query, source),
            self.historical_scan(query, source)
        )
    }
}

fn live_scan(query: &LogQuery, source: &PhysicalSource) -> String {
    format!(
        "SELECT {}, {} FROM {}",
        query.scan_columns().join(", "),
        source.label(),
        source.live_table()
    )
}

/// Pruning hints need a parseable end bound; a missing start prunes from
/// the epoch.
fn historical_target(source: &PhysicalSource, filters: Option<&Filters>) -> Option<HistoricalTarget> {
    let time_filter = filters?.time_filter.as_ref()?;
    let TimeWindow::Custom(range) = time_filter.window() else {
        return None;
    };
    let end = parse_timestamp(range.end_datetime.as_deref()?)?;
    let start = match range.start_datetime.as_deref() {
        Some(text) => parse_timestamp(text)?.timestamp_millis(),
        None => 0,
    };
    Some(HistoricalTarget {
        table: source.qualified_table(),
        range_from_ms: start,
        range_to_ms: end.timestamp_millis(),
    })
}
