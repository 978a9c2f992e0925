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

use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use clap::Parser;
use log::{LevelFilter, error, info};
use log_query_planner::{
    classify::TimeWindowClassifier,
    config::{DEFAULT_CLUSTER, PlannerConfig},
    error::QueryError,
    filters::{DataType, Filters},
    planner::{ApiUsed, MultiSourceQueryPlanner, QueryPlan, SourceSelection, StaticDirectory},
    service::{LogSearchRequest, plan_search},
};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(author, version, about, disable_help_subcommand = true)]
struct Args {
    /// Base URL of the SQL endpoint, e.g. https://eu-nbg-2-connect.example.com
    #[arg(long = "base-url", env = "LOG_QUERY_BASE_URL")]
    base_url: String,
    /// JSON source catalogue with `sources` and `groups`
    #[arg(long, env = "LOG_SOURCE_CATALOG")]
    catalog: PathBuf,
    /// Filters as JSON, e.g. {"raw_contains":["error"],"level":"WARN"}
    #[arg(long)]
    filters: Option<String>,
    /// Comma separated source names, in merge order
    #[arg(long, value_delimiter = ',', conflicts_with = "group")]
    sources: Vec<String>,
    /// Source group to query instead of explicit sources
    #[arg(long)]
    group: Option<String>,
    /// Maximum number of rows
    #[arg(long)]
    limit: Option<i64>,
    /// Cluster name used for object-storage scans
    #[arg(long, env = "LOG_QUERY_CLUSTER", default_value = DEFAULT_CLUSTER)]
    cluster: String,
    /// Windows ending more than this many hours ago only read object storage
    #[arg(long = "cutoff-hours", env = "HISTORICAL_CUTOFF_HOURS", default_value_t = 24)]
    cutoff_hours: i64,
}

#[derive(Serialize)]
struct Explain<'a> {
    data_type: DataType,
    api_used: ApiUsed,
    sources_queried: String,
    logical_sql: &'a str,
    displayed_sql: &'a str,
    queries: Vec<ExplainedQuery<'a>>,
}

#[derive(Serialize)]
struct ExplainedQuery<'a> {
    source: Option<&'a str>,
    sql: &'a str,
    request_url: String,
}

#[tokio::main]
async fn main() -> Result<(), QueryError> {
    init_logging();
    let args = Args::parse();
    run(args)
        .await
        .inspect_err(|err| error!("explain failed ({}): {err}", err.kind()))
}

async fn run(args: Args) -> Result<(), QueryError> {
    info!(
        "explaining log search (base_url={}, catalog={}, cluster={})",
        args.base_url,
        args.catalog.display(),
        args.cluster
    );

    let mut config = PlannerConfig::new(&args.base_url)?;
    config.cluster = args.cluster.clone();
    config.historical_cutoff_hours = args.cutoff_hours;
    config.validate()?;

    let catalog = tokio::fs::read_to_string(&args.catalog)
        .await
        .map_err(|err| {
            QueryError::Config(format!(
                "failed to read catalog {}: {err}",
                args.catalog.display()
            ))
        })?;
    let directory = StaticDirectory::from_json(&catalog)?;
    let classifier = TimeWindowClassifier::new(config.historical_cutoff()?);
    let planner = MultiSourceQueryPlanner::new(Arc::new(directory), config);

    let request = LogSearchRequest {
        filters: parse_filters(args.filters.as_deref())?,
        selection: match args.group {
            Some(group) => SourceSelection::Group(group),
            None => SourceSelection::Sources(args.sources),
        },
        limit: args.limit,
    };
    let plan = plan_search(&planner, &classifier, Utc::now(), &request).await?;
    let rendered = serde_json::to_string_pretty(&explain(&plan, &planner))
        .map_err(|err| QueryError::Config(format!("failed to render plan: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn parse_filters(raw: Option<&str>) -> Result<Option<Filters>, QueryError> {
    raw.map(|raw| {
        serde_json::from_str(raw)
            .map_err(|err| QueryError::validation(format!("invalid filters: {err}")))
    })
    .transpose()
}

fn explain<'a>(plan: &'a QueryPlan, planner: &MultiSourceQueryPlanner) -> Explain<'a> {
    let base = &planner.config().base_url;
    Explain {
        data_type: plan.data_type,
        api_used: plan.api_used,
        sources_queried: plan.sources_queried(),
        logical_sql: &plan.logical_sql,
        displayed_sql: plan.displayed_sql(),
        queries: plan
            .queries
            .iter()
            .map(|query| ExplainedQuery {
                source: query.source.as_deref(),
                sql: &query.sql,
                request_url: query.request_url(base).to_string(),
            })
            .collect(),
    }
}

fn init_logging() {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::Builder::from_default_env().init();
    } else {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Warn)
            .filter_module("log_query_planner", LevelFilter::Info)
            .init();
    }
}
