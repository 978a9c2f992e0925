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

pub mod level;
pub mod time;

use crate::{
    error::QueryError,
    filters::{
        DataType, Filters, LogLevel, OutputFormat, StructuredQueryParams, TimeWindow,
    },
    sql::{json_extract, quote_literal, sanitize_sql_string},
    validate::{validate_filters, validate_query_params},
};

use self::time::{Boundary, custom_bound_clause};

pub use self::{
    level::extract_log_level,
    time::{parse_relative_time, parse_time_value},
};

const LOG_SEARCH_FIELDS: &[&str] = &["dt", "raw"];

/// How level and substring filters are written. Both forms have consumers
/// that compare the generated text verbatim, so they are kept apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterBinding {
    /// `ilike(raw, '%"level":"warn"%')`; substring terms always grouped.
    LogSearch,
    /// `getJSON(raw, 'level') = 'WARN'`; substring terms grouped only when
    /// there is more than one.
    Structured,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogQuery {
    select: Vec<String>,
    conditions: Vec<String>,
    limit: u32,
    format: Option<OutputFormat>,
    data_type: DataType,
    scan_columns: Vec<&'static str>,
}

impl LogQuery {
    pub fn render(&self, from: &str) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.select.join(", "), from);
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY dt DESC LIMIT {}", self.limit));
        if let Some(format) = self.format {
            sql.push_str(&format!(
                " SETTINGS output_format_json_array_of_rows = 1 FORMAT {}",
                format.as_str()
            ));
        }
        sql
    }

    /// The query as shown to callers, against the placeholder table.
    pub fn logical_sql(&self) -> String {
        self.render(self.data_type.logical_table())
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn scan_columns(&self) -> &[&'static str] {
        &self.scan_columns
    }
}

pub fn build_structured_query(params: &StructuredQueryParams) -> Result<String, QueryError> {
    structured_query(params).map(|query| query.logical_sql())
}

pub fn structured_query(params: &StructuredQueryParams) -> Result<LogQuery, QueryError> {
    validate_query_params(params)?;
    let mut select = params.fields.clone();
    select.extend(params.json_fields.iter().map(|field| {
        format!("{} as {}", json_extract(&field.path), field.alias())
    }));
    let conditions = match &params.filters {
        Some(filters) => where_clauses(filters, FilterBinding::Structured)?,
        None => Vec::new(),
    };
    Ok(LogQuery {
        select,
        conditions,
        limit: params.limit as u32,
        format: params.format,
        data_type: params.data_type,
        scan_columns: scan_columns(&params.fields),
    })
}

/// The `dt, raw` query used for free-form log search, always emitted as
/// `JSONEachRow`.
pub fn log_search_query(
    filters: Option<&Filters>,
    data_type: DataType,
    limit: u32,
) -> Result<LogQuery, QueryError> {
    let conditions = match filters {
        Some(filters) => {
            validate_filters(filters)?;
            where_clauses(filters, FilterBinding::LogSearch)?
        }
        None => Vec::new(),
    };
    let fields: Vec<String> = LOG_SEARCH_FIELDS.iter().map(|f| f.to_string()).collect();
    Ok(LogQuery {
        scan_columns: scan_columns(&fields),
        select: fields,
        conditions,
        limit,
        format: Some(OutputFormat::JsonEachRow),
        data_type,
    })
}

fn scan_columns(fields: &[String]) -> Vec<&'static str> {
    let mut columns = vec!["dt", "raw"];
    if fields.iter().any(|field| field == "json") {
        columns.push("json");
    }
    columns
}

/// Conditions in their fixed order: substring terms, level, time, JSON field.
pub fn where_clauses(filters: &Filters, binding: FilterBinding) -> Result<Vec<String>, QueryError> {
    let mut clauses = Vec::new();
    if let Some(group) = contains_clause(&filters.raw_contains, binding) {
        clauses.push(group);
    }
    if let Some(level) = &filters.level {
        clauses.push(level_clause(LogLevel::parse(level)?, binding));
    }
    if let Some(time_filter) = &filters.time_filter {
        match time_filter.window() {
            TimeWindow::Unbounded => {}
            TimeWindow::Relative(window) => {
                if let Some(interval) = window.interval() {
                    clauses.push(format!("dt >= {}", interval.sql()));
                }
            }
            TimeWindow::Custom(range) => {
                if let Some(start) = &range.start_datetime {
                    clauses.push(custom_bound_clause(start, Boundary::Start)?);
                }
                if let Some(end) = &range.end_datetime {
                    clauses.push(custom_bound_clause(end, Boundary::End)?);
                }
            }
        }
    }
    if let Some(json_field) = &filters.json_field {
        clauses.push(format!(
            "{} = {}",
            json_extract(&json_field.path),
            quote_literal(&json_field.value)
        ));
    }
    Ok(clauses)
}

fn contains_clause(terms: &[String], binding: FilterBinding) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    let joined = terms
        .iter()
        .map(|term| format!("ilike(raw, '%{}%')", sanitize_sql_string(term)))
        .collect::<Vec<_>>()
        .join(" OR ");
    let grouped = binding == FilterBinding::LogSearch || terms.len() > 1;
    Some(if grouped { format!("({joined})") } else { joined })
}

fn level_clause(level: LogLevel, binding: FilterBinding) -> String {
    match binding {
        FilterBinding::LogSearch => {
            format!("ilike(raw, '%\"level\":\"{}\"%')", level.as_lower())
        }
        FilterBinding::Structured => {
            format!("{} = {}", json_extract("level"), quote_literal(level.as_upper()))
        }
    }
}
