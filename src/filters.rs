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

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    error::QueryError,
    query::time::{RelativeInterval, parse_relative_time},
};

pub const KNOWN_FIELDS: &[&str] = &["dt", "raw", "json", "source"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Recent,
    Historical,
    Union,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Recent => "recent",
            DataType::Historical => "historical",
            DataType::Union => "union",
        }
    }

    /// Table name the builder emits before the planner binds real sources.
    pub fn logical_table(self) -> &'static str {
        match self {
            DataType::Union => "union_subquery",
            DataType::Recent | DataType::Historical => "logs",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "JSONEachRow")]
    JsonEachRow,
    #[serde(rename = "JSONCompactEachRow")]
    JsonCompactEachRow,
    #[serde(rename = "TabSeparated")]
    TabSeparated,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::JsonEachRow => "JSONEachRow",
            OutputFormat::JsonCompactEachRow => "JSONCompactEachRow",
            OutputFormat::TabSeparated => "TabSeparated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RelativeWindow {
    Everything,
    Last {
        name: String,
        interval: RelativeInterval,
    },
}

impl RelativeWindow {
    pub fn parse(name: &str) -> Result<Self, QueryError> {
        if name == "everything" {
            return Ok(RelativeWindow::Everything);
        }
        name.strip_prefix("last_")
            .and_then(|rest| parse_relative_time(&rest.replace('_', " ")))
            .map(|interval| RelativeWindow::Last {
                name: name.to_string(),
                interval,
            })
            .ok_or_else(|| QueryError::validation(format!("Invalid relative time filter: {name}")))
    }

    pub fn name(&self) -> &str {
        match self {
            RelativeWindow::Everything => "everything",
            RelativeWindow::Last { name, .. } => name,
        }
    }

    pub fn interval(&self) -> Option<RelativeInterval> {
        match self {
            RelativeWindow::Everything => None,
            RelativeWindow::Last { interval, .. } => Some(*interval),
        }
    }
}

impl TryFrom<String> for RelativeWindow {
    type Error = QueryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RelativeWindow::parse(&value)
    }
}

impl From<RelativeWindow> for String {
    fn from(value: RelativeWindow) -> Self {
        value.name().to_string()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<RelativeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomRange>,
}

/// The effective shape of a [`TimeFilter`]; `custom` wins when both are set.
#[derive(Clone, Copy, Debug)]
pub enum TimeWindow<'a> {
    Unbounded,
    Relative(&'a RelativeWindow),
    Custom(&'a CustomRange),
}

impl TimeFilter {
    pub fn relative(window: RelativeWindow) -> Self {
        Self {
            relative: Some(window),
            custom: None,
        }
    }

    pub fn custom(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            relative: None,
            custom: Some(CustomRange {
                start_datetime: start.map(str::to_string),
                end_datetime: end.map(str::to_string),
            }),
        }
    }

    pub fn window(&self) -> TimeWindow<'_> {
        match (&self.custom, &self.relative) {
            (Some(custom), _) => TimeWindow::Custom(custom),
            (None, Some(relative)) => TimeWindow::Relative(relative),
            (None, None) => TimeWindow::Unbounded,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFieldFilter {
    pub path: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_filter: Option<TimeFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_contains: Vec<String>,
    /// Kept as text; checked against [`LogLevel`] when the query is built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_field: Option<JsonFieldFilter>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn parse(value: &str) -> Result<Self, QueryError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(QueryError::validation(format!("Invalid log level: {value}"))),
        }
    }

    pub fn as_upper(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    pub fn as_lower(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFieldSelection {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl JsonFieldSelection {
    pub fn alias(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.path.replace('.', "_"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQueryParams {
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_fields: Vec<JsonFieldSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    pub limit: i64,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::time::IntervalUnit;

    #[test]
    fn named_windows_resolve_to_intervals() {
        let window = RelativeWindow::parse("last_3_hours").unwrap();
        assert_eq!(
            window.interval(),
            Some(RelativeInterval {
                amount: 3,
                unit: IntervalUnit::Hour
            })
        );
        let window = RelativeWindow::parse("last_30_minutes").unwrap();
        assert_eq!(window.interval().unwrap().unit, IntervalUnit::Minute);
        let window = RelativeWindow::parse("last_7_days").unwrap();
        assert_eq!(window.interval().unwrap().amount, 7);
        assert_eq!(RelativeWindow::parse("everything").unwrap().interval(), None);
    }

    #[test]
    fn unknown_window_is_rejected() {
        for name in ["yesterday", "last_3_fortnights", "last__hours", "3_hours"] {
            let err = RelativeWindow::parse(name).unwrap_err();
            assert_eq!(err.to_string(), format!("Invalid relative time filter: {name}"));
        }
    }

    #[test]
    fn custom_range_wins_over_relative() {
        let filter = TimeFilter {
            relative: Some(RelativeWindow::Everything),
            custom: Some(CustomRange::default()),
        };
        assert!(matches!(filter.window(), TimeWindow::Custom(_)));
        assert!(matches!(TimeFilter::default().window(), TimeWindow::Unbounded));
    }

    #[test]
    fn filters_deserialize_from_json() {
        let filters: Filters = serde_json::from_str(
            r#"{"time_filter":{"relative":"last_24_hours"},"raw_contains":["timeout"],"level":"warn"}"#,
        )
        .unwrap();
        let window = filters.time_filter.unwrap();
        assert_eq!(window.relative.unwrap().name(), "last_24_hours");
        assert_eq!(filters.raw_contains, vec!["timeout".to_string()]);
        assert_eq!(filters.level.as_deref(), Some("warn"));
    }

    #[test]
    fn structured_params_use_camel_case() {
        let params: StructuredQueryParams = serde_json::from_str(
            r#"{"fields":["dt"],"jsonFields":[{"path":"user.id"}],"limit":5,"dataType":"historical","format":"JSONEachRow"}"#,
        )
        .unwrap();
        assert_eq!(params.data_type, DataType::Historical);
        assert_eq!(params.json_fields[0].alias(), "user_id");
        assert_eq!(params.format, Some(OutputFormat::JsonEachRow));
    }

    #[test]
    fn log_level_is_case_insensitive() {
        assert_eq!(LogLevel::parse("warn").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::parse("ERROR").unwrap().as_lower(), "error");
        let err = LogLevel::parse("LOUD").unwrap_err();
        assert_eq!(err.to_string(), "Invalid log level: LOUD");
    }
}
