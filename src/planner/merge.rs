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

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::{extract_log_level, time::parse_timestamp};

use super::executor::Row;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub row: Row,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl LogEntry {
    /// Builds an entry; `tag` overrides any `source` column in the row.
    pub fn from_row(row: Row, tag: Option<&str>) -> Self {
        let source = tag
            .map(str::to_string)
            .or_else(|| row.get("source").and_then(|v| v.as_str()).map(str::to_string));
        let level = row
            .get("raw")
            .and_then(|v| v.as_str())
            .and_then(extract_log_level);
        Self { row, source, level }
    }

    pub fn dt(&self) -> Option<&str> {
        self.row.get("dt").and_then(|v| v.as_str())
    }

    pub fn raw(&self) -> Option<&str> {
        self.row.get("raw").and_then(|v| v.as_str())
    }

    fn sort_key(&self) -> (Option<DateTime<Utc>>, String) {
        let text = self.dt().unwrap_or_default();
        (parse_timestamp(text), text.to_string())
    }
}

pub fn rows_to_entries(rows: Vec<Row>, tag: Option<&str>) -> Vec<LogEntry> {
    rows.into_iter()
        .map(|row| LogEntry::from_row(row, tag))
        .collect()
}

/// Concatenates per-source batches in caller order, sorts newest first and
/// truncates to `limit`. Ties keep source order.
pub fn merge_by_dt(batches: Vec<Vec<LogEntry>>, limit: usize) -> Vec<LogEntry> {
    let mut merged: Vec<LogEntry> = batches.into_iter().flatten().collect();
    merged.sort_by_cached_key(|entry| Reverse(entry.sort_key()));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(dt: &str, raw: &str) -> Row {
        json!({"dt": dt, "raw": raw}).as_object().cloned().unwrap()
    }

    #[test]
    fn entries_pick_up_level_and_source() {
        let entry = LogEntry::from_row(row("2024-01-01 00:00:00", r#"{"level":"warn"}"#), Some("api"));
        assert_eq!(entry.level.as_deref(), Some("WARN"));
        assert_eq!(entry.source.as_deref(), Some("api"));

        let mut labelled = row("2024-01-01 00:00:00", "plain text");
        labelled.insert("source".into(), json!("worker"));
        let entry = LogEntry::from_row(labelled, None);
        assert_eq!(entry.source.as_deref(), Some("worker"));
        assert_eq!(entry.level, None);
    }

    #[test]
    fn merge_orders_newest_first_and_truncates() {
        let a = rows_to_entries(
            vec![row("2024-01-03 10:00:00", "a1"), row("2024-01-01 10:00:00", "a2")],
            Some("a"),
        );
        let b = rows_to_entries(
            vec![row("2024-01-02 10:00:00.500", "b1"), row("2024-01-01 09:00:00", "b2")],
            Some("b"),
        );
        let merged = merge_by_dt(vec![a, b], 3);
        let raws: Vec<_> = merged.iter().map(|e| e.raw().unwrap()).collect();
        assert_eq!(raws, vec!["a1", "b1", "a2"]);
    }

    #[test]
    fn merge_keeps_source_order_on_ties() {
        let a = rows_to_entries(vec![row("2024-01-01 10:00:00", "from-a")], Some("a"));
        let b = rows_to_entries(vec![row("2024-01-01 10:00:00", "from-b")], Some("b"));
        let merged = merge_by_dt(vec![a, b], 10);
        assert_eq!(merged[0].source.as_deref(), Some("a"));
        assert_eq!(merged[1].source.as_deref(), Some("b"));
    }
}
