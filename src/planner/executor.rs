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

use std::ops::AddAssign;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// One `JSONEachRow` object.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoricalTarget {
    pub table: String,
    pub range_from_ms: i64,
    pub range_to_ms: i64,
}

impl HistoricalTarget {
    /// `<base>/?table=<team>.<table>&range-from=<ms>&range-to=<ms>`
    pub fn request_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("table", &self.table)
            .append_pair("range-from", &self.range_from_ms.to_string())
            .append_pair("range-to", &self.range_to_ms.to_string());
        url
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub sql: String,
    pub target: Option<HistoricalTarget>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    pub rows_read: u64,
    pub bytes_read: u64,
}

impl AddAssign for QueryStats {
    fn add_assign(&mut self, rhs: Self) {
        self.rows_read = self.rows_read.saturating_add(rhs.rows_read);
        self.bytes_read = self.bytes_read.saturating_add(rhs.bytes_read);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub stats: QueryStats,
}

/// Failure reported by the transport. The message is shown as-is.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutorError {
    pub status: Option<u16>,
    pub message: String,
}

impl ExecutorError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<QueryOutput, ExecutorError>;
}
