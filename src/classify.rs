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

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::{
    filters::{CustomRange, DataType, Filters, TimeWindow},
    query::time::parse_timestamp,
};

pub const DEFAULT_HISTORICAL_CUTOFF_HOURS: i64 = 24;

#[derive(Clone, Copy, Debug)]
pub struct TimeWindowClassifier {
    cutoff: Duration,
}

impl Default for TimeWindowClassifier {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_HISTORICAL_CUTOFF_HOURS))
    }
}

impl TimeWindowClassifier {
    /// Windows ending strictly more than `cutoff` before now are historical.
    pub fn new(cutoff: Duration) -> Self {
        Self { cutoff }
    }

    pub fn classify(&self, filters: Option<&Filters>, now: DateTime<Utc>) -> DataType {
        let Some(time_filter) = filters.and_then(|filters| filters.time_filter.as_ref()) else {
            return DataType::Union;
        };
        let data_type = match time_filter.window() {
            TimeWindow::Unbounded | TimeWindow::Relative(_) => DataType::Union,
            TimeWindow::Custom(range) => self.classify_custom(range, now),
        };
        debug!("time filter classified as {data_type}");
        data_type
    }

    fn classify_custom(&self, range: &CustomRange, now: DateTime<Utc>) -> DataType {
        let start = range.start_datetime.as_deref().map(parse_timestamp);
        let end = range.end_datetime.as_deref().map(parse_timestamp);
        match (start, end) {
            (Some(None), _) | (_, Some(None)) => DataType::Union,
            (_, None) => DataType::Union,
            (_, Some(Some(end))) => match now.checked_sub_signed(self.cutoff) {
                Some(cutoff) if end < cutoff => DataType::Historical,
                _ => DataType::Union,
            },
        }
    }
}
