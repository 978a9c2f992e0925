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

use thiserror::Error;

use crate::planner::ExecutorError;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    SourceNotFound(String),
    #[error(transparent)]
    Execution(#[from] ExecutorError),
    #[error("{0}")]
    Config(String),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Tag logged alongside the message when the binary fails.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::SourceNotFound(_) => "source_not_found",
            Self::Execution(_) => "execution_error",
            Self::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_passes_upstream_text_through() {
        let err = QueryError::from(ExecutorError::http(502, "upstream exploded: Code: 60"));
        assert_eq!(err.to_string(), "upstream exploded: Code: 60");
        assert_eq!(err.kind(), "execution_error");
    }

    #[test]
    fn validation_keeps_message() {
        let err = QueryError::validation("Invalid limit: 0. Must be between 1 and 1000");
        assert_eq!(err.to_string(), "Invalid limit: 0. Must be between 1 and 1000");
    }
}
