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

use crate::{
    error::QueryError,
    filters::{Filters, JsonFieldSelection, KNOWN_FIELDS, StructuredQueryParams},
    sql::{is_identifier, is_json_path, validate_json_field_filter},
};

pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 1_000;

/// Checks everything that can be checked before rendering. Log levels are
/// left to the builder.
pub fn validate_query_params(params: &StructuredQueryParams) -> Result<(), QueryError> {
    validate_fields(&params.fields)?;
    validate_limit(params.limit)?;
    params
        .json_fields
        .iter()
        .try_for_each(validate_json_selection)?;
    if let Some(filters) = &params.filters {
        validate_filters(filters)?;
    }
    Ok(())
}

pub fn validate_fields(fields: &[String]) -> Result<(), QueryError> {
    if fields.is_empty() {
        return Err(QueryError::validation("At least one field must be requested"));
    }
    let unknown: Vec<&str> = fields
        .iter()
        .map(String::as_str)
        .filter(|field| !KNOWN_FIELDS.contains(field))
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(QueryError::validation(format!(
            "Invalid fields: {}",
            unknown.join(", ")
        )))
    }
}

pub fn validate_limit(limit: i64) -> Result<u32, QueryError> {
    if (MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        Ok(limit as u32)
    } else {
        Err(QueryError::validation(format!(
            "Invalid limit: {limit}. Must be between {MIN_LIMIT} and {MAX_LIMIT}"
        )))
    }
}

pub fn validate_filters(filters: &Filters) -> Result<(), QueryError> {
    if let Some(json_field) = &filters.json_field {
        validate_json_field_filter(json_field)?;
    }
    Ok(())
}

fn validate_json_selection(selection: &JsonFieldSelection) -> Result<(), QueryError> {
    if !is_json_path(&selection.path) {
        return Err(QueryError::validation("Invalid JSON path format"));
    }
    let alias = selection.alias();
    if is_identifier(&alias) {
        Ok(())
    } else {
        Err(QueryError::validation(format!(
            "Invalid JSON field alias: {alias}"
        )))
    }
}
