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

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, recognize},
    error::Error as NomError,
    multi::separated_list1,
};

use crate::{error::QueryError, filters::JsonFieldFilter};

type NomResult<'a, T> = IResult<&'a str, T, NomError<&'a str>>;

/// Doubles every single quote. The result is only safe inside a
/// single-quoted literal; it must not be used for identifiers and must be
/// applied exactly once.
pub fn sanitize_sql_string(input: &str) -> String {
    input.replace('\'', "''")
}

pub fn quote_literal(input: &str) -> String {
    format!("'{}'", sanitize_sql_string(input))
}

pub fn json_extract(path: &str) -> String {
    format!("getJSON(raw, {})", quote_literal(path))
}

pub fn validate_json_field_filter(filter: &JsonFieldFilter) -> Result<(), QueryError> {
    if is_json_path(&filter.path) {
        Ok(())
    } else {
        Err(QueryError::validation("Invalid JSON path format"))
    }
}

/// `identifier('.'identifier)*` with identifiers made of ASCII letters,
/// digits and underscores.
pub fn is_json_path(input: &str) -> bool {
    all_consuming(recognize(separated_list1(char('.'), path_segment)))
        .parse(input)
        .is_ok()
}

pub fn is_identifier(input: &str) -> bool {
    all_consuming(path_segment).parse(input).is_ok()
}

fn path_segment(input: &str) -> NomResult<'_, &str> {
    take_while1(is_segment_char).parse(input)
}

fn is_segment_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}
