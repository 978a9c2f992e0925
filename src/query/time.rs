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

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while_m_n},
    character::complete::{alpha1, char, digit1, multispace0, one_of},
    combinator::{all_consuming, map_res, opt, recognize},
    error::Error as NomError,
    sequence::{pair, preceded},
};

use crate::{error::QueryError, sql::quote_literal};

type NomResult<'a, T> = IResult<&'a str, T, NomError<&'a str>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
}

impl IntervalUnit {
    pub fn sql(self) -> &'static str {
        match self {
            IntervalUnit::Minute => "MINUTE",
            IntervalUnit::Hour => "HOUR",
            IntervalUnit::Day => "DAY",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "m" | "minute" | "minutes" => Some(IntervalUnit::Minute),
            "h" | "hour" | "hours" => Some(IntervalUnit::Hour),
            "d" | "day" | "days" => Some(IntervalUnit::Day),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RelativeInterval {
    pub amount: u32,
    pub unit: IntervalUnit,
}

impl RelativeInterval {
    pub fn sql(&self) -> String {
        format!("now() - INTERVAL {} {}", self.amount, self.unit.sql())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

impl Boundary {
    fn operator(self) -> &'static str {
        match self {
            Boundary::Start => ">=",
            Boundary::End => "<=",
        }
    }

    fn field(self) -> &'static str {
        match self {
            Boundary::Start => "start_datetime",
            Boundary::End => "end_datetime",
        }
    }
}

/// Parses `1h`, `30m`, `2d` as well as `1 hour`, `30 minutes`. Returns
/// `None` for an unknown unit, a zero amount or a malformed number.
pub fn parse_relative_time(spec: &str) -> Option<RelativeInterval> {
    let lowered = spec.trim().to_ascii_lowercase();
    all_consuming(relative_time)
        .parse(lowered.as_str())
        .ok()
        .map(|(_, interval)| interval)
}

fn relative_time(input: &str) -> NomResult<'_, RelativeInterval> {
    map_res(
        pair(digit1, preceded(multispace0, alpha1)),
        |(amount, unit): (&str, &str)| {
            let amount: u32 = amount.parse().map_err(|_| "amount out of range")?;
            if amount == 0 {
                return Err("amount must be positive");
            }
            let unit = IntervalUnit::from_word(unit).ok_or("unknown unit")?;
            Ok::<_, &str>(RelativeInterval { amount, unit })
        },
    )
    .parse(input)
}

/// Accepts anything shaped like an ISO date or date-time and renders the
/// bound as a plain literal comparison. Only the shape is checked; calendar
/// validity is left to the engine.
pub fn parse_time_value(value: &str, boundary: Boundary) -> Option<String> {
    all_consuming(iso_shape).parse(value).ok()?;
    Some(format!("dt {} {}", boundary.operator(), quote_literal(value)))
}

fn iso_shape(input: &str) -> NomResult<'_, &str> {
    recognize((
        date_shape,
        opt(pair(one_of("T "), time_shape)),
        opt(zone_shape),
    ))
    .parse(input)
}

fn date_shape(input: &str) -> NomResult<'_, &str> {
    recognize((digits(4), char('-'), digits(2), char('-'), digits(2))).parse(input)
}

fn time_shape(input: &str) -> NomResult<'_, &str> {
    recognize((
        digits(2),
        char(':'),
        digits(2),
        opt((char(':'), digits(2), opt(preceded(char('.'), digit1)))),
    ))
    .parse(input)
}

fn zone_shape(input: &str) -> NomResult<'_, &str> {
    alt((
        tag("Z"),
        recognize((one_of("+-"), digits(2), opt(char(':')), digits(2))),
    ))
    .parse(input)
}

fn digits<'a>(count: usize) -> impl Parser<&'a str, Output = &'a str, Error = NomError<&'a str>> {
    take_while_m_n(count, count, |ch: char| ch.is_ascii_digit())
}

pub fn parse_full_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Full timestamp, or a bare date taken as midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    parse_full_timestamp(value).or_else(|| {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

pub fn custom_bound_clause(value: &str, boundary: Boundary) -> Result<String, QueryError> {
    if parse_full_timestamp(value).is_some() {
        return Ok(format!(
            "dt {} parseDateTime64BestEffort({})",
            boundary.operator(),
            quote_literal(value)
        ));
    }
    parse_time_value(value, boundary).ok_or_else(|| {
        QueryError::validation(format!("Invalid {}: {value}", boundary.field()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_compact_relative_times() {
        assert_eq!(
            parse_relative_time("1h"),
            Some(RelativeInterval {
                amount: 1,
                unit: IntervalUnit::Hour
            })
        );
        assert_eq!(parse_relative_time("30m").unwrap().unit, IntervalUnit::Minute);
        assert_eq!(parse_relative_time("2d").unwrap().amount, 2);
    }

    #[test]
    fn parses_natural_language_relative_times() {
        assert_eq!(
            parse_relative_time("30 minutes").unwrap().sql(),
            "now() - INTERVAL 30 MINUTE"
        );
        assert_eq!(parse_relative_time("1 hour").unwrap().sql(), "now() - INTERVAL 1 HOUR");
        assert_eq!(parse_relative_time(" 7 Days ").unwrap().sql(), "now() - INTERVAL 7 DAY");
    }

    #[test]
    fn relative_time_rejects_garbage_without_panicking() {
        for spec in ["", "h", "1", "1w", "1.5h", "-1h", "0h", "99999999999h", "1 hour ago"] {
            assert_eq!(parse_relative_time(spec), None, "spec {spec:?}");
        }
    }

    #[test]
    fn time_value_checks_shape_only() {
        assert_eq!(
            parse_time_value("2024-01-15", Boundary::Start).as_deref(),
            Some("dt >= '2024-01-15'")
        );
        assert_eq!(
            parse_time_value("2024-13-45 10:00:00", Boundary::End).as_deref(),
            Some("dt <= '2024-13-45 10:00:00'")
        );
        assert_eq!(
            parse_time_value("2024-01-15T10:00:00.123+02:00", Boundary::Start).as_deref(),
            Some("dt >= '2024-01-15T10:00:00.123+02:00'")
        );
        assert_eq!(parse_time_value("yesterday", Boundary::Start), None);
        assert_eq!(parse_time_value("2024-1-15", Boundary::Start), None);
        assert_eq!(parse_time_value("2024-01-15'; DROP", Boundary::Start), None);
    }

    #[test]
    fn full_timestamps_use_best_effort_parsing() {
        assert_eq!(
            custom_bound_clause("2024-01-15T10:00:00Z", Boundary::Start).unwrap(),
            "dt >= parseDateTime64BestEffort('2024-01-15T10:00:00Z')"
        );
        assert_eq!(
            custom_bound_clause("2024-01-15", Boundary::End).unwrap(),
            "dt <= '2024-01-15'"
        );
        let err = custom_bound_clause("soon", Boundary::End).unwrap_err();
        assert_eq!(err.to_string(), "Invalid end_datetime: soon");
    }

    #[test]
    fn parses_timestamps_to_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15T10:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15 08:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-15"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_full_timestamp("2024-01-15"), None);
        assert_eq!(parse_timestamp("2024-13-01"), None);
    }
}
