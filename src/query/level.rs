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

use serde_json::Value;

const LEVEL_KEYS: &[&str] = &["level", "severity", "loglevel"];

/// Reads the level of a raw JSON log line. The first key present among
/// `level`, `severity`, `loglevel` wins, even when its value is empty.
pub fn extract_log_level(raw: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(raw).ok()?;
    let object = parsed.as_object()?;
    let value = LEVEL_KEYS.iter().find_map(|key| object.get(*key))?;
    let text = match value {
        Value::Null => return None,
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    (!text.is_empty()).then(|| text.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_level_fields_in_priority_order() {
        assert_eq!(extract_log_level(r#"{"level":"debug"}"#).as_deref(), Some("DEBUG"));
        assert_eq!(extract_log_level(r#"{"severity":"error"}"#).as_deref(), Some("ERROR"));
        assert_eq!(extract_log_level(r#"{"loglevel":"Warn"}"#).as_deref(), Some("WARN"));
        assert_eq!(
            extract_log_level(r#"{"loglevel":"info","severity":"fatal"}"#).as_deref(),
            Some("FATAL")
        );
    }

    #[test]
    fn numeric_levels_are_stringified() {
        assert_eq!(extract_log_level(r#"{"level":30}"#).as_deref(), Some("30"));
    }

    #[test]
    fn missing_or_empty_levels_yield_none() {
        assert_eq!(extract_log_level("not json"), None);
        assert_eq!(extract_log_level(r#"{"level":null}"#), None);
        assert_eq!(extract_log_level(r#"{"level":"","severity":"error"}"#), None);
        assert_eq!(extract_log_level(r#"{"message":"hi"}"#), None);
        assert_eq!(extract_log_level(r#"["level"]"#), None);
    }
}
