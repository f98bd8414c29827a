//! Raw-text preprocessing applied before a configuration file is parsed.
//!
//! Two rewrites happen here: environment substitution over the whole text,
//! and removal of `"name": {"fromFile": "path"}` entries from the top-level
//! `accounts` object, which the loader merges back in after composing.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};

static ENV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

static FROM_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\{\s*"fromFile"\s*:\s*"((?:[^"\\]|\\.)*)"\s*\}$"#).unwrap()
});

/// Text ready for a parser plus the deferred account imports it referenced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessedConfig {
    pub text: String,
    /// Account name to the file it should be loaded from, as written.
    pub from_file: IndexMap<String, String>,
    /// Substituted value to the reference it replaced, for references that
    /// made up a whole JSON string.
    pub env_references: IndexMap<String, String>,
}

/// Run every preprocessing step over raw configuration text.
pub fn preprocess(raw: &str, env: &dyn Fn(&str) -> Option<String>) -> PreprocessedConfig {
    let (substituted, env_references) = substitute_env_recorded(raw, env);
    let (text, from_file) = extract_from_file_accounts(&substituted);
    PreprocessedConfig {
        text,
        from_file,
        env_references,
    }
}

/// Expand `${env:NAME}` and `$NAME` in one pass; unset variables expand to nothing.
///
/// Substituted values are never rescanned.
pub fn substitute_env(raw: &str, env: &dyn Fn(&str) -> Option<String>) -> String {
    substitute_env_recorded(raw, env).0
}

fn substitute_env_recorded(
    raw: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> (String, IndexMap<String, String>) {
    let mut references = IndexMap::new();
    let text = ENV_PATTERN
        .replace_all(raw, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let Some(value) = env(name) else {
                tracing::debug!(variable = %name, "Environment variable referenced by configuration is not set");
                return String::new();
            };
            if let Some(whole) = caps
                .get(0)
                .filter(|m| !value.is_empty() && is_whole_string(raw, m.start(), m.end()))
            {
                references.insert(value.clone(), whole.as_str().to_string());
            }
            value
        })
        .into_owned();
    (text, references)
}

/// Whether `raw[start..end]` is exactly the contents of a quoted string.
fn is_whole_string(raw: &str, start: usize, end: usize) -> bool {
    let bytes = raw.as_bytes();
    start > 0 && bytes[start - 1] == b'"' && bytes.get(end) == Some(&b'"')
}

/// A member of a JSON object, as byte offsets into the source text.
#[derive(Debug)]
struct Member {
    key: String,
    /// Start of the key's opening quote.
    start: usize,
    value_start: usize,
    value_end: usize,
    /// End of the member including a following comma, if any.
    end: usize,
}

fn extract_from_file_accounts(text: &str) -> (String, IndexMap<String, String>) {
    let mut imports = IndexMap::new();
    let Some((accounts_start, accounts_end)) = find_top_level_object(text, "accounts") else {
        return (text.to_string(), imports);
    };

    let members = object_members(text, accounts_start, accounts_end);
    let mut removals = Vec::new();
    for member in members {
        let value = &text[member.value_start..member.value_end];
        if let Some(caps) = FROM_FILE_PATTERN.captures(value) {
            let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            imports.insert(member.key.clone(), path.replace("\\\"", "\""));
            removals.push((member.start, member.end));
        }
    }
    if removals.is_empty() {
        return (text.to_string(), imports);
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in removals {
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    let body_end = accounts_end - cursor + out.len();
    out.push_str(&text[cursor..]);

    (repair_trailing_comma(out, body_end), imports)
}

/// Drop a comma left directly before the closing brace at `close`.
fn repair_trailing_comma(mut text: String, close: usize) -> String {
    let before = &text[..close];
    let trimmed = before.trim_end();
    if trimmed.ends_with(',') {
        let comma = trimmed.len() - 1;
        text.replace_range(comma..comma + 1, "");
    }
    text
}

/// Byte range `[open, close]` of the object value of a top-level key.
fn find_top_level_object(text: &str, key: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let root = skip_whitespace(bytes, 0);
    if bytes.get(root) != Some(&b'{') {
        return None;
    }
    let root_end = matching_close(bytes, root)?;
    object_members(text, root, root_end)
        .into_iter()
        .find(|m| m.key == key && bytes.get(m.value_start) == Some(&b'{'))
        .map(|m| (m.value_start, m.value_end - 1))
}

/// Members of the object whose braces sit at `open` and `close`.
fn object_members(text: &str, open: usize, close: usize) -> Vec<Member> {
    let bytes = text.as_bytes();
    let mut members = Vec::new();
    let mut i = skip_whitespace(bytes, open + 1);

    while i < close && bytes[i] == b'"' {
        let start = i;
        let Some(key_end) = string_end(bytes, i) else {
            break;
        };
        let key = text[i + 1..key_end].to_string();
        i = skip_whitespace(bytes, key_end + 1);
        if bytes.get(i) != Some(&b':') {
            break;
        }
        let value_start = skip_whitespace(bytes, i + 1);
        let Some(value_end) = value_end(bytes, value_start) else {
            break;
        };
        let mut end = skip_whitespace(bytes, value_end);
        if bytes.get(end) == Some(&b',') {
            end = skip_whitespace(bytes, end + 1);
        }
        members.push(Member {
            key,
            start,
            value_start,
            value_end,
            end,
        });
        i = end;
    }
    members
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Index of the closing quote of the string opening at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Index of the bracket closing the one at `open`.
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = string_end(bytes, i)?,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Exclusive end of the JSON value starting at `start`.
fn value_end(bytes: &[u8], start: usize) -> Option<usize> {
    match bytes.get(start)? {
        b'{' | b'[' => matching_close(bytes, start).map(|i| i + 1),
        b'"' => string_end(bytes, start).map(|i| i + 1),
        _ => {
            let mut i = start;
            while i < bytes.len() && !matches!(bytes[i], b',' | b'}' | b']') {
                i += 1;
            }
            while i > start && bytes[i - 1].is_ascii_whitespace() {
                i -= 1;
            }
            Some(i)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "EMULATOR_KEY" => Some("21c5dfdeb0ff03a7a73ef39788563b62c89adea67bbb21ab95e5f710bd1d40b7".to_string()),
            "HOST" => Some("127.0.0.1".to_string()),
            "LOOP" => Some("$HOST".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_env_substitution_both_forms() {
        let raw = r#"{"keys": "${env:EMULATOR_KEY}", "host": "$HOST:3569", "missing": "$NOPE"}"#;
        assert_eq!(
            substitute_env(raw, &env),
            r#"{"keys": "21c5dfdeb0ff03a7a73ef39788563b62c89adea67bbb21ab95e5f710bd1d40b7", "host": "127.0.0.1:3569", "missing": ""}"#
        );
    }

    #[test]
    fn test_env_substitution_single_pass() {
        assert_eq!(substitute_env("$LOOP", &env), "$HOST");

        let once = substitute_env(r#"{"host": "$HOST"}"#, &env);
        assert_eq!(substitute_env(&once, &env), once);
    }

    #[test]
    fn test_whole_string_references_recorded() {
        let raw = r#"{"keys": "${env:EMULATOR_KEY}", "host": "$HOST:3569", "missing": "$NOPE"}"#;
        let processed = preprocess(raw, &env);

        assert_eq!(processed.env_references.len(), 1);
        assert_eq!(
            processed
                .env_references
                .get("21c5dfdeb0ff03a7a73ef39788563b62c89adea67bbb21ab95e5f710bd1d40b7")
                .map(String::as_str),
            Some("${env:EMULATOR_KEY}")
        );
    }

    #[test]
    fn test_from_file_entry_removed_with_comma_repair() {
        let raw = r#"{
  "accounts": {
    "admin": {"address": "service", "chain": "flow-emulator", "keys": "aa"},
    "deployer": { "fromFile": "./private.json" }
  },
  "networks": {"emulator": "127.0.0.1:3569"}
}"#;
        let processed = preprocess(raw, &env);

        assert_eq!(
            processed.from_file.get("deployer").map(String::as_str),
            Some("./private.json")
        );
        let parsed: serde_json::Value = serde_json::from_str(&processed.text).unwrap();
        assert!(parsed["accounts"]["admin"].is_object());
        assert!(parsed["accounts"].get("deployer").is_none());
        assert!(parsed["networks"]["emulator"].is_string());
    }

    #[test]
    fn test_from_file_first_and_only_entries() {
        let first = r#"{"accounts": {"a": {"fromFile": "a.json"}, "b": {"address": "service", "keys": "aa"}}}"#;
        let processed = preprocess(first, &env);
        let parsed: serde_json::Value = serde_json::from_str(&processed.text).unwrap();
        assert!(parsed["accounts"]["b"].is_object());
        assert_eq!(processed.from_file.len(), 1);

        let only = r#"{"accounts": {"a": {"fromFile": "a.json"}}}"#;
        let processed = preprocess(only, &env);
        let parsed: serde_json::Value = serde_json::from_str(&processed.text).unwrap();
        assert_eq!(parsed["accounts"], serde_json::json!({}));
    }

    #[test]
    fn test_from_file_outside_accounts_is_kept() {
        let raw = r#"{"contracts": {"x": {"fromFile": "a.json"}}, "accounts": {}}"#;
        let processed = preprocess(raw, &env);
        assert_eq!(processed.text, raw);
        assert!(processed.from_file.is_empty());
    }
}
