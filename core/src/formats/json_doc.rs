/// JSON document handling. Only leaf string values are translated; keys,
/// array order, and non-string values survive the round trip byte-for-byte
/// in structure.
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};
use crate::task::{TranslationUnit, UnitPosition, UnitStatus};

static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}:\d{2}(\.\d{3})?Z?)?$").expect("valid date regex")
});
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://|www\.)\S+$").expect("valid url regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static UUID_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid uuid regex")
});
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid digits regex"));

/// Values that look like machine data rather than prose: dates, URLs,
/// emails, UUIDs, bare numeric ids, and bracket-delimited code fragments.
pub fn should_skip(value: &str) -> bool {
    if DATE_TIME.is_match(value) || URL.is_match(value) || EMAIL.is_match(value) {
        return true;
    }
    if DIGITS.is_match(value) || UUID_LIKE.is_match(value) {
        return true;
    }

    let mut chars = value.chars();
    let first = chars.next();
    let last = value.chars().last();
    matches!(
        (first, last),
        (Some('{'), Some('}')) | (Some('['), Some(']')) | (Some('<'), Some('>'))
    )
}

/// One unit per translatable leaf string, positioned by its dotted path.
pub fn chunk_json(value: &Value) -> Vec<TranslationUnit> {
    let mut units = Vec::new();
    walk(value, "", &mut |path, text| {
        units.push(TranslationUnit::new(
            UnitPosition::JsonPath(path.to_string()),
            text,
        ));
    });
    units
}

/// Rebuild the document with translations applied at their recorded paths,
/// serialized with two-space indentation.
pub fn reassemble(value: &Value, units: &[TranslationUnit]) -> ServiceResult<String> {
    let mut translations: HashMap<&str, &str> = HashMap::new();
    for unit in units {
        let UnitPosition::JsonPath(path) = &unit.position else {
            continue;
        };
        if unit.status == UnitStatus::Pending {
            continue;
        }
        translations.insert(path.as_str(), unit.output_text());
    }

    let mut output = value.clone();
    apply(&mut output, "", &translations);

    serde_json::to_string_pretty(&output)
        .map_err(|e| ServiceError::Validation(format!("JSON serialize error: {}", e)))
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

/// Depth-first walk over translatable leaf strings. The walk itself is pure
/// over the value; all effects go through the supplied sink.
fn walk(value: &Value, path: &str, sink: &mut impl FnMut(&str, &str)) {
    match value {
        Value::String(s) => {
            if !s.trim().is_empty() && !should_skip(s) {
                sink(path, s);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, &child_path(path, key), sink);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, &index_path(path, index), sink);
            }
        }
        _ => {}
    }
}

fn apply(value: &mut Value, path: &str, translations: &HashMap<&str, &str>) {
    match value {
        Value::String(s) => {
            if let Some(translated) = translations.get(path) {
                *s = translated.to_string();
            }
        }
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let next = child_path(path, key);
                apply(child, &next, translations);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                let next = index_path(path, index);
                apply(child, &next, translations);
            }
        }
        _ => {}
    }
}
