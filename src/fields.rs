//! Lookups over loosely-typed document data.
//!
//! App clients write these documents, so any field may be missing, null, or of an unexpected
//! type. "Present" follows the app's own convention: null, false, 0, and "" count as absent.

use serde_json::Value;

/// The value at a dotted path such as `"dating.contactInfo.countryOfResidence"`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// A present value at `path`, rendered as text. Numbers and booleans are stringified.
pub fn text(value: &Value, path: &str) -> Option<String> {
    let found = lookup(value, path).filter(|v| truthy(Some(v)))?;
    Some(stringify(found))
}

/// `text`, or `default` when absent.
pub fn text_or(value: &Value, path: &str, default: &str) -> String {
    text(value, path).unwrap_or_else(|| default.to_string())
}

/// A string value at `path`, only if it is a non-empty string.
pub fn str_at<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    lookup(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Text form of a value as it would appear in a push payload.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
