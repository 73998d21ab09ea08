//! Custom Tera filters used by translated templates.

use std::collections::HashMap;
use tera::Value;

/// Name under which [`escape_markup`] is registered.
pub const ESCAPE_FILTER: &str = "escape_markup";

/// Print any value as text and escape `& < > " '`.
///
/// Strings are used as is, `null` prints nothing, arrays print their elements
/// joined with `,` and every other value prints its JSON form. `/` is left
/// alone so URLs come through unchanged.
pub fn escape_markup(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(escape(&display(value))))
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
