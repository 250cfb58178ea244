//! Placeholder substitution.
//!
//! Accepts both `{name}` and `{{name}}` markers; both map to the same
//! context keys. Markers whose key is missing from the context are
//! preserved verbatim. Substitution is a pure function of
//! (template, context): rendering twice yields byte-identical output, and
//! disjoint context maps commute.

use chrono::DateTime;

use herald_core::types::{PayloadMap, RenderedContent};

use crate::model::Template;

/// Renders a template against a context map.
#[must_use]
pub fn render(template: &Template, context: &PayloadMap) -> RenderedContent {
    RenderedContent {
        subject: template
            .subject
            .as_ref()
            .map(|s| render_string(s, context)),
        body: render_string(&template.body, context),
        html_body: None,
        data: template.data.as_ref().map(|d| render_value(d, context)),
    }
}

/// Substitutes context values into a single string.
///
/// Double-brace markers are replaced before single-brace ones so `{{name}}`
/// never leaves a stray brace pair behind.
#[must_use]
pub fn render_string(text: &str, context: &PayloadMap) -> String {
    let mut out = text.to_string();
    for (key, value) in context {
        let replacement = value_to_string(value);
        out = out.replace(&format!("{{{{{key}}}}}"), &replacement);
        out = out.replace(&format!("{{{key}}}"), &replacement);
    }
    out
}

/// Recursively substitutes into the string leaves of a JSON value.
fn render_value(value: &serde_json::Value, context: &PayloadMap) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(render_string(s, context)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| render_value(v, context)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Converts a context value into substitution text.
///
/// ISO-8601 timestamp strings are reformatted to a human-readable form;
/// everything else renders as compact JSON without quoting strings.
fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map_or_else(|_| s.clone(), |dt| dt.format("%b %d, %Y %H:%M %Z").to_string()),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
