//! Recovery of structured directives from free-form model output.
//!
//! Models are asked to answer with a JSON object but routinely wrap it in
//! prose, break it across lines or use full-width quotes. Parsing never
//! fails: anything unrecoverable becomes an empty directive, which callers
//! treat as "nothing actionable".

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

/// A parsed directive: always a JSON object, possibly empty.
pub type Directive = Map<String, Value>;

// No dot-matches-newline: only single-line candidates are tried here.
static BRACED: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{.*\}").ok());

fn as_object(text: &str) -> Option<Directive> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

pub fn parse_directive(text: &str) -> Directive {
    if let Some(map) = as_object(text) {
        return map;
    }

    if let Some(candidate) = BRACED.as_ref().and_then(|re| re.find(text)) {
        if let Some(map) = as_object(candidate.as_str()) {
            return map;
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            let cleaned = text[start..=end]
                .replace(['\n', '\r'], "")
                .replace(['\u{201c}', '\u{201d}'], "\"");
            if let Some(map) = as_object(&cleaned) {
                return map;
            }
        }
    }

    warn!(output = text, "No JSON directive found in model output");
    Directive::new()
}

/// Read a directive field holding one string or a list of strings.
///
/// Blank entries are dropped; numbers inside a list are kept as their text.
/// Returns `None` for any other shape.
pub fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(
            Some(s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .into_iter()
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        _ => None,
    }
}

/// A tool invocation requested by the model: `{"name": .., "parameters": {..}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCall {
    pub name: Option<String>,
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            name: Some(name.into()),
            parameters,
        }
    }

    pub fn from_directive(directive: &Directive) -> Self {
        let name = directive
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let parameters = directive
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self { name, parameters }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }
}
