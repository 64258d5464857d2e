//! Template rendering.
//!
//! Patterns use the `tera` syntax:
//!
//! - `{{ name }}` interpolation (numbers and booleans render in their natural form)
//! - `{% if flag %}...{% else %}...{% endif %}`
//! - `{% for item in items %}...{% endfor %}`
//! - filters: `upper`, `lower`, `title`, `trim`, `truncate(length=N)`,
//!   `default(value=..)` for undefined values and `default_if_empty(value=..)`
//!   for empty ones
//!
//! Referencing an undefined variable or filter is an error; no partial output
//! is ever returned.

use std::collections::HashMap;
use std::error::Error as _;

use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

use super::types::{RenderedMessage, Template};

/// Rendering failed (malformed pattern, undefined variable or filter)
#[derive(Debug, Clone, Error)]
#[error("Render error: {message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn from_tera(err: tera::Error) -> Self {
        // tera nests the useful part ("Variable `x` not found ...") in the source chain
        let mut parts = vec![err.to_string()];
        let mut source = err.source();
        while let Some(inner) = source {
            parts.push(inner.to_string());
            source = inner.source();
        }
        Self::new(parts.join(": "))
    }
}

/// Render `pattern` against a JSON object of variables.
///
/// Pure: the same inputs always produce the same output.
pub fn render(pattern: &str, variables: &Value) -> Result<String, RenderError> {
    let context = match variables {
        Value::Object(_) => Context::from_value(variables.clone()).map_err(RenderError::from_tera)?,
        Value::Null => Context::new(),
        _ => return Err(RenderError::new("Variables must be an object")),
    };

    let mut tera = Tera::default();
    tera.register_filter("default_if_empty", default_if_empty);
    tera.render_str(pattern, &context)
        .map_err(RenderError::from_tera)
}

/// Render both subject and body of a template
pub fn render_template(template: &Template, variables: &Value) -> Result<RenderedMessage, RenderError> {
    let subject = if template.subject.is_empty() {
        String::new()
    } else {
        render(&template.subject, variables)?
    };
    let body = render(&template.body, variables)?;

    Ok(RenderedMessage { subject, body })
}

fn default_if_empty(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let fallback = args.get("value").cloned().ok_or_else(|| {
        tera::Error::msg("Filter `default_if_empty` expected an arg called `value`")
    })?;

    let empty = match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };

    Ok(if empty { fallback } else { value.clone() })
}
