//! Subject and body templating
//!
//! The processor hands templates and a [`RenderContext`] to a [`Renderer`].
//! [`PlaceholderRenderer`] covers the common case of `{{ name }}`
//! substitution; hosts with a real template engine plug in their own.

use std::{collections::BTreeMap, fmt::Write};

use thiserror::Error;

use crate::submission::{FieldValue, Submission};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unknown placeholder '{{{{ {0} }}}}'")]
    UnknownPlaceholder(String),

    #[error("Unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
}

/// Values available to a template
///
/// - every text field by name; uploads by their file name
/// - `form`: the form name
/// - `fields`: every field as a `name: value` line
/// - each resolved role under its name (`email`, `name`, `subject`), unless
///   a field of that name already provides it
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    values: BTreeMap<String, String>,
}

impl RenderContext {
    #[must_use]
    pub fn from_submission(submission: &Submission) -> Self {
        let mut values = BTreeMap::new();
        let mut summary = String::new();

        for field in &submission.fields {
            let value = match &field.value {
                FieldValue::Text(text) => text.clone(),
                FieldValue::File(path) => path
                    .file_name()
                    .map_or_else(String::new, |name| name.to_string_lossy().into_owned()),
            };

            let _ = writeln!(summary, "{}: {value}", field.name);
            values.entry(field.name.clone()).or_insert(value);
        }

        values.insert("form".to_string(), submission.form.clone());
        values.insert("fields".to_string(), summary.trim_end().to_string());

        Self { values }
    }

    /// Add `value` under `key` unless something is already there
    pub fn insert_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub trait Renderer: Send + Sync + std::fmt::Debug {
    /// Render `template` against `context`
    ///
    /// # Errors
    /// If the template is malformed or refers to something not in `context`
    fn render(&self, template: &str, context: &RenderContext) -> Result<String, RenderError>;
}

/// Replaces `{{ key }}` with the context value for `key`
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

impl Renderer for PlaceholderRenderer {
    fn render(&self, template: &str, context: &RenderContext) -> Result<String, RenderError> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);

            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| RenderError::Unterminated(template.len() - rest.len() + start))?;

            let key = after[..end].trim();
            let value = context
                .get(key)
                .ok_or_else(|| RenderError::UnknownPlaceholder(key.to_string()))?;
            output.push_str(value);

            rest = &after[end + 2..];
        }

        output.push_str(rest);
        Ok(output)
    }
}
