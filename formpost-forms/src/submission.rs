use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What the submitter put in a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    /// An upload, already stored by the upload manager
    File(PathBuf),
}

impl FieldValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::File(_) => None,
        }
    }
}

/// One submitted field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// The form field type, e.g. `text`, `email`, `file`
    pub field_type: String,
    pub value: FieldValue,
}

/// A validated form submission
///
/// Fields keep the order in which the form declared them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub form: String,
    pub fields: Vec<Field>,
}

impl Submission {
    #[must_use]
    pub fn new(form: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            fields: Vec::new(),
        }
    }

    /// Add a text field
    #[must_use]
    pub fn text(
        mut self,
        name: impl Into<String>,
        field_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.fields.push(Field {
            name: name.into(),
            field_type: field_type.into(),
            value: FieldValue::Text(value.into()),
        });
        self
    }

    /// Add an uploaded file field
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            field_type: "file".to_string(),
            value: FieldValue::File(path.into()),
        });
        self
    }

    /// Paths of every uploaded file, in field order
    pub fn uploads(&self) -> impl Iterator<Item = &PathBuf> {
        self.fields.iter().filter_map(|field| match &field.value {
            FieldValue::File(path) => Some(path),
            FieldValue::Text(_) => None,
        })
    }
}
