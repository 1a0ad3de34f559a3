//! Resolution of semantic roles from submitted fields
//!
//! A [`MappingTable`] is an ordered list of `(matcher, role, extractor)`
//! entries. For a given role, entries matching by field name are tried
//! before entries matching by field type; within each class declaration
//! order decides, and within one entry the first submitted field that both
//! matches and extracts wins.

use std::{fmt, sync::Arc};

use formpost_common::Address;
use serde::Deserialize;

use crate::submission::{Field, Submission};

/// What a resolved value is used for when composing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Role {
    /// The submitter's email address
    Email,
    /// The submitter's name
    Name,
    /// A subject line supplied by the submitter
    Subject,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Name => "name",
            Self::Subject => "subject",
        })
    }
}

/// Turns a matched field into the value for a role
///
/// Returning `None` means the field matched but holds nothing usable, and
/// resolution moves on to the next candidate.
pub trait FieldMap: Send + Sync + fmt::Debug {
    fn extract(&self, field: &Field) -> Option<String>;
}

/// The trimmed text value, if not empty
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueMap;

impl FieldMap for ValueMap {
    fn extract(&self, field: &Field) -> Option<String> {
        field
            .value
            .as_text()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    }
}

/// A single syntactically valid email address
#[derive(Debug, Default, Clone, Copy)]
pub struct EmailMap;

impl FieldMap for EmailMap {
    fn extract(&self, field: &Field) -> Option<String> {
        let value = field.value.as_text()?;
        Address::parse(value).ok().map(|address| address.addr)
    }
}

/// Which fields an entry applies to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum Matcher {
    /// Field name, exact match
    Name(String),
    /// Field type, exact match
    Type(String),
}

impl Matcher {
    fn matches(&self, field: &Field) -> bool {
        match self {
            Self::Name(name) => field.name == *name,
            Self::Type(field_type) => field.field_type == *field_type,
        }
    }

    const fn is_name(&self) -> bool {
        matches!(self, Self::Name(_))
    }
}

/// Built-in extractors, selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Extractor {
    #[default]
    Value,
    Email,
}

impl Extractor {
    fn into_field_map(self) -> Arc<dyn FieldMap> {
        match self {
            Self::Value => Arc::new(ValueMap),
            Self::Email => Arc::new(EmailMap),
        }
    }
}

/// One declared mapping
#[derive(Debug, Clone)]
pub struct Mapping {
    pub matcher: Matcher,
    pub role: Role,
    pub extractor: Arc<dyn FieldMap>,
}

impl Mapping {
    pub fn new(matcher: Matcher, role: Role, extractor: impl FieldMap + 'static) -> Self {
        Self {
            matcher,
            role,
            extractor: Arc::new(extractor),
        }
    }
}

/// A mapping as written in the configuration file
///
/// ```ron
/// fieldmap: [
///     (matcher: Name("email"), role: Email, extract: Email),
///     (matcher: Name("full_name"), role: Name),
/// ],
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    pub matcher: Matcher,
    pub role: Role,
    #[serde(default)]
    pub extract: Extractor,
}

impl From<MappingConfig> for Mapping {
    fn from(config: MappingConfig) -> Self {
        Self {
            matcher: config.matcher,
            role: config.role,
            extractor: config.extract.into_field_map(),
        }
    }
}

/// Ordered mapping declarations
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "Vec<MappingConfig>")]
pub struct MappingTable {
    mappings: Vec<Mapping>,
}

impl From<Vec<MappingConfig>> for MappingTable {
    fn from(configs: Vec<MappingConfig>) -> Self {
        Self::new(configs.into_iter().map(Mapping::from).collect())
    }
}

impl Default for MappingTable {
    /// A field named `email` holding an address, else any field of type
    /// `email`, is the submitter's address
    fn default() -> Self {
        Self::new(vec![
            Mapping::new(Matcher::Name("email".to_string()), Role::Email, EmailMap),
            Mapping::new(Matcher::Type("email".to_string()), Role::Email, EmailMap),
        ])
    }
}

impl MappingTable {
    #[must_use]
    pub const fn new(mappings: Vec<Mapping>) -> Self {
        Self { mappings }
    }

    #[must_use]
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Resolve `role` against `submission`
    #[must_use]
    pub fn resolve(&self, role: Role, submission: &Submission) -> Option<String> {
        let for_role = || self.mappings.iter().filter(move |m| m.role == role);

        for_role()
            .filter(|m| m.matcher.is_name())
            .chain(for_role().filter(|m| !m.matcher.is_name()))
            .find_map(|mapping| {
                submission
                    .fields
                    .iter()
                    .filter(|field| mapping.matcher.matches(field))
                    .find_map(|field| mapping.extractor.extract(field))
            })
    }
}

/// Resolve `role` against `submission` using `table`
#[must_use]
pub fn resolve(role: Role, submission: &Submission, table: &MappingTable) -> Option<String> {
    table.resolve(role, submission)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_name_match_beats_type_match() {
        let submission = Submission::new("contact")
            .text("contact_address", "email", "other@example.com")
            .text("email", "text", "jo@example.com");

        let table = MappingTable::default();

        assert_eq!(
            resolve(Role::Email, &submission, &table).as_deref(),
            Some("jo@example.com")
        );
    }

    #[test]
    fn test_name_match_wins_even_when_declared_later() {
        let submission = Submission::new("contact")
            .text("contact_address", "email", "other@example.com")
            .text("email", "text", "jo@example.com");

        let table = MappingTable::new(vec![
            Mapping::new(Matcher::Type("email".into()), Role::Email, EmailMap),
            Mapping::new(Matcher::Name("email".into()), Role::Email, EmailMap),
        ]);

        assert_eq!(
            table.resolve(Role::Email, &submission).as_deref(),
            Some("jo@example.com")
        );
    }

    #[test]
    fn test_falls_back_to_type_match() {
        let submission = Submission::new("contact")
            .text("name", "text", "Jo")
            .text("reply", "email", "Jo <jo@example.com>");

        assert_eq!(
            MappingTable::default().resolve(Role::Email, &submission).as_deref(),
            Some("jo@example.com")
        );
    }

    #[test]
    fn test_unextractable_field_is_skipped() {
        // "email" holds garbage, so the typed field is used instead
        let submission = Submission::new("contact")
            .text("email", "text", "not an address")
            .text("work", "email", "jo@work.example.com");

        assert_eq!(
            MappingTable::default().resolve(Role::Email, &submission).as_deref(),
            Some("jo@work.example.com")
        );
    }

    #[test]
    fn test_declaration_order_within_class() {
        let submission = Submission::new("contact")
            .text("first", "text", "First")
            .text("full_name", "text", "Jo Bloggs");

        let table = MappingTable::new(vec![
            Mapping::new(Matcher::Name("full_name".into()), Role::Name, ValueMap),
            Mapping::new(Matcher::Name("first".into()), Role::Name, ValueMap),
        ]);

        assert_eq!(table.resolve(Role::Name, &submission).as_deref(), Some("Jo Bloggs"));
        assert_eq!(table.resolve(Role::Subject, &submission), None);
    }

    #[test]
    fn test_unresolved_role() {
        let submission = Submission::new("contact").text("message", "textarea", "hi");
        assert_eq!(MappingTable::default().resolve(Role::Email, &submission), None);
    }

    #[test]
    fn test_value_map_ignores_blank_and_files() {
        let submission = Submission::new("contact")
            .text("subject", "text", "   ")
            .file("subject", "/tmp/upload.bin");

        let table = MappingTable::new(vec![Mapping::new(
            Matcher::Name("subject".into()),
            Role::Subject,
            ValueMap,
        )]);

        assert_eq!(table.resolve(Role::Subject, &submission), None);
    }

    #[test]
    fn test_table_from_config() {
        let table: MappingTable = ron::from_str(
            r#"[
                (matcher: Name("your_email"), role: Email, extract: Email),
                (matcher: Name("your_name"), role: Name),
            ]"#,
        )
        .expect("valid table");

        let submission = Submission::new("contact")
            .text("your_name", "text", " Jo ")
            .text("your_email", "text", "jo@example.com");

        assert_eq!(table.mappings().len(), 2);
        assert_eq!(table.resolve(Role::Name, &submission).as_deref(), Some("Jo"));
        assert_eq!(
            table.resolve(Role::Email, &submission).as_deref(),
            Some("jo@example.com")
        );
    }
}
