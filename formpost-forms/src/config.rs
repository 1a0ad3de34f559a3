use std::collections::HashMap;

use formpost_common::Address;
use serde::Deserialize;

use crate::fieldmap::MappingTable;

/// Redirect every message to one address
///
/// Used while developing a site: the real recipients never see anything,
/// and each submission is flushed immediately.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub address: Option<Address>,
}

impl DebugConfig {
    /// The address messages are redirected to, when debug mode is active
    #[must_use]
    pub fn redirect(&self) -> Option<&Address> {
        self.address.as_ref().filter(|_| self.enabled)
    }
}

/// The message sent to the site's administrators
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub from: Address,
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    pub subject: String,
    pub body: String,
    /// Optional HTML alternative of `body`
    #[serde(default)]
    pub html: Option<String>,
    /// Attach uploaded files
    #[serde(default)]
    pub attach_files: bool,
    /// Set Reply-To to the submitter, when their address resolves
    #[serde(default)]
    pub reply_to_submitter: bool,
}

/// The message sent back to the submitter
///
/// The recipient is whatever the `Email` role resolves to; a submission
/// without one cannot be processed.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    pub from: Address,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub attach_files: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormConfig {
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
    #[serde(default)]
    pub confirmation: Option<ConfirmationConfig>,
}

/// Everything the processor needs, keyed by form name
///
/// ```ron
/// (
///     debug: (enabled: false),
///     forms: {
///         "contact": (
///             notification: (
///                 from: "Website <site@example.com>",
///                 to: ["admin@example.com"],
///                 subject: "[{{ form }}] Message from {{ name }}",
///                 body: "{{ fields }}",
///                 reply_to_submitter: true,
///             ),
///         ),
///     },
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormsConfig {
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub fieldmap: MappingTable,
    #[serde(default)]
    pub forms: HashMap<String, FormConfig>,
}
