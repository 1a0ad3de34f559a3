//! Form submission handling for formpost.
//!
//! A [`FormProcessor`] resolves semantic roles from a [`Submission`] through
//! the field [`MappingTable`], renders the configured templates and queues
//! the resulting messages.

pub mod config;
pub mod error;
pub mod fieldmap;
pub mod processor;
pub mod render;
pub mod submission;

pub use config::{ConfirmationConfig, DebugConfig, FormConfig, FormsConfig, NotificationConfig};
pub use error::{MappingError, ProcessError};
pub use fieldmap::{
    EmailMap, Extractor, FieldMap, Mapping, MappingConfig, MappingTable, Matcher, Role, ValueMap,
    resolve,
};
pub use processor::FormProcessor;
pub use render::{PlaceholderRenderer, RenderContext, RenderError, Renderer};
pub use submission::{Field, FieldValue, Submission};
