use formpost_spool::{BuildError, SpoolError};
use thiserror::Error;

use crate::{fieldmap::Role, render::RenderError};

/// A role a message depends on could not be resolved from the submission.
///
/// This points at a form whose fields don't match its mapping table, so it
/// is a configuration problem rather than anything the submitter did.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Form '{form}' needs a field for the {role} role, but none resolved")]
    Unresolved { form: String, role: Role },
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("No form named '{0}' is configured")]
    UnknownForm(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Unable to render the {template} of form '{form}': {source}")]
    Render {
        form: String,
        template: &'static str,
        #[source]
        source: RenderError,
    },

    #[error("Unable to compose a message for form '{form}': {source}")]
    Compose {
        form: String,
        #[source]
        source: BuildError,
    },

    /// The spool refused the message; the submission must be reported as
    /// failed.
    #[error(transparent)]
    Enqueue(#[from] SpoolError),
}
