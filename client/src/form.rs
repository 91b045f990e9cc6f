//! Add-feed form validation.

use feedwatch_common::protocol::NewStream;

use crate::error::ValidationError;

/// Raw user input for registering a new feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewStreamForm {
    pub name: String,
    pub source: String,
}

impl NewStreamForm {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Trimmed request body, or the message shown inline on the form.
    pub fn validate(&self) -> Result<NewStream, ValidationError> {
        let name = self.name.trim();
        let source = self.source.trim();
        if name.is_empty() || source.is_empty() {
            return Err(ValidationError::MissingFields);
        }
        Ok(NewStream {
            name: name.to_string(),
            source: source.to_string(),
        })
    }

    /// Reset after a successful submission.
    pub fn clear(&mut self) {
        self.name.clear();
        self.source.clear();
    }
}
