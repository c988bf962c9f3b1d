//! Error types for page parsing.

use thiserror::Error;

/// Errors raised while extracting links and records from page markup.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// An element the page layout guarantees was not found.
    #[error("no {what} found on {url}\n  Suggestion: the page layout may have changed")]
    MissingElement {
        /// Description of the expected element.
        what: &'static str,
        /// Page the element was expected on.
        url: String,
    },

    /// An element was found but its value is unusable.
    #[error("invalid {what} '{value}' on {url}")]
    InvalidValue {
        /// Description of the element.
        what: &'static str,
        /// The offending value.
        value: String,
        /// Page the value came from.
        url: String,
    },

    /// A built-in selector or pattern failed to compile.
    #[error("invalid selector '{selector}': {reason}")]
    Selector {
        /// The selector source text.
        selector: String,
        /// Compiler message.
        reason: String,
    },

    /// The parse job could not run to completion on the compute pool.
    #[error("parse job failed: {0}")]
    Executor(String),
}

impl ParseError {
    /// Creates a `MissingElement` error.
    #[must_use]
    pub fn missing(what: &'static str, url: &str) -> Self {
        Self::MissingElement {
            what,
            url: url.to_string(),
        }
    }

    /// Creates an `InvalidValue` error.
    #[must_use]
    pub fn invalid(what: &'static str, value: impl Into<String>, url: &str) -> Self {
        Self::InvalidValue {
            what,
            value: value.into(),
            url: url.to_string(),
        }
    }
}
