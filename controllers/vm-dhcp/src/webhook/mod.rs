//! Admission-time validation for IPPool objects.
//!
//! Runs synchronously on create and update, before anything is persisted.
//! A rejection is surfaced to the admission caller and never retried.

pub mod ippool;

use thiserror::Error;

/// Rejection handed back to the admission caller. The message template is
/// part of the observable contract; both create and update use it.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("could not create IPPool {namespace}/{name} because {cause}")]
pub struct ValidationError {
    pub namespace: String,
    pub name: String,
    pub cause: String,
}

impl ValidationError {
    pub fn new(namespace: &str, name: &str, cause: impl Into<String>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            cause: cause.into(),
        }
    }
}
