// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Contract violations reported at the changeset's call boundary.
//!
//! Field validation failures are *not* errors in this sense: they are ordinary data, stored per
//! field and exposed through [`Changeset::errors`](crate::Changeset::errors). The types here are
//! reserved for misuse of the API and for failures of the collaborators a changeset drives.

use crate::{content::SaveError, validation::ValidatorError};
use std::{error, fmt};

/// Error returned when a changeset operation is invoked in violation of its contract.
#[derive(Debug)]
pub enum ChangesetError {
    /// The changeset was built over content whose root is not an object.
    MissingContent,
    /// Two changesets over different content instances were merged.
    ContentMismatch,
    /// A structured error passed to [`add_error`](crate::Changeset::add_error) lacks a field.
    MalformedError {
        /// Either `"value"` or `"validation"`.
        missing: &'static str,
    },
    /// A snapshot to restore is missing a section or the section is not an object.
    MalformedSnapshot {
        /// Either `"changes"` or `"errors"`.
        field: &'static str,
    },
    /// A key map holds both a path and one of its ancestors.
    OverlappingKeys {
        /// Which input held the overlapping keys.
        label: &'static str,
        /// The ancestor path that would be overridden.
        path: String,
    },
    /// The validator's future failed instead of producing a verdict.
    Validator {
        key: String,
        source: ValidatorError,
    },
    /// The content's save operation failed.
    Save(SaveError),
}

impl fmt::Display for ChangesetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangesetError::MissingContent => {
                write!(f, "underlying object for changeset is missing")
            }
            ChangesetError::ContentMismatch => {
                write!(f, "cannot merge with a changeset of different content")
            }
            ChangesetError::MalformedError { missing } => {
                write!(f, "error must have {missing}")
            }
            ChangesetError::MalformedSnapshot { field } => {
                write!(f, "snapshot.{field} must be an object")
            }
            ChangesetError::OverlappingKeys { label, path } => write!(
                f,
                "object {label} may not have keys that override each other (at {path})"
            ),
            ChangesetError::Validator { key, .. } => {
                write!(f, "validator failed for key {key}")
            }
            ChangesetError::Save(_) => write!(f, "failed to save content"),
        }
    }
}

impl error::Error for ChangesetError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ChangesetError::Validator { source, .. } => Some(source),
            ChangesetError::Save(source) => Some(source),
            _ => None,
        }
    }
}

impl From<SaveError> for ChangesetError {
    fn from(value: SaveError) -> Self {
        ChangesetError::Save(value)
    }
}
