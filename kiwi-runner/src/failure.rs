// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Values thrown by code under test.

use kiwi_metadata::SourceLocation;
use serde::Serialize;
use serde_json::Value;
use std::{any::Any, fmt};
use thiserror::Error;

/// A failure raised while loading a module or running a test.
///
/// Failures are data, not engine errors: the runner records them against the unit that raised them
/// and carries on with the next unit.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct Failure {
    /// A human-readable description of the failure.
    pub message: String,

    /// The value that was observed, for assertion failures.
    pub actual: Option<Value>,

    /// The value that was expected, for assertion failures.
    pub expected: Option<Value>,

    /// Where the failure was raised, if the loader knows.
    ///
    /// This is only used when no probe position is pending at the time of the failure.
    pub location: Option<SourceLocation>,
}

impl Failure {
    /// Creates a new failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            actual: None,
            expected: None,
            location: None,
        }
    }

    /// Attaches the location the failure was raised at.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Converts a panic payload into a failure.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panicked with a non-string payload".to_owned()
        };
        Self::new(message)
    }

    /// Returns the first line of the message, used where only a short summary fits.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Fails with the observed and expected values attached if `actual != expected`.
///
/// Both values are captured as JSON so they can be shown in full notifications. A value that fails
/// to serialize is recorded as absent.
pub fn assert_equal<T>(actual: &T, expected: &T) -> Result<(), Failure>
where
    T: Serialize + PartialEq + fmt::Debug + ?Sized,
{
    if actual == expected {
        return Ok(());
    }

    Err(Failure {
        message: format!("expected {actual:?} to equal {expected:?}"),
        actual: serde_json::to_value(actual).ok(),
        expected: serde_json::to_value(expected).ok(),
        location: None,
    })
}
