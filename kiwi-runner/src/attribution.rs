// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Charging failures to source positions.
//!
//! When a unit fails, the error is charged to the innermost expression that had started but not
//! finished (the last pending position). The failing unit may have passed through several files on
//! its way to that expression, so the error is also charged to the last position the unit reached
//! in each of those other files. This way every file involved in a failure shows it.

use crate::{failure::Failure, runner::UnitIndex};
use kiwi_metadata::{FileHandle, Position, SourceLocation, TraceEntry};
use serde_json::Value;
use std::collections::BTreeSet;

/// A failure charged to a single site.
#[derive(Clone, Debug, PartialEq)]
pub struct ThrownError {
    /// The failure's message.
    pub message: String,

    /// The observed value, for assertion failures.
    pub actual: Option<Value>,

    /// The expected value, for assertion failures.
    pub expected: Option<Value>,

    /// Where the failure was charged.
    pub site: ErrorSite,

    /// The unit that raised the failure.
    pub unit: UnitIndex,
}

impl ThrownError {
    /// Creates an error charged to `site`.
    pub fn new(failure: &Failure, site: ErrorSite, unit: UnitIndex) -> Self {
        Self {
            message: failure.message.clone(),
            actual: failure.actual.clone(),
            expected: failure.expected.clone(),
            site,
            unit,
        }
    }
}

/// The site an error is charged to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorSite {
    /// A probe position in generated code. May be [`Position::SENTINEL`].
    Probe(Position),

    /// A location reported by the compiler or the loader.
    Compiler(SourceLocation),
}

impl ErrorSite {
    fn file_handle(&self) -> Option<FileHandle> {
        match self {
            Self::Probe(position) if !position.is_sentinel() => Some(position.file),
            Self::Probe(_) | Self::Compiler(_) => None,
        }
    }
}

/// Charges `failure`, raised by `unit`, to source positions.
///
/// `pending` is the innermost unfinished expression at the time of the failure, and `trace` is the
/// failing unit's trace. The first returned error is the primary one; the rest are charged to the
/// last entry the unit reached in each other file it touched.
///
/// At least one error is always returned.
pub fn attribute(
    failure: &Failure,
    unit: UnitIndex,
    pending: Option<Position>,
    trace: &[TraceEntry],
) -> Vec<ThrownError> {
    let primary = match (pending, &failure.location) {
        (Some(position), _) => ErrorSite::Probe(position),
        (None, Some(location)) => ErrorSite::Compiler(location.clone()),
        (None, None) => ErrorSite::Probe(Position::SENTINEL),
    };

    let touched: BTreeSet<FileHandle> = trace.iter().map(TraceEntry::file).collect();
    let mut seen: BTreeSet<FileHandle> = primary.file_handle().into_iter().collect();

    let mut errors = vec![ThrownError::new(failure, primary, unit)];
    for entry in trace.iter().rev() {
        if touched.is_subset(&seen) {
            break;
        }
        if seen.insert(entry.file()) {
            errors.push(ThrownError::new(
                failure,
                ErrorSite::Probe(entry.start()),
                unit,
            ));
        }
    }

    errors
}
