// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// The status of a single line after a run.
///
/// Statuses are totally ordered by precedence: `Uncovered < Success < Fail`. When several tests
/// touch the same line, the line ends up with the highest status any of them produced.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineStatus {
    /// The line can be instrumented but no test executed it.
    Uncovered,

    /// The line was executed, and only by passing units.
    Success,

    /// The line was executed by a failing unit, or an error was charged to it.
    Fail,
}

impl LineStatus {
    /// All statuses, in precedence order.
    pub const ALL: [Self; 3] = [Self::Uncovered, Self::Success, Self::Fail];

    /// Returns the status a line gets from a unit that did or did not fail.
    pub fn from_failed(failed: bool) -> Self {
        if failed { Self::Fail } else { Self::Success }
    }

    /// Returns the string representation of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uncovered => "uncovered",
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "proptest1")]
impl proptest::arbitrary::Arbitrary for LineStatus {
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        use proptest::prelude::*;

        prop_oneof![
            Just(Self::Uncovered),
            Just(Self::Success),
            Just(Self::Fail),
        ]
        .boxed()
    }
}

/// How a line label should be displayed.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Informational text, such as a logged value.
    #[default]
    Normal,

    /// Error text.
    Error,
}

impl Severity {
    /// Returns the string representation of this severity.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Error => "error",
        }
    }
}

/// Inline text attached to a line.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct LineLabel {
    /// The text to display.
    pub text: String,

    /// How to display the text.
    pub severity: Severity,
}

impl LineLabel {
    /// Creates a normal label.
    pub fn normal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Normal,
        }
    }

    /// Creates an error label.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Error,
        }
    }
}

/// Statuses for the lines of a single file, keyed by line number.
pub type LineStatuses = BTreeMap<u32, LineStatus>;

/// Statuses for every file in a run, keyed by absolute path.
pub type FileStatuses = BTreeMap<Utf8PathBuf, LineStatuses>;

/// Labels for the lines of a single file, keyed by line number.
pub type LineLabels = BTreeMap<u32, LineLabel>;

/// Labels for every file in a run, keyed by absolute path.
pub type FileLabels = BTreeMap<Utf8PathBuf, LineLabels>;

/// An entry in a filterable list, such as the list of failures.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Location {
    /// The file the entry points at.
    pub file: Utf8PathBuf,

    /// The line the entry points at.
    pub line: u32,

    /// The message to show. May span several lines.
    pub message: String,
}

/// The full details behind an inline notification.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct FullNotification {
    /// The file the notification belongs to.
    pub file: Utf8PathBuf,

    /// The line the notification belongs to.
    pub line: u32,

    /// The details, serialized as JSON.
    pub json: String,
}
