// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Folding a run's records into per-line results.
//!
//! Aggregation is a pure function of a [`RunOutcome`]: the same outcome always produces the same
//! [`RunResults`]. Line statuses are combined by taking the maximum, so a line that any failing unit
//! touched stays [`LineStatus::Fail`] no matter which order records are folded in.

use crate::{
    attribution::{ErrorSite, ThrownError},
    errors::AggregateError,
    helpers::absolutize,
    position::{LineColumn, OriginalMapper, OriginalPosition},
    runner::{RunOutcome, SETUP_LABEL},
};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use kiwi_metadata::{
    FileHandle, FileLabels, FileStatuses, FullNotification, LineLabel, LineStatus, Location,
    Severity,
};
use serde::Serialize;
use serde_json::Value;
use std::{collections::BTreeMap, ops::RangeInclusive};

/// Per-line results of a run, ready to hand to an editor.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunResults {
    /// Statuses for every instrumentable or executed line, keyed by absolute path.
    pub statuses: FileStatuses,

    /// Inline labels, keyed by absolute path.
    pub labels: FileLabels,

    /// One entry per charged error, in the order errors were raised.
    pub failures: Vec<Location>,

    /// Full details for each line with errors.
    pub full_notifications: Vec<FullNotification>,

    /// True if the run as a whole failed.
    pub suite_failed: bool,
}

/// Aggregates [`RunOutcome`]s.
#[derive(Debug)]
pub struct Aggregator<'a> {
    project_root: &'a Utf8Path,
    entry_point: &'a Utf8Path,
    mapper: Option<&'a OriginalMapper>,
}

impl<'a> Aggregator<'a> {
    /// Creates a new aggregator.
    ///
    /// Relative file names are resolved against `project_root`. Errors that couldn't be charged to
    /// any position are shown on the first line of `entry_point`.
    pub fn new(project_root: &'a Utf8Path, entry_point: &'a Utf8Path) -> Self {
        Self {
            project_root,
            entry_point,
            mapper: None,
        }
    }

    /// Sets the source map used to add original positions to full notifications.
    pub fn set_mapper(&mut self, mapper: &'a OriginalMapper) -> &mut Self {
        self.mapper = Some(mapper);
        self
    }

    /// Folds `outcome` into per-line results.
    ///
    /// Returns an error if the outcome references a file handle that was never registered, or
    /// contains a malformed catalog span.
    pub fn aggregate(&self, outcome: &RunOutcome) -> Result<RunResults, AggregateError> {
        let files = FileResolver {
            files: &outcome.files,
            project_root: self.project_root,
            entry_point: self.entry_point,
        };
        let mut statuses = FileStatuses::new();

        // Every instrumentable line starts out uncovered.
        for (&handle, spans) in &outcome.catalog {
            let lines = statuses.entry(files.resolve(handle)?).or_default();
            for span in spans {
                if !span.is_well_formed() {
                    return Err(AggregateError::MalformedCatalogSpan {
                        handle,
                        span: *span,
                    });
                }
                for line in span.lines() {
                    lines.entry(line).or_insert(LineStatus::Uncovered);
                }
            }
        }

        for record in &outcome.records {
            let status = LineStatus::from_failed(record.failed);
            for entry in &record.trace {
                merge_lines(
                    &mut statuses,
                    files.resolve(entry.file())?,
                    entry.lines(),
                    status,
                );
            }
        }

        let mut failures = Vec::with_capacity(outcome.errors.len());
        let mut errors_by_line: BTreeMap<(Utf8PathBuf, u32), Vec<&ThrownError>> = BTreeMap::new();
        for error in &outcome.errors {
            let (path, line) = files.resolve_site(&error.site)?;
            merge_lines(&mut statuses, path.clone(), line..=line, LineStatus::Fail);
            failures.push(Location {
                file: path.clone(),
                line,
                message: error.message.clone(),
            });
            errors_by_line.entry((path, line)).or_default().push(error);
        }

        let mut labels = FileLabels::new();
        let mut full_notifications = Vec::with_capacity(errors_by_line.len());
        for ((path, line), errors) in &errors_by_line {
            let text = errors
                .iter()
                .map(|error| first_line(&error.message))
                .unique()
                .join("; ");
            labels
                .entry(path.clone())
                .or_default()
                .insert(*line, LineLabel::error(text));

            let details: Vec<_> = errors
                .iter()
                .map(|error| self.notification_detail(outcome, error))
                .collect();
            full_notifications.push(FullNotification {
                file: path.clone(),
                line: *line,
                json: serde_json::to_string_pretty(&details)
                    .expect("notification details are always serializable"),
            });
        }

        // Logged values never hide errors; a later log on the same line replaces an earlier one.
        for log in &outcome.logs {
            let path = files.resolve(log.position.file)?;
            let line = log.position.line;
            let lines = labels.entry(path).or_default();
            let has_error = lines
                .get(&line)
                .is_some_and(|label| label.severity == Severity::Error);
            if !has_error {
                lines.insert(line, LineLabel::normal(first_line(&log.message)));
            }
        }

        Ok(RunResults {
            statuses,
            labels,
            failures,
            full_notifications,
            suite_failed: !outcome.stats.is_success(),
        })
    }

    // ---
    // Helper methods
    // ---

    fn notification_detail<'b>(
        &self,
        outcome: &'b RunOutcome,
        error: &'b ThrownError,
    ) -> NotificationDetail<'b> {
        let unit = outcome
            .record(error.unit)
            .map_or(SETUP_LABEL, |record| record.label.as_str());
        let original = match (&error.site, self.mapper) {
            (ErrorSite::Probe(position), Some(mapper)) if !position.is_sentinel() => {
                mapper.map_to_original(LineColumn::new(position.line, position.col))
            }
            _ => None,
        };

        NotificationDetail {
            message: &error.message,
            actual: error.actual.as_ref(),
            expected: error.expected.as_ref(),
            unit,
            unit_index: error.unit.as_i64(),
            original,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct NotificationDetail<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<&'a Value>,
    unit: &'a str,
    unit_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    original: Option<OriginalPosition>,
}

struct FileResolver<'a> {
    files: &'a BTreeMap<FileHandle, Utf8PathBuf>,
    project_root: &'a Utf8Path,
    entry_point: &'a Utf8Path,
}

impl FileResolver<'_> {
    fn resolve(&self, handle: FileHandle) -> Result<Utf8PathBuf, AggregateError> {
        self.files
            .get(&handle)
            .map(|name| absolutize(self.project_root, name))
            .ok_or(AggregateError::UnregisteredFile { handle })
    }

    fn resolve_site(&self, site: &ErrorSite) -> Result<(Utf8PathBuf, u32), AggregateError> {
        match site {
            ErrorSite::Probe(position) if position.is_sentinel() => {
                // The sentinel has line 0, which no editor can show.
                let name = self
                    .files
                    .get(&position.file)
                    .map_or(self.entry_point, |name| name.as_path());
                Ok((absolutize(self.project_root, name), 1))
            }
            ErrorSite::Probe(position) => Ok((self.resolve(position.file)?, position.line)),
            ErrorSite::Compiler(location) => Ok((
                absolutize(self.project_root, &location.file),
                location.line.max(1),
            )),
        }
    }
}

fn merge_lines(
    statuses: &mut FileStatuses,
    path: Utf8PathBuf,
    lines: RangeInclusive<u32>,
    status: LineStatus,
) {
    let file = statuses.entry(path).or_default();
    for line in lines {
        let current = file.entry(line).or_insert(status);
        *current = (*current).max(status);
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
