// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by kiwi.

use camino::Utf8PathBuf;
use config::ConfigError;
use kiwi_metadata::{FileHandle, PositionRange};
use std::io;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse kiwi config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while parsing a source map.
#[derive(Debug, Error)]
#[error("failed to parse source map")]
pub struct SourceMapParseError {
    #[source]
    err: sourcemap::Error,
}

impl SourceMapParseError {
    pub(crate) fn new(err: sourcemap::Error) -> Self {
        Self { err }
    }
}

/// An error that occurred while writing instrumented code out before loading it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistCodeError {
    /// The directory to write to could not be created.
    #[error("failed to create directory `{dir}`")]
    CreateDir {
        /// The directory that could not be created.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// The code could not be written.
    #[error("failed to write instrumented code to `{path}`")]
    Write {
        /// The path that could not be written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: atomicwrites::Error<io::Error>,
    },
}

/// An error that aborted a test run.
///
/// Failures in the code under test never produce this error: they are recorded as data. This error
/// is only returned if the run itself could not be carried out.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The instrumented code could not be persisted.
    #[error("error persisting instrumented code")]
    PersistCode(#[from] PersistCodeError),

    /// Creating the Tokio runtime failed.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),
}

/// A defect in the data produced by a run, detected during aggregation.
///
/// Instrumented code is expected to register every file handle before using it, and to register
/// only well-formed spans. These errors indicate a bug in the instrumentation, not in the code under
/// test.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum AggregateError {
    /// A position referenced a file handle that was never registered.
    #[error("file handle {handle} was used but never registered")]
    UnregisteredFile {
        /// The handle that was not registered.
        handle: FileHandle,
    },

    /// A catalog span ends before it starts.
    #[error(
        "catalog span for file handle {handle} ends before it starts \
         (starts at {}:{}, ends at {}:{})",
        .span.start.line, .span.start.col, .span.end_line, .span.end_col,
    )]
    MalformedCatalogSpan {
        /// The file handle the span was registered for.
        handle: FileHandle,

        /// The malformed span.
        span: PositionRange,
    },
}

/// An error that occurred while talking to the editor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EditorError {
    /// Listing running editor sessions failed.
    #[error("failed to list running editor sessions")]
    ListSessions(#[source] io::Error),

    /// Sending a command to an editor session failed.
    #[error("failed to send command to editor session `{session}`")]
    SendCommand {
        /// The session the command was sent to.
        session: String,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A directory for editor data could not be created.
    #[error("failed to create directory `{dir}`")]
    CreateDir {
        /// The directory that could not be created.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A file read by the editor could not be written.
    #[error("failed to write `{path}`")]
    WriteFile {
        /// The path that could not be written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: atomicwrites::Error<io::Error>,
    },
}

/// An error that occurred while processing a build in a [`Session`](crate::session::Session).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The run could not be carried out.
    #[error("error running tests")]
    Run(#[from] RunError),

    /// The run produced inconsistent data.
    #[error("error aggregating run results")]
    Aggregate(#[from] AggregateError),

    /// Results could not be delivered to the editor.
    #[error("error publishing results to the editor")]
    Editor(#[from] EditorError),
}
