// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The result of a single build, as produced by the bundler.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildOutput {
    /// The instrumented code.
    pub output_code: String,

    /// The source map for `output_code`, as JSON, if one was generated.
    #[serde(default)]
    pub source_map: Option<String>,

    /// Errors reported by the compiler. A non-empty list means no code is executed.
    #[serde(default)]
    pub errors: Vec<CompileError>,

    /// The entry point the build started from.
    pub entry_point: Utf8PathBuf,
}

impl BuildOutput {
    /// Returns true if the compiler reported errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// An error reported by the compiler.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct CompileError {
    /// The file the error was reported in.
    pub file: Utf8PathBuf,

    /// The line the error was reported at (1-based).
    pub line: u32,

    /// The column the error was reported at.
    pub column: u32,

    /// The compiler's message.
    pub message: String,
}

impl CompileError {
    /// Returns the location this error was reported at.
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
        }
    }
}

/// A location in a source file, as reported by the compiler or the module loader rather than by a
/// probe.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct SourceLocation {
    /// The file, either absolute or relative to the project root.
    pub file: Utf8PathBuf,

    /// The line (1-based).
    pub line: u32,

    /// The column.
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
