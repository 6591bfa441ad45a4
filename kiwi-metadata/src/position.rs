// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive};

/// A small integer handle identifying a file in probe payloads.
///
/// Handles keep probe calls cheap. The mapping from a handle to a path is established once per file
/// through a registration call made by the instrumented code.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct FileHandle(pub u32);

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A point in generated-code coordinates.
///
/// Lines are 1-based.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct Position {
    /// The file this position belongs to.
    pub file: FileHandle,

    /// The line number.
    pub line: u32,

    /// The column number.
    pub col: u32,
}

impl Position {
    /// The position that errors are charged to when nothing better is known.
    pub const SENTINEL: Self = Self::new(FileHandle(0), 0, 0);

    /// Creates a new position.
    pub const fn new(file: FileHandle, line: u32, col: u32) -> Self {
        Self { file, line, col }
    }

    /// Returns true if this is [`Self::SENTINEL`].
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// A covered span, such as a whole statement or block.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct PositionRange {
    /// The start of the span.
    pub start: Position,

    /// The last line of the span (inclusive).
    pub end_line: u32,

    /// The column the span ends at.
    pub end_col: u32,
}

impl PositionRange {
    /// Creates a new range starting at `start`.
    pub const fn new(start: Position, end_line: u32, end_col: u32) -> Self {
        Self {
            start,
            end_line,
            end_col,
        }
    }

    /// Returns the file this range belongs to.
    pub fn file(&self) -> FileHandle {
        self.start.file
    }

    /// Returns true if the range does not end before it starts.
    pub fn is_well_formed(&self) -> bool {
        (self.end_line, self.end_col) >= (self.start.line, self.start.col)
    }

    /// Returns the lines spanned by this range.
    ///
    /// Malformed ranges span only their start line.
    pub fn lines(&self) -> RangeInclusive<u32> {
        self.start.line..=self.end_line.max(self.start.line)
    }
}

/// A single entry in a trace: either an expression point or a statement span.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TraceEntry {
    /// An expression that finished evaluating.
    Point(Position),

    /// A statement or block that was entered.
    Range(PositionRange),
}

impl TraceEntry {
    /// Returns the file this entry belongs to.
    pub fn file(&self) -> FileHandle {
        self.start().file
    }

    /// Returns the position this entry starts at.
    pub fn start(&self) -> Position {
        match self {
            Self::Point(position) => *position,
            Self::Range(range) => range.start,
        }
    }

    /// Returns the lines covered by this entry.
    pub fn lines(&self) -> RangeInclusive<u32> {
        match self {
            Self::Point(position) => position.line..=position.line,
            Self::Range(range) => range.lines(),
        }
    }
}

impl From<Position> for TraceEntry {
    fn from(position: Position) -> Self {
        Self::Point(position)
    }
}

impl From<PositionRange> for TraceEntry {
    fn from(range: PositionRange) -> Self {
        Self::Range(range)
    }
}
