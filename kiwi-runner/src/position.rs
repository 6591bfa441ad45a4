// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolving raw offsets in generated code to line/column pairs, and those to original sources.
//!
//! Resolution happens once per covered position, which can number in the thousands per run, so
//! [`OffsetIndex::resolve`] is a binary search over a precomputed table.

use crate::errors::SourceMapParseError;
use serde::Serialize;
use sourcemap::SourceMap;
use std::fmt;

/// A line/column pair in generated code. Both are 1-based.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LineColumn {
    /// The line number.
    pub line: u32,

    /// The column number.
    pub col: u32,
}

impl LineColumn {
    /// Creates a new line/column pair.
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for LineColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A table of line start offsets for a piece of generated code.
///
/// Entry `i` is the offset of the first character of line `i + 1`, so the table always starts with
/// 0. Offsets are counted in `char`s, matching the offsets the instrumenter reports.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OffsetIndex {
    starts: Vec<usize>,
}

impl OffsetIndex {
    /// Builds the index for `source`.
    pub fn new(source: &str) -> Self {
        let mut starts = Vec::with_capacity(source.len() / 32 + 1);
        let mut acc = 0;
        for line in source.split('\n') {
            starts.push(acc);
            // The newline ending this line belongs to it.
            acc += line.chars().count() + 1;
        }

        Self { starts }
    }

    /// Returns the number of lines in the indexed source.
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Resolves a raw offset into a line and column.
    ///
    /// The line is the last one starting at or before `offset`, so an empty line owns its own start
    /// offset. Offsets past the end of the source resolve against the last line.
    pub fn resolve(&self, offset: usize) -> LineColumn {
        // `starts[0]` is 0, so the partition point is always at least 1.
        let index = self.starts.partition_point(|&start| start <= offset) - 1;
        let col = offset - self.starts[index] + 1;

        LineColumn {
            line: to_u32(index + 1),
            col: to_u32(col),
        }
    }

    /// Returns the offset of the first character of `line` (1-based), or `None` if the source has
    /// no such line.
    pub fn line_start(&self, line: u32) -> Option<usize> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.starts.get(index).copied()
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// A position in an original source file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OriginalPosition {
    /// The original source file, as named in the source map.
    pub source: String,

    /// The line in the original source (1-based).
    pub line: u32,

    /// The column in the original source (1-based).
    pub col: u32,

    /// The original name at this position, if the source map records one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Maps generated-code positions back to original sources through a source map.
///
/// Lookups are best-effort: positions outside every mapping produce `None` rather than an error.
pub struct OriginalMapper {
    map: SourceMap,
}

impl OriginalMapper {
    /// Parses a source map from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, SourceMapParseError> {
        let map = SourceMap::from_slice(json.as_bytes()).map_err(SourceMapParseError::new)?;
        Ok(Self { map })
    }

    /// Maps a generated line/column to its original position.
    pub fn map_to_original(&self, generated: LineColumn) -> Option<OriginalPosition> {
        // Source maps are 0-based.
        let token = self.map.lookup_token(
            generated.line.checked_sub(1)?,
            generated.col.saturating_sub(1),
        )?;
        // Tokens that don't point into a source carry no useful information.
        let source = token.get_source()?;

        Some(OriginalPosition {
            source: source.to_owned(),
            line: token.get_src_line() + 1,
            col: token.get_src_col() + 1,
            name: token.get_name().map(str::to_owned),
        })
    }
}

impl fmt::Debug for OriginalMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginalMapper")
            .field("sources", &self.map.get_source_count())
            .field("tokens", &self.map.get_token_count())
            .finish()
    }
}
