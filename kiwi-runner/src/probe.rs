// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The surface instrumented code calls into while it runs.
//!
//! Instrumented code receives a [`Probe`] through the
//! [`LoadContext`](crate::loader::LoadContext) and calls it around every expression and block it
//! evaluates. Probes forward to a [`ProbeSink`]; during a run, that sink is a run-scoped recorder
//! that the runner reads traces and pending positions from.

use camino::{Utf8Path, Utf8PathBuf};
use kiwi_metadata::{FileHandle, Position, PositionRange, TraceEntry};
use std::{
    cell::RefCell,
    collections::{BTreeMap, btree_map::Entry},
    fmt,
    rc::Rc,
};
use tracing::warn;

/// Receives probe calls.
///
/// All methods take `&self`: sinks are shared between the runner and every clone of a [`Probe`], and
/// are expected to use interior mutability. Calls are never made concurrently.
pub trait ProbeSink {
    /// Records the path for a file handle.
    fn register_file(&self, handle: FileHandle, name: &Utf8Path);

    /// Records the instrumentable spans of a file.
    fn register_catalog(&self, handle: FileHandle, spans: Vec<PositionRange>);

    /// An expression started evaluating.
    fn begin(&self, position: Position);

    /// An expression finished evaluating.
    fn complete(&self, position: Position);

    /// A statement or block was entered.
    fn block(&self, range: PositionRange);

    /// A value was logged.
    fn log(&self, position: Position, message: String);
}

/// A cheaply cloneable handle that instrumented code reports execution through.
///
/// File handles are passed as raw integers, matching how instrumented code refers to them.
#[derive(Clone)]
pub struct Probe {
    sink: Rc<dyn ProbeSink>,
}

impl Probe {
    /// Creates a probe that forwards to `sink`.
    pub fn new(sink: Rc<dyn ProbeSink>) -> Self {
        Self { sink }
    }

    /// Maps `handle` to the file at `name`.
    ///
    /// Must be called before any other probe call mentions `handle`.
    pub fn register_file(&self, name: impl AsRef<Utf8Path>, handle: u32) {
        self.sink.register_file(FileHandle(handle), name.as_ref());
    }

    /// Registers the spans of `handle` that can be covered, as `(line, col, end_line, end_col)`.
    pub fn register_catalog(
        &self,
        handle: u32,
        spans: impl IntoIterator<Item = (u32, u32, u32, u32)>,
    ) {
        let file = FileHandle(handle);
        let spans = spans
            .into_iter()
            .map(|(line, col, end_line, end_col)| {
                PositionRange::new(Position::new(file, line, col), end_line, end_col)
            })
            .collect();
        self.sink.register_catalog(file, spans);
    }

    /// Marks the start of an expression, returning the position to pass to [`Self::after`].
    pub fn before(&self, line: u32, col: u32, handle: u32) -> Position {
        let position = Position::new(FileHandle(handle), line, col);
        self.sink.begin(position);
        position
    }

    /// Marks the end of the expression started at `position`, passing `value` through unchanged.
    #[inline]
    pub fn after<T>(&self, position: Position, value: T) -> T {
        self.sink.complete(position);
        value
    }

    /// Marks a statement or block spanning from `line:col` to `end_line:end_col` as entered.
    pub fn block(&self, line: u32, col: u32, end_line: u32, end_col: u32, handle: u32) {
        let start = Position::new(FileHandle(handle), line, col);
        self.sink.block(PositionRange::new(start, end_line, end_col));
    }

    /// Attaches a logged value to `position`.
    pub fn log(&self, position: Position, message: impl Into<String>) {
        self.sink.log(position, message.into());
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe").finish_non_exhaustive()
    }
}

/// A value logged through [`Probe::log`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeLog {
    /// The position the value was logged at.
    pub position: Position,

    /// The logged text.
    pub message: String,
}

/// The [`ProbeSink`] used during a run.
///
/// One recorder is created per run and never reused.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    state: RefCell<RecorderState>,
}

#[derive(Debug, Default)]
struct RecorderState {
    files: BTreeMap<FileHandle, Utf8PathBuf>,
    catalog: BTreeMap<FileHandle, Vec<PositionRange>>,
    pending: Vec<Position>,
    trace: Vec<TraceEntry>,
    logs: Vec<ProbeLog>,
}

impl Recorder {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Discards the current trace, starting a new unit.
    pub(crate) fn reset_trace(&self) {
        self.state.borrow_mut().trace.clear();
    }

    pub(crate) fn take_trace(&self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.state.borrow_mut().trace)
    }

    /// Returns the innermost expression that has started but not finished.
    pub(crate) fn last_pending(&self) -> Option<Position> {
        self.state.borrow().pending.last().copied()
    }

    pub(crate) fn pending_depth(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Drops pending positions pushed after the stack was `depth` entries deep.
    pub(crate) fn truncate_pending(&self, depth: usize) {
        self.state.borrow_mut().pending.truncate(depth);
    }

    pub(crate) fn take_files(&self) -> BTreeMap<FileHandle, Utf8PathBuf> {
        std::mem::take(&mut self.state.borrow_mut().files)
    }

    pub(crate) fn take_catalog(&self) -> BTreeMap<FileHandle, Vec<PositionRange>> {
        std::mem::take(&mut self.state.borrow_mut().catalog)
    }

    pub(crate) fn take_logs(&self) -> Vec<ProbeLog> {
        std::mem::take(&mut self.state.borrow_mut().logs)
    }
}

impl ProbeSink for Recorder {
    fn register_file(&self, handle: FileHandle, name: &Utf8Path) {
        let mut state = self.state.borrow_mut();
        match state.files.entry(handle) {
            Entry::Vacant(entry) => {
                entry.insert(name.to_owned());
            }
            Entry::Occupied(entry) if entry.get().as_path() != name => {
                let existing = entry.get();
                warn!(
                    "file handle {handle} registered as `{name}`, but is already `{existing}` \
                     (keeping `{existing}`)"
                );
            }
            Entry::Occupied(_) => {}
        }
    }

    fn register_catalog(&self, handle: FileHandle, spans: Vec<PositionRange>) {
        let mut state = self.state.borrow_mut();
        let catalog = state.catalog.entry(handle).or_default();
        if !catalog.is_empty() {
            warn!("catalog for file handle {handle} registered more than once, extending it");
        }
        catalog.extend(spans);
    }

    fn begin(&self, position: Position) {
        self.state.borrow_mut().pending.push(position);
    }

    fn complete(&self, position: Position) {
        let mut state = self.state.borrow_mut();
        // Anything started after `position` was abandoned without completing (for example,
        // short-circuited by a caught error).
        if let Some(index) = state.pending.iter().rposition(|p| *p == position) {
            state.pending.truncate(index);
        }
        state.trace.push(TraceEntry::Point(position));
    }

    fn block(&self, range: PositionRange) {
        self.state.borrow_mut().trace.push(TraceEntry::Range(range));
    }

    fn log(&self, position: Position, message: String) {
        self.state
            .borrow_mut()
            .logs
            .push(ProbeLog { position, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recorder_probe() -> (Rc<Recorder>, Probe) {
        let recorder = Recorder::new();
        let probe = Probe::new(recorder.clone());
        (recorder, probe)
    }

    #[test]
    fn after_passes_value_through() {
        let (recorder, probe) = recorder_probe();

        let pos = probe.before(3, 5, 1);
        let value = probe.after(pos, vec!["a", "b"]);
        assert_eq!(value, vec!["a", "b"]);

        assert_eq!(recorder.last_pending(), None);
        assert_eq!(
            recorder.take_trace(),
            vec![TraceEntry::Point(Position::new(FileHandle(1), 3, 5))]
        );
    }

    #[test]
    fn nested_pending_positions() {
        let (recorder, probe) = recorder_probe();

        let outer = probe.before(1, 1, 0);
        let inner = probe.before(1, 9, 0);
        assert_eq!(recorder.last_pending(), Some(inner));
        assert_eq!(recorder.pending_depth(), 2);

        probe.after(inner, ());
        assert_eq!(recorder.last_pending(), Some(outer));

        // `abandoned` never completes; completing `outer` discards it too.
        let _abandoned = probe.before(1, 14, 0);
        probe.after(outer, ());
        assert_eq!(recorder.pending_depth(), 0);
    }

    #[test]
    fn completing_unknown_position_keeps_stack() {
        let (recorder, probe) = recorder_probe();

        let pending = probe.before(2, 1, 0);
        probe.after(Position::new(FileHandle(0), 9, 9), ());
        assert_eq!(recorder.last_pending(), Some(pending));
    }

    #[test]
    fn trace_reset_keeps_pending() {
        let (recorder, probe) = recorder_probe();

        let pending = probe.before(2, 1, 0);
        probe.block(1, 1, 4, 2, 0);
        recorder.reset_trace();

        assert_eq!(recorder.take_trace(), vec![]);
        assert_eq!(recorder.last_pending(), Some(pending));
    }

    #[test]
    fn registration() {
        let (recorder, probe) = recorder_probe();

        probe.register_file("src/a.ts", 0);
        probe.register_file("src/b.ts", 1);
        // Conflicting registrations keep the first mapping.
        probe.register_file("src/c.ts", 1);

        probe.register_catalog(0, [(1, 1, 2, 10), (4, 1, 4, 8)]);
        probe.register_catalog(0, [(6, 1, 6, 3)]);

        let files = recorder.take_files();
        assert_eq!(files[&FileHandle(0)], "src/a.ts");
        assert_eq!(files[&FileHandle(1)], "src/b.ts");

        let catalog = recorder.take_catalog();
        let lines: Vec<_> = catalog[&FileHandle(0)]
            .iter()
            .flat_map(|span| span.lines())
            .collect();
        assert_eq!(lines, vec![1, 2, 4, 6]);
    }

    #[test]
    fn logs_are_recorded() {
        let (recorder, probe) = recorder_probe();

        let pos = probe.before(7, 3, 0);
        probe.log(pos, "value: 42");

        assert_eq!(
            recorder.take_logs(),
            vec![ProbeLog {
                position: Position::new(FileHandle(0), 7, 3),
                message: "value: 42".to_owned(),
            }]
        );
    }

    // Probes can be backed by any sink.
    #[test]
    fn custom_sink() {
        #[derive(Default)]
        struct CountingSink {
            calls: RefCell<Vec<&'static str>>,
        }

        impl ProbeSink for CountingSink {
            fn register_file(&self, _handle: FileHandle, _name: &Utf8Path) {
                self.calls.borrow_mut().push("register_file");
            }
            fn register_catalog(&self, _handle: FileHandle, _spans: Vec<PositionRange>) {
                self.calls.borrow_mut().push("register_catalog");
            }
            fn begin(&self, _position: Position) {
                self.calls.borrow_mut().push("begin");
            }
            fn complete(&self, _position: Position) {
                self.calls.borrow_mut().push("complete");
            }
            fn block(&self, _range: PositionRange) {
                self.calls.borrow_mut().push("block");
            }
            fn log(&self, _position: Position, _message: String) {
                self.calls.borrow_mut().push("log");
            }
        }

        let sink = Rc::new(CountingSink::default());
        let probe = Probe::new(sink.clone());
        probe.register_file("a.ts", 0);
        probe.block(1, 1, 1, 5, 0);
        let pos = probe.before(1, 1, 0);
        probe.log(pos, "x");
        assert_eq!(probe.after(pos, 5), 5);

        assert_eq!(
            *sink.calls.borrow(),
            vec!["register_file", "block", "begin", "log", "complete"]
        );
    }
}
