// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`]. A run goes through these states:
//!
//! * [`RunState::Load`]: the instrumented code is optionally persisted and handed to the module
//!   loader, with a fresh registry and recorder.
//! * [`RunState::Setup`]: loading runs the module's top-level code. This is traced like a test, as
//!   [`UnitIndex::Setup`].
//! * [`RunState::RunTests`]: registered tests run one at a time, in registration order.
//! * [`RunState::Done`]: everything recorded is returned as a [`RunOutcome`].
//!
//! If the build reported errors, no code runs and the run goes straight to [`RunState::Abort`].

use crate::{
    attribution::{ErrorSite, ThrownError, attribute},
    errors::{PersistCodeError, RunError},
    failure::Failure,
    helpers::plural,
    loader::{LoadContext, ModuleLoader},
    position::OffsetIndex,
    probe::{Probe, ProbeLog, Recorder},
    registry::TestRegistry,
    stopwatch::StopwatchStart,
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use futures::FutureExt;
use kiwi_metadata::{BuildOutput, FileHandle, PositionRange, TraceEntry};
use std::{
    collections::BTreeMap,
    fmt,
    io::Write,
    panic::{self, AssertUnwindSafe},
    time::{Duration, SystemTime},
};
use tokio::runtime::Runtime;
use tracing::{debug, info, instrument, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    persist_dir: Option<Utf8PathBuf>,
}

impl TestRunnerBuilder {
    /// Sets the directory instrumented code is written to before it is loaded.
    ///
    /// By default, code is not written out.
    pub fn set_persist_dir(&mut self, persist_dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.persist_dir = Some(persist_dir.into());
        self
    }

    /// Creates a new test runner.
    pub fn build(self) -> Result<TestRunner, RunError> {
        // Tests are not `Send`, so they're driven on the current thread.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(RunError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            persist_dir: self.persist_dir,
            runtime,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    persist_dir: Option<Utf8PathBuf>,
    runtime: Runtime,
}

impl TestRunner {
    /// Loads the code in `build` through `loader` and runs the tests it registers.
    ///
    /// The callback is called as the run progresses. Failures in the code under test are recorded
    /// in the returned [`RunOutcome`]; an error is only returned if the run could not be carried
    /// out.
    pub fn execute<L, F>(
        &self,
        build: &BuildOutput,
        loader: &mut L,
        mut callback: F,
    ) -> Result<RunOutcome, RunError>
    where
        L: ModuleLoader + ?Sized,
        F: FnMut(RunEvent<'_>),
    {
        self.runtime.block_on(self.execute_inner(build, loader, &mut callback))
    }

    #[instrument(level = "debug", skip_all, fields(entry_point = %build.entry_point))]
    async fn execute_inner<L, F>(
        &self,
        build: &BuildOutput,
        loader: &mut L,
        callback: &mut F,
    ) -> Result<RunOutcome, RunError>
    where
        L: ModuleLoader + ?Sized,
        F: FnMut(RunEvent<'_>),
    {
        let stopwatch = StopwatchStart::now();
        callback(RunEvent::RunStarted {
            entry_point: &build.entry_point,
        });

        let outcome = if build.has_errors() {
            abort(build)
        } else {
            self.run_loaded(build, loader, callback).await?
        };

        let end = stopwatch.end();
        info!(
            "ran {} {} in {:.3?}: {} passed, {} failed{}",
            outcome.stats.finished_count,
            plural::tests_str(outcome.stats.finished_count),
            end.duration,
            outcome.stats.passed,
            outcome.stats.failed,
            if outcome.stats.setup_failed {
                " (setup failed)"
            } else {
                ""
            },
        );
        callback(RunEvent::RunFinished {
            state: outcome.state,
            stats: outcome.stats,
            start_time: end.start_time,
            elapsed: end.duration,
        });

        Ok(outcome)
    }

    async fn run_loaded<L, F>(
        &self,
        build: &BuildOutput,
        loader: &mut L,
        callback: &mut F,
    ) -> Result<RunOutcome, RunError>
    where
        L: ModuleLoader + ?Sized,
        F: FnMut(RunEvent<'_>),
    {
        debug!(state = %RunState::Load, "entering state");
        let code_path = match &self.persist_dir {
            Some(dir) => Some(persist_code(dir, build)?),
            None => None,
        };
        let offsets = OffsetIndex::new(&build.output_code);
        let recorder = Recorder::new();
        let probe = Probe::new(recorder.clone());
        let mut registry = TestRegistry::new();

        let mut stats = RunStats::default();
        let mut records = Vec::new();
        let mut errors = Vec::new();

        debug!(state = %RunState::Setup, "entering state");
        let stopwatch = StopwatchStart::now();
        let depth = recorder.pending_depth();
        let result = {
            let mut cx = LoadContext::new(&probe, &mut registry, &offsets, code_path.as_deref());
            panic::catch_unwind(AssertUnwindSafe(|| loader.load(&build.output_code, &mut cx)))
                .unwrap_or_else(|payload| Err(Failure::from_panic(payload)))
        };
        let first_error = errors.len();
        let setup = finish_unit(
            &recorder,
            UnitIndex::Setup,
            SETUP_LABEL.to_owned(),
            depth,
            result,
            stopwatch,
            &mut errors,
        );
        stats.setup_failed = setup.failed;

        let tests = registry.into_selected();
        stats.initial_run_count = tests.len();
        callback(RunEvent::SetupFinished {
            record: &setup,
            errors: &errors[first_error..],
            test_count: tests.len(),
        });
        records.push(setup);

        debug!(
            state = %RunState::RunTests,
            "entering state with {} {}",
            tests.len(),
            plural::tests_str(tests.len()),
        );
        for (index, test) in tests.into_iter().enumerate() {
            callback(RunEvent::TestStarted {
                index,
                label: test.label(),
            });

            // The trace belongs to exactly one unit at a time.
            recorder.reset_trace();
            let depth = recorder.pending_depth();
            let stopwatch = StopwatchStart::now();

            let (label, future) = test.start();
            let result = AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(Failure::from_panic(payload)));

            let first_error = errors.len();
            let record = finish_unit(
                &recorder,
                UnitIndex::Test(index),
                label,
                depth,
                result,
                stopwatch,
                &mut errors,
            );
            stats.on_test_finished(&record);
            callback(RunEvent::TestFinished {
                record: &record,
                errors: &errors[first_error..],
            });
            records.push(record);
        }

        debug!(state = %RunState::Done, "entering state");
        Ok(RunOutcome {
            state: RunState::Done,
            records,
            errors,
            files: recorder.take_files(),
            catalog: recorder.take_catalog(),
            logs: recorder.take_logs(),
            stats,
            code_path,
        })
    }
}

/// The label of the setup unit.
pub const SETUP_LABEL: &str = "(setup)";

fn abort(build: &BuildOutput) -> RunOutcome {
    debug!(state = %RunState::Abort, "entering state");

    let errors: Vec<_> = build
        .errors
        .first()
        .map(|first| {
            warn!(
                "build reported {} error(s), not running tests (first: {}: {})",
                build.errors.len(),
                first.location(),
                first.message,
            );
            ThrownError {
                message: first.message.clone(),
                actual: None,
                expected: None,
                site: ErrorSite::Compiler(first.location()),
                unit: UnitIndex::Setup,
            }
        })
        .into_iter()
        .collect();

    RunOutcome {
        state: RunState::Abort,
        records: Vec::new(),
        errors,
        files: BTreeMap::new(),
        catalog: BTreeMap::new(),
        logs: Vec::new(),
        stats: RunStats {
            setup_failed: true,
            ..RunStats::default()
        },
        code_path: None,
    }
}

/// Closes out a unit: takes its trace and, if it failed, charges the failure and discards the
/// pending positions the unit abandoned.
fn finish_unit(
    recorder: &Recorder,
    index: UnitIndex,
    label: String,
    depth: usize,
    result: Result<(), Failure>,
    stopwatch: StopwatchStart,
    errors: &mut Vec<ThrownError>,
) -> TestRecord {
    // Read before anything else can touch the recorder.
    let pending = recorder.last_pending();
    let trace = recorder.take_trace();
    let end = stopwatch.end();

    let failed = match result {
        Ok(()) => false,
        Err(failure) => {
            debug!("{index} `{label}` failed: {}", failure.summary());
            errors.extend(attribute(&failure, index, pending, &trace));
            recorder.truncate_pending(depth);
            true
        }
    };

    TestRecord {
        index,
        label,
        trace,
        failed,
        start_time: end.start_time,
        duration: end.duration,
    }
}

fn persist_code(dir: &Utf8Path, build: &BuildOutput) -> Result<Utf8PathBuf, PersistCodeError> {
    std::fs::create_dir_all(dir).map_err(|err| PersistCodeError::CreateDir {
        dir: dir.to_owned(),
        err,
    })?;

    let stem = build.entry_point.file_stem().unwrap_or("bundle");
    let path = dir.join(format!("{stem}.kiwi.js"));
    AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(build.output_code.as_bytes()))
        .map_err(|err| PersistCodeError::Write {
            path: path.clone(),
            err,
        })?;

    debug!("persisted instrumented code to `{path}`");
    Ok(path)
}

/// The state a run is in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    /// Code is being prepared for loading.
    Load,

    /// The module's top-level code is running.
    Setup,

    /// Registered tests are running.
    RunTests,

    /// The run finished normally.
    Done,

    /// The build reported errors, so no code was run.
    Abort,
}

impl RunState {
    /// Returns a string representation of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Setup => "setup",
            Self::RunTests => "run-tests",
            Self::Done => "done",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies an execution unit: the module's top-level code, or a test.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum UnitIndex {
    /// The module's top-level code.
    Setup,

    /// A test, by its position among the tests that ran.
    Test(usize),
}

impl UnitIndex {
    /// Returns the index as reported to collaborators: -1 for setup.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Setup => -1,
            Self::Test(index) => i64::try_from(index).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for UnitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Test(index) => write!(f, "test {index}"),
        }
    }
}

/// The result of running a single unit.
#[derive(Clone, Debug)]
pub struct TestRecord {
    /// The unit this record is for.
    pub index: UnitIndex,

    /// The test's label, or [`SETUP_LABEL`].
    pub label: String,

    /// Everything the unit executed, in order.
    pub trace: Vec<TraceEntry>,

    /// Whether the unit failed.
    pub failed: bool,

    /// When the unit started.
    pub start_time: SystemTime,

    /// How long the unit took.
    pub duration: Duration,
}

/// Everything recorded during a run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The state the run ended in: [`RunState::Done`] or [`RunState::Abort`].
    pub state: RunState,

    /// One record per unit that ran, setup first.
    pub records: Vec<TestRecord>,

    /// Every error charged during the run.
    pub errors: Vec<ThrownError>,

    /// Registered file paths, by handle.
    pub files: BTreeMap<FileHandle, Utf8PathBuf>,

    /// Registered instrumentable spans, by handle.
    pub catalog: BTreeMap<FileHandle, Vec<PositionRange>>,

    /// Values logged through probes.
    pub logs: Vec<ProbeLog>,

    /// Summary statistics.
    pub stats: RunStats,

    /// Where the instrumented code was persisted, if it was.
    pub code_path: Option<Utf8PathBuf>,
}

impl RunOutcome {
    /// Returns the record for `unit`, if it ran.
    pub fn record(&self, unit: UnitIndex) -> Option<&TestRecord> {
        self.records.iter().find(|record| record.index == unit)
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of tests selected to run after setup.
    pub initial_run_count: usize,

    /// The number of tests that finished running.
    pub finished_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// Whether the module's top-level code failed, or the build reported errors.
    pub setup_failed: bool,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is considered a failure if any of the following are true:
    /// * fewer tests finished than were selected
    /// * any test failed
    /// * setup failed and no tests ran
    pub fn is_success(&self) -> bool {
        if self.initial_run_count > self.finished_count {
            return false;
        }
        if self.any_failed() {
            return false;
        }
        true
    }

    /// Returns true if any test failed, or if setup failed without any tests running.
    #[inline]
    pub fn any_failed(&self) -> bool {
        self.failed > 0 || (self.setup_failed && self.finished_count == 0)
    }

    fn on_test_finished(&mut self, record: &TestRecord) {
        self.finished_count += 1;
        if record.failed {
            self.failed += 1;
        } else {
            self.passed += 1;
        }
    }
}

/// An event that occurs during a run.
#[derive(Debug)]
#[non_exhaustive]
pub enum RunEvent<'a> {
    /// The run started.
    RunStarted {
        /// The build's entry point.
        entry_point: &'a Utf8Path,
    },

    /// The module's top-level code finished running.
    SetupFinished {
        /// The setup record.
        record: &'a TestRecord,

        /// Errors charged to setup.
        errors: &'a [ThrownError],

        /// The number of tests selected to run.
        test_count: usize,
    },

    /// A test started.
    TestStarted {
        /// The test's index among the tests that run.
        index: usize,

        /// The test's label.
        label: &'a str,
    },

    /// A test finished.
    TestFinished {
        /// The test's record.
        record: &'a TestRecord,

        /// Errors charged to the test.
        errors: &'a [ThrownError],
    },

    /// The run finished.
    RunFinished {
        /// The state the run ended in.
        state: RunState,

        /// Statistics for the run.
        stats: RunStats,

        /// When the run started.
        start_time: SystemTime,

        /// How long the run took.
        elapsed: Duration,
    },
}
