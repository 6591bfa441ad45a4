// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One build, from running tests to updating the editor.

use crate::{
    aggregate::{Aggregator, RunResults},
    config::KiwiConfig,
    editor::{EditorInterface, PublishMode},
    errors::SessionError,
    helpers::plural,
    loader::ModuleLoader,
    position::OriginalMapper,
    runner::{RunEvent, RunState, TestRunner, TestRunnerBuilder},
};
use kiwi_metadata::BuildOutput;
use tracing::{debug, info, instrument, warn};

/// The name of the location list that failures are published to.
pub const FAILURES_LIST: &str = "failures";

/// Runs builds and publishes their results to an editor.
///
/// Each call to [`Session::process`] is independent: nothing recorded while running one build is
/// visible to the next. The editor keeps track of which files it has shown results for, so results
/// for files that are no longer part of a build are cleared. An aborted build only knows about the
/// files with compile errors, so it updates those and leaves every other file as it was.
#[derive(Debug)]
pub struct Session<E> {
    config: KiwiConfig,
    runner: TestRunner,
    editor: E,
}

impl<E: EditorInterface> Session<E> {
    /// Creates a session that publishes to `editor`.
    pub fn new(config: KiwiConfig, editor: E) -> Result<Self, SessionError> {
        let mut builder = TestRunnerBuilder::default();
        if let Some(dir) = &config.runner().persist_dir {
            builder.set_persist_dir(dir.clone());
        }
        let runner = builder.build()?;

        Ok(Self {
            config,
            runner,
            editor,
        })
    }

    /// Returns the configuration this session was created with.
    pub fn config(&self) -> &KiwiConfig {
        &self.config
    }

    /// Returns the editor results are published to.
    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Returns the editor results are published to, mutably.
    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    /// Runs the tests in `build` through `loader` and publishes the results.
    ///
    /// Failing tests are part of the returned results, not an error. An error is returned only if
    /// the run couldn't be carried out or the results couldn't be published.
    #[instrument(level = "debug", skip_all, fields(entry_point = %build.entry_point))]
    pub fn process<L>(
        &mut self,
        build: &BuildOutput,
        loader: &mut L,
    ) -> Result<RunResults, SessionError>
    where
        L: ModuleLoader + ?Sized,
    {
        let outcome = self.runner.execute(build, loader, log_event)?;

        let mapper = build.source_map.as_deref().and_then(|json| {
            OriginalMapper::from_json(json)
                .inspect_err(|error| {
                    warn!("ignoring source map for `{}`: {error}", build.entry_point);
                })
                .ok()
        });
        let mut aggregator = Aggregator::new(self.config.project_root(), &build.entry_point);
        if let Some(mapper) = &mapper {
            aggregator.set_mapper(mapper);
        }
        let results = aggregator.aggregate(&outcome)?;

        debug!(
            "publishing results for {} {} ({} failures)",
            results.statuses.len(),
            plural::files_str(results.statuses.len()),
            results.failures.len(),
        );
        let mode = match outcome.state {
            RunState::Abort => PublishMode::Overlay,
            _ => PublishMode::Replace,
        };
        self.editor.apply_line_statuses(&results.statuses, mode)?;
        self.editor.apply_line_notifications(&results.labels, mode)?;
        self.editor.list_command(FAILURES_LIST, &results.failures, true)?;
        self.editor
            .register_full_notifications(&results.full_notifications)?;

        Ok(results)
    }
}

fn log_event(event: RunEvent<'_>) {
    match event {
        RunEvent::SetupFinished {
            record, test_count, ..
        } => {
            if record.failed {
                warn!(
                    "setup failed, running {test_count} registered {}",
                    plural::tests_str(test_count)
                );
            }
        }
        RunEvent::TestFinished { record, errors } => {
            if record.failed {
                let message = errors.first().map_or("", |error| error.message.as_str());
                info!("FAIL `{}`: {message}", record.label);
            } else {
                debug!("PASS `{}` in {:.3?}", record.label, record.duration);
            }
        }
        _ => {}
    }
}
