// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use kiwi_metadata::BuildOutput;
use kiwi_runner::{
    config::KiwiConfig,
    editor::{CommandSink, KakouneEditor},
    errors::EditorError,
    failure::Failure,
    loader::LoadContext,
    probe::Probe,
    session::Session,
};
use std::sync::Once;

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = color_eyre::install();
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Records every command instead of delivering it.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub(crate) commands: Vec<String>,
}

impl CommandSink for RecordingSink {
    fn send_all(&mut self, command: &str) -> Result<(), EditorError> {
        self.commands.push(command.to_owned());
        Ok(())
    }
}

pub(crate) type TestSession = Session<KakouneEditor<RecordingSink>>;

/// Creates a session rooted at `project_root`, reading `.config/kiwi.toml` if it exists.
///
/// Editor files go to `<project_root>/editor` unless the config says otherwise.
pub(crate) fn make_session(project_root: &Utf8Path) -> color_eyre::Result<TestSession> {
    let config = KiwiConfig::from_sources(project_root, None)?;
    let mut editor_config = config.editor().clone();
    if !editor_config.temp_dir.starts_with(project_root) {
        editor_config.temp_dir = project_root.join("editor");
    }

    let mut editor = KakouneEditor::new(RecordingSink::default(), &editor_config);
    editor.init()?;
    Ok(Session::new(config, editor)?)
}

pub(crate) fn project() -> Utf8TempDir {
    Utf8TempDir::new().expect("created temp dir")
}

pub(crate) fn build(entry_point: &str) -> BuildOutput {
    BuildOutput {
        output_code: "// instrumented".to_owned(),
        source_map: None,
        errors: Vec::new(),
        entry_point: entry_point.into(),
    }
}

/// A module that imports `src/math.ts` (handle 0) and registers tests from `src/math.test.ts`
/// (handle 1).
///
/// `math.ts` has instrumentable lines 5 to 8. The passing test runs lines 5 and 6, and the failing
/// test runs lines 6 and 7 before failing in the test file.
pub(crate) fn math_suite(_code: &str, cx: &mut LoadContext<'_>) -> Result<(), Failure> {
    let probe = cx.probe().clone();
    probe.register_file("src/math.ts", 0);
    probe.register_file("src/math.test.ts", 1);
    probe.register_catalog(0, [(5, 1, 5, 20), (6, 1, 6, 20), (7, 1, 7, 20), (8, 1, 8, 20)]);
    probe.register_catalog(1, [(3, 1, 3, 40), (7, 1, 7, 40)]);

    let p = probe.clone();
    cx.registry().it("adds", move || async move {
        let sum = call_math(&p, &[5, 6]);
        let pos = p.before(3, 5, 1);
        p.log(pos, format!("sum = {sum}"));
        p.after(pos, kiwi_runner::failure::assert_equal(&sum, &11))
    });

    let p = probe;
    cx.registry().it("subtracts", move || async move {
        let difference = call_math(&p, &[6, 7]);
        let _pending = p.before(7, 5, 1);
        kiwi_runner::failure::assert_equal(&difference, &1)
    });

    Ok(())
}

fn call_math(probe: &Probe, lines: &[u32]) -> u32 {
    lines
        .iter()
        .map(|&line| {
            let pos = probe.before(line, 1, 0);
            probe.after(pos, line)
        })
        .sum()
}
