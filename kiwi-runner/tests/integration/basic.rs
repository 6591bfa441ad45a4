// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use kiwi_metadata::{CompileError, LineLabel, LineStatus, Location};
use kiwi_runner::{
    editor::format, failure::Failure, loader::LoadContext, session::FAILURES_LIST,
};
use maplit::btreemap;
use pretty_assertions::assert_eq;
use serde_json::Value;

#[test]
fn statuses_labels_and_failures() -> Result<()> {
    test_init();

    let project = project();
    let root = project.path();
    let mut session = make_session(root)?;
    let results = session.process(&build("src/math.test.ts"), &mut math_suite)?;

    let math = root.join("src/math.ts");
    let math_test = root.join("src/math.test.ts");
    assert_eq!(
        results.statuses,
        btreemap! {
            math.clone() => btreemap! {
                5 => LineStatus::Success,
                6 => LineStatus::Fail,
                7 => LineStatus::Fail,
                8 => LineStatus::Uncovered,
            },
            math_test.clone() => btreemap! {
                3 => LineStatus::Success,
                7 => LineStatus::Fail,
            },
        }
    );
    assert_eq!(
        results.labels,
        btreemap! {
            math.clone() => btreemap! {
                7 => LineLabel::error("expected 13 to equal 1"),
            },
            math_test.clone() => btreemap! {
                3 => LineLabel::normal("sum = 11"),
                7 => LineLabel::error("expected 13 to equal 1"),
            },
        }
    );
    // The failure is charged where the test was, and where it last was in the code under test.
    assert_eq!(
        results.failures,
        vec![
            Location {
                file: math_test.clone(),
                line: 7,
                message: "expected 13 to equal 1".to_owned(),
            },
            Location {
                file: math.clone(),
                line: 7,
                message: "expected 13 to equal 1".to_owned(),
            },
        ]
    );
    ensure!(results.suite_failed, "a failing test fails the suite");

    // init, statuses, notifications, failure list, full notifications.
    let commands = &session.editor().sink().commands;
    assert_eq!(commands.len(), 5);
    let editor_config = session.config().editor();
    assert_eq!(
        commands[1],
        format::line_statuses_command(&results.statuses, editor_config)
    );
    assert_eq!(
        commands[2],
        format::line_notifications_command(&results.labels, editor_config)
    );

    let temp_dir = root.join("editor");
    assert_eq!(
        std::fs::read_to_string(temp_dir.join(FAILURES_LIST))?,
        format!("{math_test}:7: expected 13 to equal 1\n{math}:7: expected 13 to equal 1"),
    );

    let payload = std::fs::read_to_string(format::notification_path(&temp_dir, &math, 7))?;
    let details: Value = serde_json::from_str(&payload)?;
    assert_eq!(
        details,
        serde_json::json!([{
            "message": "expected 13 to equal 1",
            "actual": 13,
            "expected": 1,
            "unit": "subtracts",
            "unit-index": 1
        }])
    );

    Ok(())
}

#[test]
fn stale_files_are_cleared() -> Result<()> {
    test_init();

    let project = project();
    let root = project.path();
    let mut session = make_session(root)?;
    session.process(&build("src/math.test.ts"), &mut math_suite)?;

    let mut other_suite = |_code: &str, cx: &mut LoadContext<'_>| -> Result<(), Failure> {
        let probe = cx.probe().clone();
        probe.register_file("src/other.ts", 0);
        cx.registry().it("passes", move || async move {
            let pos = probe.before(1, 1, 0);
            Ok(probe.after(pos, ()))
        });
        Ok(())
    };
    let results = session.process(&build("src/other.ts"), &mut other_suite)?;

    assert_eq!(
        results.statuses,
        btreemap! { root.join("src/other.ts") => btreemap! { 1 => LineStatus::Success } }
    );
    ensure!(!results.suite_failed, "the second build has no failures");

    let commands = &session.editor().sink().commands;
    let statuses = &commands[commands.len() - 4];
    for file in ["src/math.ts", "src/math.test.ts"] {
        let cleared = format!(
            "try %{{ set-option \"buffer={}\" kiwi_line_statuses %val{{timestamp}} }}",
            root.join(file)
        );
        ensure!(
            statuses.contains(&cleared),
            "statuses for {file} are cleared:\n{statuses}"
        );
    }

    // The list is rewritten even when it's empty.
    assert_eq!(
        std::fs::read_to_string(root.join("editor").join(FAILURES_LIST))?,
        ""
    );
    Ok(())
}

#[test]
fn compile_errors_abort_the_run() -> Result<()> {
    test_init();

    let project = project();
    let root = project.path();
    let mut session = make_session(root)?;

    let mut build = build("src/math.test.ts");
    build.errors.push(CompileError {
        file: "src/math.ts".into(),
        line: 2,
        column: 14,
        message: "Unexpected token".to_owned(),
    });
    let results = session.process(&build, &mut math_suite)?;

    let math = root.join("src/math.ts");
    assert_eq!(
        results.statuses,
        btreemap! { math.clone() => btreemap! { 2 => LineStatus::Fail } }
    );
    assert_eq!(
        results.labels,
        btreemap! { math.clone() => btreemap! { 2 => LineLabel::error("Unexpected token") } }
    );
    assert_eq!(results.failures.len(), 1);
    ensure!(results.suite_failed, "compile errors fail the suite");
    Ok(())
}

#[test]
fn aborted_run_keeps_previous_results() -> Result<()> {
    test_init();

    let project = project();
    let root = project.path();
    let mut session = make_session(root)?;
    session.process(&build("src/math.test.ts"), &mut math_suite)?;

    let mut broken = build("src/math.test.ts");
    broken.errors.push(CompileError {
        file: "src/math.ts".into(),
        line: 2,
        column: 14,
        message: "Unexpected token".to_owned(),
    });
    let results = session.process(&broken, &mut math_suite)?;

    // Only math.ts is sent, and math.test.ts isn't cleared.
    let editor_config = session.config().editor();
    let commands = &session.editor().sink().commands;
    assert_eq!(
        commands[commands.len() - 4],
        format::line_statuses_command(&results.statuses, editor_config)
    );
    assert_eq!(
        commands[commands.len() - 3],
        format::line_notifications_command(&results.labels, editor_config)
    );
    let math_test = root.join("src/math.test.ts");
    for command in &commands[commands.len() - 4..commands.len() - 2] {
        ensure!(
            !command.contains(math_test.as_str()),
            "math.test.ts is left alone:\n{command}"
        );
    }

    // The next finished run still clears both files.
    let mut empty_suite =
        |_code: &str, _cx: &mut LoadContext<'_>| -> Result<(), Failure> { Ok(()) };
    session.process(&build("src/other.ts"), &mut empty_suite)?;
    let commands = &session.editor().sink().commands;
    let statuses = &commands[commands.len() - 4];
    for file in ["src/math.ts", "src/math.test.ts"] {
        let cleared = format!(
            "try %{{ set-option \"buffer={}\" kiwi_line_statuses %val{{timestamp}} }}",
            root.join(file)
        );
        ensure!(
            statuses.contains(&cleared),
            "statuses for {file} are cleared:\n{statuses}"
        );
    }
    Ok(())
}

#[test]
fn configured_persist_dir() -> Result<()> {
    test_init();

    let project = project();
    let root = project.path();
    std::fs::create_dir_all(root.join(".config"))?;
    std::fs::write(
        root.join(".config/kiwi.toml"),
        indoc! {r#"
            [runner]
            persist-dir = "target/kiwi"

            [editor]
            max-notification-length = 12
        "#},
    )?;
    let mut session = make_session(root)?;
    assert_eq!(session.config().editor().max_notification_length, 12);

    let mut loaded_from = None;
    let mut loader = |code: &str, cx: &mut LoadContext<'_>| -> Result<(), Failure> {
        let path = cx.code_path().ok_or("code wasn't persisted")?;
        let on_disk = std::fs::read_to_string(path).map_err(|error| error.to_string())?;
        kiwi_runner::failure::assert_equal(on_disk.as_str(), code)?;
        loaded_from = Some(path.to_owned());
        Ok(())
    };
    let results = session.process(&build("src/index.ts"), &mut loader)?;

    assert_eq!(loaded_from, Some(root.join("target/kiwi/index.kiwi.js")));
    ensure!(!results.suite_failed, "setup succeeded: {:?}", results.failures);
    Ok(())
}

#[test]
fn full_notifications_include_original_positions() -> Result<()> {
    test_init();

    let project = project();
    let root = project.path();
    let mut session = make_session(root)?;

    let mut build = build("src/a.ts");
    build.source_map = Some(
        r#"{
            "version": 3,
            "sources": ["src/a.ts", "src/b.ts"],
            "names": ["add"],
            "mappings": "AAAA;IACEA,QCCE"
        }"#
        .to_owned(),
    );
    let mut loader = |_code: &str, cx: &mut LoadContext<'_>| -> Result<(), Failure> {
        let probe = cx.probe().clone();
        probe.register_file("src/a.ts", 0);
        cx.registry().it("adds", move || async move {
            let _pending = probe.before(2, 5, 0);
            Err(Failure::from("add is not a function"))
        });
        Ok(())
    };
    session.process(&build, &mut loader)?;

    let temp_dir = root.join("editor");
    let payload =
        std::fs::read_to_string(format::notification_path(&temp_dir, &root.join("src/a.ts"), 2))?;
    let details: Value = serde_json::from_str(&payload)?;
    assert_eq!(
        details[0]["original"],
        serde_json::json!({ "source": "src/a.ts", "line": 2, "col": 3, "name": "add" })
    );
    Ok(())
}
