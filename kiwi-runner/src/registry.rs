// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration of tests by loaded code.
//!
//! A fresh [`TestRegistry`] is handed to the module loader on every run, so tests registered by a
//! previous build can never leak into the next one.

use crate::failure::Failure;
use futures::future::{FutureExt, LocalBoxFuture};
use std::{fmt, future::Future};
use tracing::debug;

/// The future a registered test evaluates to.
pub type TestFuture = LocalBoxFuture<'static, Result<(), Failure>>;

type TestFn = Box<dyn FnOnce() -> TestFuture>;

/// The set of tests registered while loading a module.
#[derive(Default)]
pub struct TestRegistry {
    tests: Vec<RegisteredTest>,
    disabled: usize,
}

impl TestRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a test.
    pub fn it<F, Fut>(&mut self, label: impl Into<String>, func: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), Failure>> + 'static,
    {
        self.push(label.into(), false, func);
    }

    /// Registers a focused test.
    ///
    /// If any test is focused, only focused tests are run.
    pub fn fit<F, Fut>(&mut self, label: impl Into<String>, func: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), Failure>> + 'static,
    {
        self.push(label.into(), true, func);
    }

    /// Declares a disabled test. Nothing is registered.
    pub fn xit<F, Fut>(&mut self, label: impl Into<String>, _func: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), Failure>> + 'static,
    {
        let label = label.into();
        debug!("skipping disabled test `{label}`");
        self.disabled += 1;
    }

    /// Returns the number of registered tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if no tests are registered.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Returns the number of tests declared through [`Self::xit`].
    pub fn disabled_count(&self) -> usize {
        self.disabled
    }

    /// Returns true if any registered test is focused.
    pub fn has_focused(&self) -> bool {
        self.tests.iter().any(|test| test.focused)
    }

    /// Iterates over registered tests in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTest> + '_ {
        self.tests.iter()
    }

    /// Consumes the registry, returning the tests that should run, in registration order.
    pub(crate) fn into_selected(self) -> Vec<RegisteredTest> {
        if self.has_focused() {
            self.tests.into_iter().filter(|test| test.focused).collect()
        } else {
            self.tests
        }
    }

    // ---
    // Helper methods
    // ---

    fn push<F, Fut>(&mut self, label: String, focused: bool, func: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), Failure>> + 'static,
    {
        self.tests.push(RegisteredTest {
            label,
            focused,
            // Calling `func` is deferred to the first poll, so that panics raised before the
            // test's first await are caught together with the rest of the test.
            func: Box::new(move || async move { func().await }.boxed_local()),
        });
    }
}

impl fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRegistry")
            .field("tests", &self.tests)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// A test registered through [`TestRegistry`].
pub struct RegisteredTest {
    label: String,
    focused: bool,
    func: TestFn,
}

impl RegisteredTest {
    /// Returns the label the test was registered with.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true if the test was registered with [`TestRegistry::fit`].
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Starts the test, returning its label and the future to await.
    pub(crate) fn start(self) -> (String, TestFuture) {
        (self.label, (self.func)())
    }
}

impl fmt::Debug for RegisteredTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTest")
            .field("label", &self.label)
            .field("focused", &self.focused)
            .finish_non_exhaustive()
    }
}
