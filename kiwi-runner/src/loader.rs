// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The boundary between kiwi and whatever evaluates instrumented code.

use crate::{failure::Failure, position::OffsetIndex, probe::Probe, registry::TestRegistry};
use camino::Utf8Path;

/// Evaluates freshly built code.
///
/// Loading must fully re-run the module's top-level code: that is where the code registers its
/// files, catalogs and tests. Returning an error (or panicking) marks setup as failed, but tests
/// registered before the failure still run.
pub trait ModuleLoader {
    /// Loads `code`, registering its files and tests through `cx`.
    fn load(&mut self, code: &str, cx: &mut LoadContext<'_>) -> Result<(), Failure>;
}

impl<F> ModuleLoader for F
where
    F: FnMut(&str, &mut LoadContext<'_>) -> Result<(), Failure>,
{
    fn load(&mut self, code: &str, cx: &mut LoadContext<'_>) -> Result<(), Failure> {
        self(code, cx)
    }
}

/// Everything a [`ModuleLoader`] can use while loading.
#[derive(Debug)]
pub struct LoadContext<'a> {
    probe: &'a Probe,
    registry: &'a mut TestRegistry,
    offsets: &'a OffsetIndex,
    code_path: Option<&'a Utf8Path>,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(
        probe: &'a Probe,
        registry: &'a mut TestRegistry,
        offsets: &'a OffsetIndex,
        code_path: Option<&'a Utf8Path>,
    ) -> Self {
        Self {
            probe,
            registry,
            offsets,
            code_path,
        }
    }

    /// Returns the probe that loaded code reports execution through.
    ///
    /// Clone it into test closures that need it.
    pub fn probe(&self) -> &Probe {
        self.probe
    }

    /// Returns the registry tests are registered in.
    pub fn registry(&mut self) -> &mut TestRegistry {
        self.registry
    }

    /// Returns the offset index for the code being loaded.
    pub fn offsets(&self) -> &OffsetIndex {
        self.offsets
    }

    /// Returns the path the code was persisted to, if it was.
    pub fn code_path(&self) -> Option<&Utf8Path> {
        self.code_path
    }
}
