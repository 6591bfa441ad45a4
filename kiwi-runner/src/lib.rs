// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core engine for kiwi, a live test runner that reports per-line coverage and failures to an
//! editor.
//!
//! The basic flow of a run is:
//!
//! 1. A bundler produces a [`BuildOutput`](kiwi_metadata::BuildOutput) with instrumented code.
//! 2. The [`TestRunner`](runner::TestRunner) loads the code through a
//!    [`ModuleLoader`](loader::ModuleLoader). The loaded code registers its files and tests, and
//!    calls [`Probe`](probe::Probe) entry points while it runs.
//! 3. Each failure is charged to source positions by the [`attribution`] module.
//! 4. The [`aggregate`] module folds every trace into per-line statuses and labels.
//! 5. The [`editor`] module renders those for the editor.
//!
//! [`Session`](session::Session) ties these steps together for one build.

pub mod aggregate;
pub mod attribution;
pub mod config;
pub mod editor;
pub mod errors;
pub mod failure;
mod helpers;
pub mod loader;
pub mod position;
pub mod probe;
pub mod registry;
pub mod runner;
pub mod session;
mod stopwatch;
