// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured data exchanged between kiwi and its collaborators.
//!
//! Instrumented code reports [`Position`]s and [`PositionRange`]s while it runs; the bundler hands
//! kiwi a [`BuildOutput`]; and the runner hands the editor [`FileStatuses`] and [`FileLabels`].
//! All of these types are serializable so they can cross process boundaries as JSON.

mod build_output;
mod position;
mod status;

pub use build_output::*;
pub use position::*;
pub use status::*;
