// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for kiwi-runner.

use camino::{Utf8Path, Utf8PathBuf};

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "file" if `count` is 1, otherwise "files".
    pub(crate) fn files_str(count: usize) -> &'static str {
        if count == 1 { "file" } else { "files" }
    }
}

/// Joins `path` onto `root` unless it is already absolute.
pub(crate) fn absolutize(root: &Utf8Path, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_owned()
    } else {
        root.join(path)
    }
}

/// Returns the system temporary directory, falling back to `/tmp` if it isn't valid UTF-8.
pub(crate) fn utf8_temp_dir() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
