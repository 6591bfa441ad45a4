// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publishing run results to an editor.
//!
//! [`EditorInterface`] is what the rest of kiwi talks to. [`KakouneEditor`] implements it for
//! Kakoune on top of a [`CommandSink`], normally [`KakSessions`].

pub mod format;
mod kakoune;

pub use kakoune::KakSessions;

use crate::{config::EditorConfig, errors::EditorError};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use kiwi_metadata::{FileLabels, FileStatuses, FullNotification, Location};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
};
use tracing::debug;

/// How line statuses and notifications replace what an editor already shows.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PublishMode {
    /// The published files are everything there is to show. Files shown before but missing now
    /// are cleared.
    Replace,

    /// The published files are updated, and every other file keeps what it showed before.
    ///
    /// Used for aborted runs, which only know about the files with compile errors.
    Overlay,
}

/// An editor that run results can be published to.
pub trait EditorInterface {
    /// Replaces the line statuses shown for every file in `files`.
    fn apply_line_statuses(
        &mut self,
        files: &FileStatuses,
        mode: PublishMode,
    ) -> Result<(), EditorError>;

    /// Replaces the inline notifications shown for every file in `files`.
    fn apply_line_notifications(
        &mut self,
        files: &FileLabels,
        mode: PublishMode,
    ) -> Result<(), EditorError>;

    /// Publishes a named location list.
    ///
    /// With `select_current_line`, opening the list selects the entries for the line the cursor is
    /// on.
    fn list_command(
        &mut self,
        name: &str,
        locations: &[Location],
        select_current_line: bool,
    ) -> Result<(), EditorError>;

    /// Makes full notifications available to open from their line.
    fn register_full_notifications(
        &mut self,
        notifications: &[FullNotification],
    ) -> Result<(), EditorError>;

    /// Moves the cursor to `line` in `file`.
    fn jump_to_line(&mut self, file: &Utf8Path, line: u32) -> Result<(), EditorError>;
}

/// A destination for editor commands.
///
/// Commands are passed pre-escaped for delivery inside a single-quoted string, as produced by the
/// [`format`] module.
pub trait CommandSink {
    /// Delivers `command` to every editor session.
    fn send_all(&mut self, command: &str) -> Result<(), EditorError>;
}

/// An [`EditorInterface`] for Kakoune.
#[derive(Debug)]
pub struct KakouneEditor<S> {
    sink: S,
    config: EditorConfig,
    status_files: BTreeSet<Utf8PathBuf>,
    notification_files: BTreeSet<Utf8PathBuf>,
}

impl<S: CommandSink> KakouneEditor<S> {
    /// Creates an editor that sends its commands to `sink`.
    pub fn new(sink: S, config: &EditorConfig) -> Self {
        Self {
            sink,
            config: config.clone(),
            status_files: BTreeSet::new(),
            notification_files: BTreeSet::new(),
        }
    }

    /// Creates the temporary directory and declares kiwi's options in every session.
    pub fn init(&mut self) -> Result<(), EditorError> {
        self.create_temp_dir()?;
        self.sink.send_all(&format::init_command())
    }

    /// Returns the sink commands are sent to.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    // ---
    // Helper methods
    // ---

    fn create_temp_dir(&self) -> Result<(), EditorError> {
        let dir = &self.config.temp_dir;
        std::fs::create_dir_all(dir).map_err(|err| EditorError::CreateDir {
            dir: dir.clone(),
            err,
        })
    }

    fn write_temp_file(&self, path: &Utf8Path, contents: &str) -> Result<(), EditorError> {
        self.create_temp_dir()?;
        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(contents.as_bytes()))
            .map_err(|err| EditorError::WriteFile {
                path: path.to_owned(),
                err,
            })
    }
}

impl<S: CommandSink> EditorInterface for KakouneEditor<S> {
    fn apply_line_statuses(
        &mut self,
        files: &FileStatuses,
        mode: PublishMode,
    ) -> Result<(), EditorError> {
        let files = track_published(files, &mut self.status_files, mode);
        debug!(file_count = files.len(), ?mode, "applying line statuses");
        self.sink
            .send_all(&format::line_statuses_command(&files, &self.config))
    }

    fn apply_line_notifications(
        &mut self,
        files: &FileLabels,
        mode: PublishMode,
    ) -> Result<(), EditorError> {
        let files = track_published(files, &mut self.notification_files, mode);
        debug!(file_count = files.len(), ?mode, "applying line notifications");
        self.sink
            .send_all(&format::line_notifications_command(&files, &self.config))
    }

    fn list_command(
        &mut self,
        name: &str,
        locations: &[Location],
        select_current_line: bool,
    ) -> Result<(), EditorError> {
        let list_path = self.config.temp_dir.join(name);
        self.write_temp_file(&list_path, &format::location_list_contents(locations))?;
        self.sink.send_all(&format::location_list_command(
            name,
            &list_path,
            locations,
            select_current_line,
        ))
    }

    fn register_full_notifications(
        &mut self,
        notifications: &[FullNotification],
    ) -> Result<(), EditorError> {
        for notification in notifications {
            let path = format::notification_path(
                &self.config.temp_dir,
                &notification.file,
                notification.line,
            );
            self.write_temp_file(&path, &notification.json)?;
        }
        self.sink.send_all(&format::full_notifications_command(
            &self.config.temp_dir,
            notifications,
        ))
    }

    fn jump_to_line(&mut self, file: &Utf8Path, line: u32) -> Result<(), EditorError> {
        self.sink.send_all(&format::jump_to_line_command(file, line))
    }
}

/// Returns the files to send for `files`, and records them in `published`.
///
/// With [`PublishMode::Replace`], every previously published file missing from `files` gets an
/// empty entry, which clears whatever the editor still shows for it, and `published` becomes the
/// files in `files`. With [`PublishMode::Overlay`], `files` is sent as is and its files are added
/// to `published`.
fn track_published<V: Clone + Default>(
    files: &BTreeMap<Utf8PathBuf, V>,
    published: &mut BTreeSet<Utf8PathBuf>,
    mode: PublishMode,
) -> BTreeMap<Utf8PathBuf, V> {
    match mode {
        PublishMode::Replace => {
            let mut out = files.clone();
            for file in published.iter() {
                out.entry(file.clone()).or_default();
            }
            *published = files.keys().cloned().collect();
            out
        }
        PublishMode::Overlay => {
            published.extend(files.keys().cloned());
            files.clone()
        }
    }
}
