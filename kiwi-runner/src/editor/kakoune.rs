// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::CommandSink;
use crate::{config::EditorConfig, errors::EditorError};
use duct::cmd;
use tracing::{debug, instrument, warn};

/// Delivers commands to running Kakoune sessions through `kak -p`.
#[derive(Clone, Debug)]
pub struct KakSessions {
    client: String,
}

impl KakSessions {
    /// Creates a sink that evaluates commands in `client`.
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
        }
    }

    /// Creates a sink for the client named in `config`.
    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.client.clone())
    }

    /// Returns the names of running sessions, as reported by `kak -l`.
    pub fn running(&self) -> Result<Vec<String>, EditorError> {
        let output = cmd("kak", ["-l"])
            .read()
            .map_err(EditorError::ListSessions)?;
        Ok(parse_session_list(&output))
    }

    /// Evaluates `command` in this sink's client of `session`.
    ///
    /// `command` must already be escaped for a single-quoted string.
    pub fn send(&self, session: &str, command: &str) -> Result<(), EditorError> {
        let payload = format!("eval -client {} '{command}'", self.client);
        cmd("kak", ["-p", session])
            .stdin_bytes(payload)
            .stdout_null()
            .run()
            .map_err(|err| EditorError::SendCommand {
                session: session.to_owned(),
                err,
            })?;
        Ok(())
    }
}

impl CommandSink for KakSessions {
    #[instrument(level = "debug", skip_all, fields(client = %self.client))]
    fn send_all(&mut self, command: &str) -> Result<(), EditorError> {
        let sessions = self.running()?;
        debug!(session_count = sessions.len(), "sending command to kakoune");

        // A session that exits between listing and sending shouldn't keep the others from
        // receiving the command.
        let mut first_error = None;
        for session in &sessions {
            if let Err(error) = self.send(session, command) {
                warn!("{error}");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Parses the output of `kak -l`, skipping sessions that are marked dead.
fn parse_session_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("(dead)"))
        .map(str::to_owned)
        .collect()
}
