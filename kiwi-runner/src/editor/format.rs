// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering results as Kakoune commands.
//!
//! Everything in this module is a pure function of its inputs. Commands are delivered to Kakoune
//! inside a single-quoted string, so every piece of text embedded in a command has its single quotes
//! doubled here.

use crate::config::{EditorColors, EditorConfig};
use camino::{Utf8Path, Utf8PathBuf};
use kiwi_metadata::{
    FileLabels, FileStatuses, FullNotification, LineLabel, LineStatus, Location, Severity,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use swrite::{SWrite, swrite, swriteln};

/// The line the invisible sentinel label is attached to.
///
/// Kakoune hides the notification column as soon as the last label in it disappears, for example
/// while the labelled line is being edited. A label on a line that doesn't exist keeps it visible.
pub const SENTINEL_LINE: i64 = -1;

/// The name of the scratch buffer full notifications are shown in.
pub const NOTIFICATION_BUFFER: &str = "*kiwi-notification*";

const STATUSES_HOOK_GROUP: &str = "kiwi-line-statuses-group";
const NOTIFICATIONS_HOOK_GROUP: &str = "kiwi-line-notifications-group";

/// Fits `text` into exactly `width` characters.
///
/// Longer texts keep their first `width - 3` characters followed by `" .."`; shorter texts are
/// padded with spaces.
pub fn fix_size(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len > width {
        let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
        out.push_str(" ..");
        out
    } else {
        let mut out = String::with_capacity(text.len() + width - len);
        out.push_str(text);
        out.extend(std::iter::repeat_n(' ', width - len));
        out
    }
}

/// Escapes text for use inside a `flag-lines` line spec.
pub fn escape_flag_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\"\""),
            '\'' => out.push_str("''"),
            '%' => out.push_str("%%"),
            '{' => out.push_str("\\{"),
            '|' => out.push_str("\\||"),
            c => out.push(c),
        }
    }
    out
}

/// Returns the command that declares kiwi's options and highlighters, if they don't exist yet.
pub fn init_command() -> String {
    let mut out = String::new();
    for option in ["kiwi_line_statuses", "kiwi_line_notifications"] {
        swriteln!(
            out,
            "eval %sh{{ [ -z \"$kak_opt_{option}\" ] && echo \"declare-option line-specs {option}; \
             add-highlighter global/ flag-lines Default {option}\" }}"
        );
    }
    out
}

/// Returns the command that sets line statuses for every file in `files`.
///
/// Files mapped to an empty set have their statuses cleared.
pub fn line_statuses_command(files: &FileStatuses, config: &EditorConfig) -> String {
    let mut out = String::new();
    swriteln!(out, "define-command -hidden -override kiwi_line_statuses %{{");
    swriteln!(
        out,
        "    declare-option str kiwi_status_chars {}",
        kak_quote(&config.status_chars)
    );
    for status in LineStatus::ALL {
        swriteln!(
            out,
            "    declare-option str kiwi_color_{status} {}",
            kak_quote(status_color(&config.colors, status)),
        );
    }
    for (file, lines) in files {
        swrite!(
            out,
            "    try %{{ set-option {} kiwi_line_statuses %val{{timestamp}}",
            kak_quote(&format!("buffer={file}")),
        );
        for (line, status) in lines {
            swrite!(
                out,
                " \"{line}|{{%opt{{kiwi_color_{status}}}}}%opt{{kiwi_status_chars}}\""
            );
        }
        swriteln!(out, " }}");
    }
    swriteln!(out, "}}");
    push_refresh_hooks(&mut out, "kiwi_line_statuses", STATUSES_HOOK_GROUP);
    out
}

/// Returns the command that sets inline notifications for every file in `files`.
///
/// Every file with at least one label also gets the sentinel label. Files mapped to an empty set
/// have their notifications cleared.
pub fn line_notifications_command(files: &FileLabels, config: &EditorConfig) -> String {
    let width = config.max_notification_length;
    let sentinel = LineLabel::normal(" ");

    let mut out = String::new();
    for severity in [Severity::Normal, Severity::Error] {
        swriteln!(
            out,
            "declare-option str kiwi_color_{}_notification {}",
            severity.as_str(),
            kak_quote(severity_color(&config.colors, severity)),
        );
    }
    swriteln!(out, "define-command -hidden -override kiwi_line_notifications %{{");
    for (file, lines) in files {
        swrite!(
            out,
            "    try %| set-option {} kiwi_line_notifications %val{{timestamp}}",
            kak_quote(&format!("buffer={file}")).replace('|', "||"),
        );
        for (line, label) in lines {
            swrite!(out, " {}", label_spec(i64::from(*line), label, width));
        }
        if !lines.is_empty() {
            swrite!(out, " {}", label_spec(SENTINEL_LINE, &sentinel, width));
        }
        swriteln!(out, " |");
    }
    swriteln!(out, "}}");
    push_refresh_hooks(&mut out, "kiwi_line_notifications", NOTIFICATIONS_HOOK_GROUP);
    out
}

/// Returns the contents of a location list file: one `file:line: message` entry per location.
pub fn location_list_contents(locations: &[Location]) -> String {
    let mut out = String::new();
    for (index, Location { file, line, message }) in locations.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        swrite!(out, "{file}:{line}: {message}");
    }
    out
}

/// Returns the command that defines `kiwi-list-<name>`, which opens the location list stored at
/// `list_path`.
///
/// With `select_current_line`, opening the list selects the entries for the line the cursor was on.
pub fn location_list_command(
    name: &str,
    list_path: &Utf8Path,
    locations: &[Location],
    select_current_line: bool,
) -> String {
    let mut out = String::new();
    swriteln!(out, "define-command -override kiwi-list-{} %{{", name.replace('_', "-"));
    swriteln!(out, "    declare-option str kiwi_prev_buffile %val{{buffile}}");
    swriteln!(out, "    declare-option str kiwi_prev_cursor_line %val{{cursor_line}}");
    swriteln!(out, "    edit! -readonly -existing {}", kak_quote(list_path.as_str()));
    swriteln!(out, "    set-option buffer filetype grep");

    if select_current_line && !locations.is_empty() {
        swriteln!(out, "    eval %sh{{");
        swriteln!(
            out,
            "        case \"$kak_opt_kiwi_prev_buffile:$kak_opt_kiwi_prev_cursor_line\" in"
        );
        for (key, selections) in location_selections(locations) {
            swriteln!(
                out,
                "            {}) echo \"select {}\";;",
                sh_quote(&key),
                selections.join(" "),
            );
        }
        swriteln!(out, "        esac");
        swriteln!(out, "    }}");
    }

    swrite!(out, "}}");
    out
}

/// Returns the hash identifying the full notification for `file:line`.
///
/// This is the SHA-256 of `file:line`, hex-encoded, so it can be recomputed with `sha256sum`.
pub fn notification_hash(file: &Utf8Path, line: u32) -> String {
    hex::encode(Sha256::digest(format!("{file}:{line}")))
}

/// Returns where the payload for the full notification at `file:line` is stored.
pub fn notification_path(temp_dir: &Utf8Path, file: &Utf8Path, line: u32) -> Utf8PathBuf {
    temp_dir.join(format!("notification_{}.json", notification_hash(file, line)))
}

/// Returns the command that defines `kiwi-open-notification`, which opens the full notification
/// for the cursor line, if there is one.
pub fn full_notifications_command(temp_dir: &Utf8Path, notifications: &[FullNotification]) -> String {
    let mut out = String::new();
    swriteln!(out, "define-command -override kiwi-open-notification %{{");
    if !notifications.is_empty() {
        swriteln!(out, "    eval %sh{{");
        swriteln!(
            out,
            "        case $(printf %s \"$kak_buffile:$kak_cursor_line\" | sha256sum) in"
        );
        for notification in notifications {
            let hash = notification_hash(&notification.file, notification.line);
            let path = notification_path(temp_dir, &notification.file, notification.line);
            swriteln!(
                out,
                "            \"{hash}  -\") echo \"try %{{ delete-buffer! {NOTIFICATION_BUFFER} }}; \
                 edit! -existing %{{{path}}}; rename-buffer -scratch {NOTIFICATION_BUFFER}; \
                 try %{{ delete-buffer! %{{{path}}} }}\";;",
                path = path.as_str().replace('\'', "''"),
            );
        }
        swriteln!(out, "        esac");
        swriteln!(out, "    }}");
    }
    swrite!(out, "}}");
    out
}

/// Returns the command that opens `file` at `line`.
pub fn jump_to_line_command(file: &Utf8Path, line: u32) -> String {
    format!("edit! -existing {} {line}", kak_quote(file.as_str()))
}

// ---
// Helper methods
// ---

fn label_spec(line: i64, label: &LineLabel, width: usize) -> String {
    format!(
        "\"{line}||{{Default}} {{%opt{{kiwi_color_{}_notification}}}}{}\"",
        label.severity.as_str(),
        escape_flag_lines(&fix_size(&label.text, width)),
    )
}

fn push_refresh_hooks(out: &mut String, command: &str, group: &str) {
    swriteln!(out, "remove-hooks global {group}");
    swriteln!(out, "{command}");
    swrite!(out, "hook -group {group} global BufOpenFile .* {command}");
}

/// Groups locations by `file:line`, returning the list-buffer selections for each group.
///
/// Messages can span several lines, so each entry is selected from its first to its last line.
fn location_selections(locations: &[Location]) -> BTreeMap<String, Vec<String>> {
    let mut selections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut next_line = 1;
    for location in locations {
        let line_count = location.message.split('\n').count();
        let first = next_line;
        let last = first + line_count - 1;
        next_line += line_count;

        selections
            .entry(format!("{}:{}", location.file, location.line))
            .or_default()
            .push(format!("{first}.1,{last}.999"));
    }
    selections
}

fn status_color(colors: &EditorColors, status: LineStatus) -> &str {
    match status {
        LineStatus::Uncovered => &colors.uncovered,
        LineStatus::Success => &colors.success,
        LineStatus::Fail => &colors.fail,
    }
}

fn severity_color(colors: &EditorColors, severity: Severity) -> &str {
    match severity {
        Severity::Normal => &colors.normal_notification,
        Severity::Error => &colors.error_notification,
    }
}

/// Quotes `text` as a Kakoune double-quoted string.
fn kak_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '%' => out.push_str("%%"),
            '\'' => out.push_str("''"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quotes `text` as a shell double-quoted string.
fn sh_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' | '"' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            }
            '\'' => out.push_str("''"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
