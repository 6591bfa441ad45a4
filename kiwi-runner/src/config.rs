// Copyright (c) The kiwi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for kiwi.
//!
//! Configuration is layered: the embedded [`KiwiConfig::DEFAULT_CONFIG`] comes first, and
//! repository-specific configuration from [`KiwiConfig::CONFIG_PATH`] (or an explicitly provided
//! file) is layered on top of it.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    helpers::{absolutize, utf8_temp_dir},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Overall configuration for kiwi.
#[derive(Clone, Debug)]
pub struct KiwiConfig {
    project_root: Utf8PathBuf,
    runner: RunnerConfig,
    editor: EditorConfig,
}

impl KiwiConfig {
    /// The default location of the config within the project root.
    pub const CONFIG_PATH: &'static str = ".config/kiwi.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the kiwi config from the given file, or if not specified from `.config/kiwi.toml` in
    /// the project root.
    ///
    /// If no config file is specified and the project doesn't have `.config/kiwi.toml`, uses the
    /// default config options. Unknown keys are logged as warnings.
    pub fn from_sources(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(project_root, config_file, &mut DefaultConfigWarnings)
    }

    /// Reads the kiwi config, reporting unknown keys to `warnings`.
    pub fn from_sources_with_warnings(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let project_root = project_root.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = project_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &unknown);
        }

        Ok(Self::from_deserialized(project_root, deserialized))
    }

    /// Returns the default kiwi config.
    pub fn default_config(project_root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");
        let deserialized = config
            .try_deserialize()
            .expect("default config is always valid");
        Self::from_deserialized(project_root.into(), deserialized)
    }

    /// Returns the project root that relative paths are resolved against.
    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    /// Returns runner configuration.
    pub fn runner(&self) -> &RunnerConfig {
        &self.runner
    }

    /// Returns editor configuration.
    pub fn editor(&self) -> &EditorConfig {
        &self.editor
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn from_deserialized(project_root: Utf8PathBuf, deserialized: KiwiConfigDeserialize) -> Self {
        let KiwiConfigDeserialize { runner, editor } = deserialized;
        let runner = RunnerConfig {
            persist_dir: runner
                .persist_dir
                .map(|dir| absolutize(&project_root, dir)),
        };
        let editor = EditorConfig {
            client: editor.client,
            max_notification_length: editor.max_notification_length,
            status_chars: editor.status_chars,
            temp_dir: match editor.temp_dir {
                Some(dir) => absolutize(&project_root, dir),
                None => utf8_temp_dir().join("kiwi"),
            },
            colors: editor.colors,
        };

        Self {
            project_root,
            runner,
            editor,
        }
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(KiwiConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: KiwiConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // Both serde_path_to_error and the config crate report the key. Drop the key
                // from the config error for consistency.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

/// Trait for handling configuration warnings.
///
/// This trait allows for different warning handling strategies, such as logging warnings (the
/// default behavior) or collecting them for testing purposes.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs configuration warnings using the tracing crate.
struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.push_str(unknown.iter().next().expect("unknown has one element"));
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push('\n');
                unknown_str.push_str("  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

/// Configuration for the test runner.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunnerConfig {
    /// The absolute directory instrumented code is written to before it is loaded, if any.
    pub persist_dir: Option<Utf8PathBuf>,
}

/// Configuration for rendering results in the editor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EditorConfig {
    /// The editor client commands are evaluated in.
    pub client: String,

    /// The width inline notifications are truncated or padded to.
    pub max_notification_length: usize,

    /// The characters drawn in the gutter for each line status.
    pub status_chars: String,

    /// The absolute directory location lists and notification payloads are written to.
    pub temp_dir: Utf8PathBuf,

    /// Colors used for statuses and notifications.
    pub colors: EditorColors,
}

/// Colors used by the editor, in the editor's own color syntax.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct EditorColors {
    /// Color for uncovered lines.
    pub uncovered: String,

    /// Color for failing lines.
    pub fail: String,

    /// Color for successful lines.
    pub success: String,

    /// Face for normal notifications.
    pub normal_notification: String,

    /// Face for error notifications.
    pub error_notification: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KiwiConfigDeserialize {
    #[serde(default)]
    runner: RunnerConfigDeserialize,
    editor: EditorConfigDeserialize,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDeserialize {
    #[serde(default)]
    persist_dir: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct EditorConfigDeserialize {
    client: String,
    max_notification_length: usize,
    status_chars: String,
    #[serde(default)]
    temp_dir: Option<Utf8PathBuf>,
    colors: EditorColors,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct CollectWarnings {
        unknown: Vec<(Utf8PathBuf, BTreeSet<String>)>,
    }

    impl ConfigWarnings for CollectWarnings {
        fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown.push((config_file.to_owned(), unknown.clone()));
        }
    }

    fn write_config(dir: &Utf8TempDir, contents: &str) {
        let config_dir = dir.path().join(".config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("kiwi.toml"), contents).unwrap();
    }

    #[test]
    fn default_config_values() {
        let config = KiwiConfig::default_config("/project");
        assert_eq!(config.runner().persist_dir, None);

        let editor = config.editor();
        assert_eq!(editor.client, "client0");
        assert_eq!(editor.max_notification_length, 30);
        assert_eq!(editor.status_chars, "██");
        assert_eq!(editor.colors.fail, "rgb:ab4434");
        assert_eq!(editor.colors.normal_notification, "Default");
        assert!(editor.temp_dir.ends_with("kiwi"));
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        let mut warnings = CollectWarnings::default();
        let config =
            KiwiConfig::from_sources_with_warnings(dir.path(), None, &mut warnings).unwrap();

        assert_eq!(config.editor(), KiwiConfig::default_config(dir.path()).editor());
        assert!(warnings.unknown.is_empty());
    }

    #[test]
    fn layered_config() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc! {r#"
                [runner]
                persist-dir = "target/kiwi"

                [editor]
                max-notification-length = 40
                temp-dir = "/var/tmp/kiwi-test"

                [editor.colors]
                fail = "red"
            "#},
        );

        let mut warnings = CollectWarnings::default();
        let config =
            KiwiConfig::from_sources_with_warnings(dir.path(), None, &mut warnings).unwrap();

        assert_eq!(
            config.runner().persist_dir.as_deref(),
            Some(dir.path().join("target/kiwi").as_path()),
            "relative persist-dir is resolved against the project root"
        );
        let editor = config.editor();
        assert_eq!(editor.max_notification_length, 40);
        assert_eq!(editor.temp_dir, "/var/tmp/kiwi-test");
        assert_eq!(editor.colors.fail, "red");
        assert_eq!(editor.colors.success, "rgb:a1b56b", "unset keys keep defaults");
        assert_eq!(editor.client, "client0");
        assert!(warnings.unknown.is_empty());
    }

    #[test]
    fn unknown_keys_are_reported() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc! {r#"
                [editor]
                max-notification-lenght = 10
                [editor.colors]
                bogus = "x"
            "#},
        );

        let mut warnings = CollectWarnings::default();
        KiwiConfig::from_sources_with_warnings(dir.path(), None, &mut warnings).unwrap();

        assert_eq!(warnings.unknown.len(), 1);
        let (file, keys) = &warnings.unknown[0];
        assert_eq!(file, &dir.path().join(KiwiConfig::CONFIG_PATH));
        assert_eq!(
            keys.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["editor.colors.bogus", "editor.max-notification-lenght"],
        );
    }

    #[test]
    fn invalid_value_reports_path() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc! {r#"
                [editor]
                max-notification-length = "wide"
            "#},
        );

        let error = KiwiConfig::from_sources(dir.path(), None).unwrap_err();
        assert_eq!(error.config_file(), &dir.path().join(KiwiConfig::CONFIG_PATH));
        match error.kind() {
            ConfigParseErrorKind::DeserializeError(error) => {
                assert_eq!(error.path().to_string(), "editor.max-notification-length");
            }
            other => panic!("expected a deserialize error, found {other:?}"),
        }
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = Utf8TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let error = KiwiConfig::from_sources(dir.path(), Some(&missing)).unwrap_err();
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::BuildError(_)),
            "explicit config files are required"
        );
    }
}
