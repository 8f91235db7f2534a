// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Harness configuration.
//!
//! Configuration is read in layers: the embedded [default config](HarnessConfig::DEFAULT_CONFIG),
//! an optional user file, a few `HARNESS_*` environment variables, and finally programmatic
//! overrides set on a [`HarnessConfigBuilder`]. The result is a [`RunConfig`] for one profile.

mod format_file;
mod iterations;

pub use iterations::*;

use crate::{
    abort_policy::AbortPolicyKind,
    errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound},
    format::{FormatOverrides, LogFileTemplate},
    logger::LoggerSettings,
    output::{Color, ConsoleTarget},
    registry::{IndexRange, RunSelection},
    runner::RunMode,
    verbosity::{LogType, Verbosity},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;

/// Environment variable naming a user config file.
pub const CONFIG_FILE_ENV: &str = "HARNESS_CONFIG";

/// Environment variable selecting the profile.
pub const PROFILE_ENV: &str = "HARNESS_PROFILE";

/// Environment variable overriding the verbosity.
pub const VERBOSITY_ENV: &str = "HARNESS_VERBOSITY";

/// Environment variable overriding isolated execution.
pub const ISOLATE_ENV: &str = "HARNESS_ISOLATE";

/// Environment variable overriding the log directory.
pub const LOG_DIR_ENV: &str = "HARNESS_LOG_DIR";

/// The harness configuration file: a set of named profiles.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    config_file: Option<Utf8PathBuf>,
    profiles: BTreeMap<String, ProfileDeserialize>,
}

impl HarnessConfig {
    /// The embedded default configuration.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the profile every other profile inherits from.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the default configuration, overlaid with `config_file` if given.
    pub fn from_sources(config_file: Option<&Utf8Path>) -> Result<Self, ConfigParseError> {
        let mut builder = Self::make_default_config();
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::new(config_file.as_str(), FileFormat::Toml));
        }
        let deserialized = Self::build_and_deserialize_config(builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;
        debug!(
            profiles = %deserialized.profile.keys().join(", "),
            "read harness config"
        );

        Ok(Self {
            config_file: config_file.map(ToOwned::to_owned),
            profiles: deserialized.profile,
        })
    }

    /// The names of the known profiles.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Resolves a profile. Fields the profile leaves unset are taken from the default profile.
    pub fn profile(&self, name: &str) -> Result<RunConfig, ConfigParseError> {
        self.resolve_profile(name)
            .map_err(|kind| ConfigParseError::new(self.config_file.as_deref(), kind))
    }

    fn resolve_profile(&self, name: &str) -> Result<RunConfig, ConfigParseErrorKind> {
        let default = self
            .profiles
            .get(Self::DEFAULT_PROFILE)
            .cloned()
            .unwrap_or_default();
        let profile = if name == Self::DEFAULT_PROFILE {
            default
        } else {
            let custom = self
                .profiles
                .get(name)
                .ok_or_else(|| ProfileNotFound::new(name, self.profiles.keys()))?;
            custom.inherit(&default)
        };
        profile.into_run_config(name)
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<HarnessConfigDeserialize, ConfigParseErrorKind> {
        let config = builder
            .build()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        serde_path_to_error::deserialize(config).map_err(|error| {
            // serde_path_to_error reports the key, so drop it from the config error.
            let path = error.path().clone();
            let error = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HarnessConfigDeserialize {
    #[serde(default)]
    profile: BTreeMap<String, ProfileDeserialize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProfileDeserialize {
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    verbosity: Option<Verbosity>,
    #[serde(default)]
    abort_policy: Option<AbortPolicyKind>,
    #[serde(default)]
    isolate: Option<bool>,
    #[serde(default)]
    log_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    filename_template: Option<String>,
    #[serde(default)]
    log_type: Option<LogType>,
    #[serde(default)]
    disable_console: Option<bool>,
    #[serde(default)]
    iterations: Option<Iterations>,
    #[serde(default)]
    fail_on_timeout: Option<bool>,
    #[serde(default)]
    color: Option<Color>,
    #[serde(default)]
    run_tests: Option<String>,
    #[serde(default)]
    run_suites: Option<String>,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    format_file: Option<Utf8PathBuf>,
    #[serde(default)]
    run_mode: Option<RunMode>,
}

impl ProfileDeserialize {
    fn inherit(&self, default: &ProfileDeserialize) -> ProfileDeserialize {
        macro_rules! inherit {
            ($($field:ident),* $(,)?) => {
                ProfileDeserialize {
                    $($field: self.$field.clone().or_else(|| default.$field.clone()),)*
                }
            };
        }
        inherit!(
            timeout,
            verbosity,
            abort_policy,
            isolate,
            log_dir,
            filename_template,
            log_type,
            disable_console,
            iterations,
            fail_on_timeout,
            color,
            run_tests,
            run_suites,
            range,
            format_file,
            run_mode,
        )
    }

    fn into_run_config(self, name: &str) -> Result<RunConfig, ConfigParseErrorKind> {
        let defaults = RunConfig::default();

        let mut selection = RunSelection::all();
        if let Some(tests) = &self.run_tests {
            selection = selection.with_tests(RunSelection::parse_tests(tests)?);
        }
        if let Some(suites) = &self.run_suites {
            selection = selection.with_suites(RunSelection::parse_suites(suites)?);
        }
        if let Some(range) = &self.range {
            selection = selection.with_range(range.parse::<IndexRange>()?);
        }

        let filename_template = match &self.filename_template {
            Some(template) => LogFileTemplate::parse(template)?,
            None => defaults.filename_template,
        };
        let format_overrides = match &self.format_file {
            Some(path) => format_file::read_format_file(path)?,
            None => FormatOverrides::new(),
        };

        Ok(RunConfig {
            profile: name.to_owned(),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            verbosity: self.verbosity.unwrap_or(defaults.verbosity),
            abort_policy: self.abort_policy.unwrap_or(defaults.abort_policy),
            isolate: self.isolate.unwrap_or(defaults.isolate),
            log_dir: self.log_dir.unwrap_or(defaults.log_dir),
            filename_template,
            log_type: self.log_type.unwrap_or(defaults.log_type),
            disable_console: self.disable_console.unwrap_or(defaults.disable_console),
            iterations: self.iterations.unwrap_or(defaults.iterations),
            fail_on_timeout: self.fail_on_timeout.unwrap_or(defaults.fail_on_timeout),
            color: self.color.unwrap_or(defaults.color),
            selection,
            format_overrides,
            run_mode: self.run_mode.unwrap_or(defaults.run_mode),
            console: defaults.console,
            cmd_line: defaults.cmd_line,
        })
    }
}

/// The resolved configuration of one run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// The profile this configuration was resolved from.
    pub profile: String,
    /// The default per-phase timeout.
    pub timeout: Duration,
    /// The verbosity threshold.
    pub verbosity: Verbosity,
    /// The initial abort policy.
    pub abort_policy: AbortPolicyKind,
    /// Whether each test runs in its own child process.
    pub isolate: bool,
    /// The directory log files are written to.
    pub log_dir: Utf8PathBuf,
    /// The log file name template.
    pub filename_template: LogFileTemplate,
    /// Which log files are written.
    pub log_type: LogType,
    /// Suppresses the console echo.
    pub disable_console: bool,
    /// How many times to run the selected suites.
    pub iterations: Iterations,
    /// If false, timed-out tests count as not executed.
    pub fail_on_timeout: bool,
    /// Console coloring.
    pub color: Color,
    /// Which tests are scheduled.
    pub selection: RunSelection,
    /// Template overrides from the format file.
    pub format_overrides: FormatOverrides,
    /// Execute, list or describe the tests.
    pub run_mode: RunMode,
    /// Where console echo goes, unless disabled.
    pub console: ConsoleTarget,
    /// The command line reported in log headers.
    pub cmd_line: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile: HarnessConfig::DEFAULT_PROFILE.to_owned(),
            timeout: Duration::from_secs(300),
            verbosity: Verbosity::Suite,
            abort_policy: AbortPolicyKind::ContinueTest,
            isolate: false,
            log_dir: Utf8PathBuf::from("."),
            filename_template: LogFileTemplate::default(),
            log_type: LogType::Both,
            disable_console: false,
            iterations: Iterations::default(),
            fail_on_timeout: true,
            color: Color::Auto,
            selection: RunSelection::all(),
            format_overrides: FormatOverrides::new(),
            run_mode: RunMode::Execute,
            console: ConsoleTarget::Stdout,
            cmd_line: String::new(),
        }
    }
}

impl RunConfig {
    /// The settings for the process's logger.
    pub fn logger_settings(&self) -> LoggerSettings {
        LoggerSettings {
            verbosity: self.verbosity,
            log_type: self.log_type,
            log_dir: self.log_dir.clone(),
            filename_template: self.filename_template.clone(),
            fail_on_timeout: self.fail_on_timeout,
            color: self.color,
            console: (!self.disable_console).then(|| self.console.clone()),
            cmd_line: self.cmd_line.clone(),
        }
    }

    fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigParseErrorKind> {
        let invalid = |var: &'static str, value: &str, reason: String| {
            ConfigParseErrorKind::EnvOverride {
                var,
                value: value.to_owned(),
                reason,
            }
        };

        if let Some(value) = env(VERBOSITY_ENV) {
            self.verbosity = value
                .parse()
                .map_err(|error: crate::errors::VerbosityParseError| {
                    invalid(VERBOSITY_ENV, &value, error.to_string())
                })?;
        }
        if let Some(value) = env(ISOLATE_ENV) {
            self.isolate = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(invalid(
                        ISOLATE_ENV,
                        &value,
                        "expected a boolean (1, 0, true, false, yes, no)".to_owned(),
                    ));
                }
            };
        }
        if let Some(value) = env(LOG_DIR_ENV) {
            if value.is_empty() {
                return Err(invalid(LOG_DIR_ENV, &value, "path is empty".to_owned()));
            }
            self.log_dir = Utf8PathBuf::from(value);
        }
        Ok(())
    }
}

/// Builds a [`RunConfig`] from every configuration layer.
///
/// By default the builder reads the `HARNESS_*` environment variables. Values set on the builder
/// take precedence over everything else.
#[derive(Clone, Debug)]
pub struct HarnessConfigBuilder {
    config_file: Option<Utf8PathBuf>,
    profile: Option<String>,
    read_env: bool,
    timeout: Option<Duration>,
    verbosity: Option<Verbosity>,
    abort_policy: Option<AbortPolicyKind>,
    isolate: Option<bool>,
    log_dir: Option<Utf8PathBuf>,
    log_type: Option<LogType>,
    disable_console: Option<bool>,
    iterations: Option<Iterations>,
    fail_on_timeout: Option<bool>,
    color: Option<Color>,
    selection: Option<RunSelection>,
    run_mode: Option<RunMode>,
    console: Option<ConsoleTarget>,
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessConfigBuilder {
    /// Creates a builder that reads the environment and no config file.
    pub fn new() -> Self {
        Self {
            config_file: None,
            profile: None,
            read_env: true,
            timeout: None,
            verbosity: None,
            abort_policy: None,
            isolate: None,
            log_dir: None,
            log_type: None,
            disable_console: None,
            iterations: None,
            fail_on_timeout: None,
            color: None,
            selection: None,
            run_mode: None,
            console: None,
        }
    }

    /// Overlays a user config file on the defaults, overriding [`CONFIG_FILE_ENV`].
    pub fn config_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Selects a profile, overriding [`PROFILE_ENV`].
    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    /// Whether the `HARNESS_*` environment variables are read.
    pub fn read_env(mut self, read_env: bool) -> Self {
        self.read_env = read_env;
        self
    }

    /// Sets the default per-phase timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the verbosity.
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = Some(verbosity);
        self
    }

    /// Sets the initial abort policy.
    pub fn abort_policy(mut self, kind: AbortPolicyKind) -> Self {
        self.abort_policy = Some(kind);
        self
    }

    /// Runs every test in its own child process.
    pub fn isolate(mut self, isolate: bool) -> Self {
        self.isolate = Some(isolate);
        self
    }

    /// Sets the log directory.
    pub fn log_dir(mut self, log_dir: impl Into<Utf8PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Sets which log files are written.
    pub fn log_type(mut self, log_type: LogType) -> Self {
        self.log_type = Some(log_type);
        self
    }

    /// Suppresses the console echo.
    pub fn disable_console(mut self, disable: bool) -> Self {
        self.disable_console = Some(disable);
        self
    }

    /// Sets the number of iterations.
    pub fn iterations(mut self, iterations: Iterations) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Sets whether timed-out tests count as failed.
    pub fn fail_on_timeout(mut self, fail: bool) -> Self {
        self.fail_on_timeout = Some(fail);
        self
    }

    /// Sets console coloring.
    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    /// Replaces the test selection.
    pub fn selection(mut self, selection: RunSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Sets the run mode.
    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = Some(mode);
        self
    }

    /// Redirects the console echo.
    pub fn console(mut self, console: ConsoleTarget) -> Self {
        self.console = Some(console);
        self
    }

    /// Reads every layer and resolves the selected profile.
    pub fn build(self) -> Result<RunConfig, ConfigParseError> {
        let env = |var: &str| {
            if self.read_env {
                std::env::var(var).ok()
            } else {
                None
            }
        };

        let config_file = self
            .config_file
            .clone()
            .or_else(|| env(CONFIG_FILE_ENV).map(Utf8PathBuf::from));
        let config = HarnessConfig::from_sources(config_file.as_deref())?;
        let profile = self
            .profile
            .clone()
            .or_else(|| env(PROFILE_ENV))
            .unwrap_or_else(|| HarnessConfig::DEFAULT_PROFILE.to_owned());
        let mut run = config.profile(&profile)?;
        run.apply_env_overrides(env)
            .map_err(|kind| ConfigParseError::new(config_file.as_deref(), kind))?;

        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field { run.$field = value; })*
            };
        }
        apply!(
            timeout,
            verbosity,
            abort_policy,
            isolate,
            log_dir,
            log_type,
            disable_console,
            iterations,
            fail_on_timeout,
            color,
            selection,
            run_mode,
            console,
        );
        run.cmd_line = std::env::args().join(" ");

        debug!(profile = %run.profile, "resolved run config");
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn write_config(dir: &Utf8TempDir, contents: &str) -> Utf8PathBuf {
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn embedded_defaults() {
        let run = HarnessConfigBuilder::new().read_env(false).build().unwrap();
        assert_eq!(run.profile, "default");
        assert_eq!(run.timeout, Duration::from_secs(300));
        assert_eq!(run.verbosity, Verbosity::Suite);
        assert_eq!(run.abort_policy, AbortPolicyKind::ContinueTest);
        assert!(!run.isolate);
        assert_eq!(run.log_dir, ".");
        assert_eq!(run.log_type, LogType::Both);
        assert_eq!(run.iterations, Iterations::Finite(1));
        assert!(run.fail_on_timeout);
        assert_eq!(run.run_mode, RunMode::Execute);
        assert!(!run.selection.is_active());
        assert!(run.format_overrides.is_empty());
    }

    #[test]
    fn custom_profile_inherits_default() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(
            &dir,
            indoc! {r#"
                [profile.default]
                verbosity = "test"
                timeout = "30s"

                [profile.ci]
                abort-policy = "abort-suite"
                iterations = "infinite"
                range = "2-4"
                log-type = "xml"
            "#},
        );

        let config = HarnessConfig::from_sources(Some(&path)).unwrap();
        assert_eq!(config.profile_names().collect::<Vec<_>>(), vec!["ci", "default"]);

        let ci = config.profile("ci").unwrap();
        assert_eq!(ci.verbosity, Verbosity::Test);
        assert_eq!(ci.timeout, Duration::from_secs(30));
        assert_eq!(ci.abort_policy, AbortPolicyKind::AbortSuite);
        assert_eq!(ci.iterations, Iterations::Infinite);
        assert_eq!(ci.log_type, LogType::Xml);
        assert!(ci.selection.includes("any", "test", 3));
        assert!(!ci.selection.includes("any", "test", 5));

        let default = config.profile("default").unwrap();
        assert_eq!(default.abort_policy, AbortPolicyKind::ContinueTest);
    }

    #[test]
    fn unknown_profile() {
        let error = HarnessConfigBuilder::new()
            .read_env(false)
            .profile("nightly")
            .build()
            .unwrap_err();
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::ProfileNotFound(_)),
            "{error}"
        );
    }

    #[test_case(r#"iterations = 0"#; "zero iterations")]
    #[test_case(r#"verbosity = "loud""#; "unknown verbosity")]
    #[test_case(r#"timeout = "soon""#; "bad duration")]
    fn invalid_values(line: &str) {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(&dir, &format!("[profile.default]\n{line}\n"));
        let error = HarnessConfig::from_sources(Some(&path)).unwrap_err();
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::DeserializeError(_)),
            "{error}"
        );
    }

    #[test]
    fn invalid_selection() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(&dir, "[profile.default]\nrange = \"9-1\"\n");
        let config = HarnessConfig::from_sources(Some(&path)).unwrap();
        let error = config.profile("default").unwrap_err();
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::Selection(_)),
            "{error}"
        );
    }

    #[test]
    fn env_overrides() {
        let mut run = RunConfig::default();
        run.apply_env_overrides(|var| match var {
            VERBOSITY_ENV => Some("trace".to_owned()),
            ISOLATE_ENV => Some("yes".to_owned()),
            LOG_DIR_ENV => Some("/tmp/logs".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(run.verbosity, Verbosity::Trace);
        assert!(run.isolate);
        assert_eq!(run.log_dir, "/tmp/logs");

        let error = run
            .apply_env_overrides(|var| (var == ISOLATE_ENV).then(|| "maybe".to_owned()))
            .unwrap_err();
        assert!(
            matches!(error, ConfigParseErrorKind::EnvOverride { var: ISOLATE_ENV, .. }),
            "{error}"
        );
    }

    #[test]
    fn builder_overrides_win() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(&dir, "[profile.default]\nisolate = true\n");
        let run = HarnessConfigBuilder::new()
            .read_env(false)
            .config_file(&path)
            .isolate(false)
            .verbosity(Verbosity::High)
            .disable_console(true)
            .build()
            .unwrap();
        assert!(!run.isolate);
        assert_eq!(run.verbosity, Verbosity::High);
        assert!(run.logger_settings().console.is_none());
    }
}
