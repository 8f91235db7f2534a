// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    Result,
    eyre::{Context, bail},
};
use harness_metadata::HarnessExitCode;
use std::{
    borrow::Cow,
    collections::HashMap,
    ffi::OsString,
    fmt,
    process::{Command, ExitStatus},
};

/// Runs a test executable built on the harness.
#[derive(Clone, Debug)]
pub struct HarnessCli {
    bin: Utf8PathBuf,
    args: Vec<String>,
    envs: HashMap<OsString, OsString>,
    unchecked: bool,
}

impl HarnessCli {
    pub fn new(bin: impl Into<Utf8PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            args: Vec::new(),
            envs: HashMap::new(),
            unchecked: false,
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(&mut self, k: impl Into<OsString>, v: impl Into<OsString>) -> &mut Self {
        self.envs.insert(k.into(), v.into());
        self
    }

    /// Sends the log files to `dir`.
    pub fn log_dir(&mut self, dir: &Utf8Path) -> &mut Self {
        self.env("HARNESS_LOG_DIR", dir.as_str())
    }

    pub fn unchecked(&mut self, unchecked: bool) -> &mut Self {
        self.unchecked = unchecked;
        self
    }

    pub fn output(&self) -> HarnessOutput {
        let mut command = Command::new(&self.bin);
        command.args(&self.args);
        // Settings from the outer environment must not leak into the fixture.
        for var in [
            "HARNESS_CONFIG",
            "HARNESS_PROFILE",
            "HARNESS_VERBOSITY",
            "HARNESS_ISOLATE",
            "HARNESS_LOG_DIR",
            harness_metadata::ISOLATED_TEST_ENV,
            harness_metadata::LISTENER_ADDR_ENV,
        ] {
            command.env_remove(var);
        }
        command.envs(&self.envs);
        let output = command.output().expect("failed to execute");

        let ret = HarnessOutput {
            command,
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if !self.unchecked && !output.status.success() {
            panic!("command failed:\n\n{ret}");
        }

        ret
    }
}

pub struct HarnessOutput {
    pub command: Command,
    pub exit_status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl HarnessOutput {
    pub fn stdout_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// The number of failed tests encoded in the exit code.
    pub fn failed_count(&self) -> Option<usize> {
        self.exit_status
            .code()
            .and_then(HarnessExitCode::failed_count)
    }
}

impl fmt::Display for HarnessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command: {:?}\nexit code: {:?}\n\
                   --- stdout ---\n{}\n\n--- stderr ---\n{}\n\n",
            self.command,
            self.exit_status.code(),
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr)
        )
    }
}

// Make Debug output the same as Display output, so `.unwrap()` and `.expect()` are nicer.
impl fmt::Debug for HarnessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Reads the log file of `suite` with the given extension, written with the default file name
/// template.
pub fn read_log(dir: &Utf8Path, suite: &str, extension: &str) -> Result<String> {
    let prefix = format!("{suite}_");
    let mut matches = Vec::new();
    for entry in dir
        .read_dir_utf8()
        .wrap_err_with(|| format!("failed to read log dir {dir}"))?
    {
        let entry = entry.wrap_err("failed to read log dir entry")?;
        if entry.file_name().starts_with(&prefix) && entry.path().extension() == Some(extension) {
            matches.push(entry.path().to_owned());
        }
    }
    match matches.as_slice() {
        [path] => {
            std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read log {path}"))
        }
        _ => bail!("expected one .{extension} log for {suite} in {dir}, found {matches:?}"),
    }
}
