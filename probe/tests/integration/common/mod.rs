//! Common test utilities for the probe integration tests.

#![allow(dead_code)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Once;

use startwarp_protocol::platform::{agent_lib_name, cdylib_name, preload_value, PRELOAD_ENV_VAR};
use startwarp_protocol::{DEBUG_ENV, IGNORE_INIT_ERRORS_ENV, LOG_ENV};

pub const FIXTURE_FAIL_ENV: &str = "STARTWARP_FIXTURE_FAIL";
pub const FIXTURE_ENTRY_STATUS_ENV: &str = "STARTWARP_FIXTURE_ENTRY_STATUS";

/// Loader variable the libraries are preloaded through.
pub fn preload_var() -> &'static str {
    PRELOAD_ENV_VAR.expect("preloading is supported on this platform")
}

/// Path to the probe binary built for this test run.
pub fn probe_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_startwarp-probe"))
}

/// Directory cargo places workspace artifacts in, next to the probe.
pub fn artifacts_dir() -> PathBuf {
    probe_path()
        .parent()
        .expect("probe binary has a parent directory")
        .to_path_buf()
}

/// Preloaded libraries the tests need, built once per test run.
const PRELOAD_PACKAGES: [&str; 3] = [
    "startwarp-agent",
    "startwarp-fixture-plugin",
    "startwarp-fixture-chained",
];

/// Build the preload libraries into the probe's artifacts directory.
///
/// The probe binary is built by cargo for the test run; the cdylibs are not
/// dependencies of it, so they are built here in the same profile.
pub fn build_fixtures() {
    static BUILD_ONCE: Once = Once::new();
    BUILD_ONCE.call_once(|| {
        let mut command = Command::new(env!("CARGO"));
        command.arg("build");
        for package in PRELOAD_PACKAGES {
            command.args(["-p", package]);
        }
        if artifacts_dir().ends_with("release") {
            command.arg("--release");
        }
        let status = command
            .current_dir(env!("CARGO_MANIFEST_DIR"))
            .stdout(Stdio::null())
            .status()
            .expect("failed to run cargo build");
        assert!(status.success(), "Failed to build preload libraries");
    });
}

fn built_library(file_name: String) -> PathBuf {
    build_fixtures();
    let path = artifacts_dir().join(&file_name);
    assert!(path.exists(), "{} was not built", path.display());
    path
}

/// The bare agent library.
pub fn agent_library() -> PathBuf {
    built_library(agent_lib_name())
}

/// The fixture plugin library, which carries the agent's exports as well.
pub fn fixture_library() -> PathBuf {
    built_library(cdylib_name("startwarp-fixture-plugin"))
}

/// A plain preload wrapper that calls through with `RTLD_NEXT`.
pub fn chained_library() -> PathBuf {
    built_library(cdylib_name("startwarp-fixture-chained"))
}

/// A probe invocation with a clean startwarp environment.
pub struct ProbeRun {
    command: Command,
}

impl ProbeRun {
    pub fn new() -> Self {
        Self::program(probe_path())
    }

    /// Run `program` instead of the probe, still under the same environment.
    pub fn program(program: impl AsRef<OsStr>) -> Self {
        let mut command = Command::new(program);
        for var in [
            preload_var(),
            DEBUG_ENV,
            IGNORE_INIT_ERRORS_ENV,
            LOG_ENV,
            FIXTURE_FAIL_ENV,
            FIXTURE_ENTRY_STATUS_ENV,
            "RUST_LOG",
        ] {
            command.env_remove(var);
        }
        Self { command }
    }

    pub fn preload(mut self, library: &Path) -> Self {
        self.command.env(preload_var(), preload_value(library, None));
        self
    }

    /// Preload `first` followed by `then`, in that search order.
    pub fn preload_chain(mut self, first: &Path, then: &Path) -> Self {
        let rest = Some(then.as_os_str().to_os_string());
        self.command.env(preload_var(), preload_value(first, rest));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env(key, value);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command.args(args);
        self
    }

    pub fn run(mut self) -> ProbeOutput {
        let output = self.command.output().expect("failed to spawn probe");
        ProbeOutput(output)
    }
}

pub struct ProbeOutput(pub Output);

impl ProbeOutput {
    pub fn code(&self) -> Option<i32> {
        self.0.status.code()
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.0.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.0.stderr).into_owned()
    }

    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout(), self.stderr())
    }

    /// Lines the fixture plugin printed, with the marker prefix removed.
    pub fn fixture_markers(&self) -> Vec<String> {
        self.stderr()
            .lines()
            .filter_map(|line| line.strip_prefix("fixture: "))
            .map(str::to_string)
            .collect()
    }
}
