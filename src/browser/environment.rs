//! Browser binary discovery and readiness checks.

use std::env;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::{Result, XshotError};

/// Timeout for the `--version` check.
pub(crate) const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Binary names tried on `PATH`, in order.
pub(crate) const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Resolves the browser binary: explicit path, then `CHROME`, then `PATH`.
pub fn locate_browser(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(XshotError::EnvironmentNotReady(format!(
                "configured browser executable {} does not exist",
                path.display()
            )))
        };
    }

    if let Some(from_env) = env::var_os("CHROME").filter(|v| !v.is_empty()) {
        let path = PathBuf::from(from_env);
        if path.is_file() {
            return Ok(path);
        }
        return Err(XshotError::EnvironmentNotReady(format!(
            "CHROME points at {}, which does not exist",
            path.display()
        )));
    }

    let path_var = env::var_os("PATH").unwrap_or_default();
    find_on_path(&path_var, BROWSER_CANDIDATES).ok_or_else(|| {
        XshotError::EnvironmentNotReady(format!(
            "no browser found on PATH (tried {})",
            BROWSER_CANDIDATES.join(", ")
        ))
    })
}

pub(crate) fn find_on_path(path_var: &OsStr, candidates: &[&str]) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = env::split_paths(path_var).collect();
    candidates.iter().find_map(|name| {
        dirs.iter().find_map(|dir| {
            let candidate = dir.join(name);
            candidate.is_file().then_some(candidate)
        })
    })
}

/// Maps a spawn error to an appropriate XshotError.
pub(crate) fn map_spawn_error(err: io::Error, executable: &Path) -> XshotError {
    if err.kind() == io::ErrorKind::NotFound {
        XshotError::EnvironmentNotReady(format!(
            "browser executable {} was not found",
            executable.display()
        ))
    } else {
        XshotError::EnvironmentNotReady(format!(
            "browser executable {} could not be started: {}",
            executable.display(),
            err
        ))
    }
}

/// Runs `<executable> --version` to prove the binary actually starts.
pub async fn ensure_browser_runs(executable: &Path) -> Result<()> {
    let mut cmd = Command::new(executable);
    cmd.arg("--version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::time::timeout(VERSION_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            XshotError::EnvironmentNotReady(format!(
                "Timed out checking {} after {:?}",
                executable.display(),
                VERSION_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, executable))?;

    if !output.status.success() {
        return Err(XshotError::EnvironmentNotReady(format!(
            "browser {} is not usable (exit {})",
            executable.display(),
            output.status
        )));
    }

    debug!(
        version = %String::from_utf8_lossy(&output.stdout).trim(),
        "browser runtime ready"
    );
    Ok(())
}
