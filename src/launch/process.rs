//! Pid-file bookkeeping and sub-process spawning.

use crate::core::ProcessType;
use crate::error::{FrameError, Result};
use crate::launch::descriptor::SubProcessList;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Delay between a successful start and spawning sub-processes.
pub const SUB_PROCESS_DELAY: Duration = Duration::from_secs(5);

/// Flag carrying the process type to children.
pub const PROCESS_TYPE_FLAG: &str = "process_type";

/// A pid file written at startup, named `<app_id>.pid`.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Write the current process id under `pid_dir`.
    ///
    /// An existing file is overwritten with a warning.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory or file cannot be written.
    pub fn create(pid_dir: &Path, app_id: &str) -> Result<Self> {
        let path = pid_dir.join(format!("{}.pid", app_id));
        if path.exists() {
            warn!(path = %path.display(), "pid file already exists, check for a conflicting process");
        }

        std::fs::create_dir_all(pid_dir)?;
        let pid = std::process::id();
        std::fs::write(&path, pid.to_string())?;
        info!(path = %path.display(), pid, "wrote pid file");

        Ok(Self { path, pid })
    }

    /// Path of the pid file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Delete the pid file. A file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file exists but cannot be removed.
    pub fn remove(self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FrameError::IoError(e)),
        }
    }
}

/// Render a command's flag map as `-name=value` arguments sorted by name, adding
/// the sub-process type last.
pub fn sub_process_args(flags: &Map<String, Value>) -> Vec<String> {
    let mut flags: Vec<(&String, &Value)> = flags.iter().collect();
    flags.sort_by(|a, b| a.0.cmp(b.0));

    let mut args: Vec<String> = flags
        .into_iter()
        .filter(|(name, _)| name.as_str() != PROCESS_TYPE_FLAG)
        .map(|(name, value)| match value {
            Value::String(text) => format!("-{}={}", name, text),
            other => format!("-{}={}", name, other),
        })
        .collect();
    args.push(format!("-{}={}", PROCESS_TYPE_FLAG, ProcessType::Sub.code()));
    args
}

/// Spawn `exe` as a sub-process with the given flags, sharing stdio.
///
/// # Errors
///
/// Returns an IO error if the process cannot be spawned.
pub fn spawn_sub_process(exe: &Path, flags: &Map<String, Value>) -> Result<Child> {
    let child = Command::new(exe)
        .args(sub_process_args(flags))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;
    Ok(child)
}

/// Spawn every configured sub-process of the current executable after `delay`.
///
/// Nothing happens when the list is disabled or empty. Spawn failures are logged
/// and skipped.
pub async fn spawn_sub_processes(list: &SubProcessList, delay: Duration) -> Vec<Child> {
    if !list.enable || list.commands.is_empty() {
        return Vec::new();
    }

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            warn!(error = %e, "cannot resolve current executable, no sub-process started");
            return Vec::new();
        }
    };

    info!(delay_secs = delay.as_secs(), count = list.commands.len(), "starting sub-processes after delay");
    tokio::time::sleep(delay).await;

    let mut children = Vec::with_capacity(list.commands.len());
    for flags in &list.commands {
        let args = sub_process_args(flags).join(" ");
        match spawn_sub_process(&exe, flags) {
            Ok(child) => {
                info!(exe = %exe.display(), args = %args, pid = ?child.id(), "started sub-process");
                children.push(child);
            }
            Err(e) => {
                warn!(exe = %exe.display(), args = %args, error = %e, "failed to start sub-process");
            }
        }
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_pid_file_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let pid_dir = temp_dir.path().join("run");

        let pid_file = PidFile::create(&pid_dir, "echo").unwrap();
        assert_eq!(pid_file.path(), pid_dir.join("echo.pid"));
        let content = std::fs::read_to_string(pid_file.path()).unwrap();
        assert_eq!(content, std::process::id().to_string());

        // Overwrites an existing file
        let again = PidFile::create(&pid_dir, "echo").unwrap();
        let path = again.path().to_path_buf();
        again.remove().unwrap();
        assert!(!path.exists());
        pid_file.remove().unwrap();
    }

    #[test]
    fn test_sub_process_args() {
        let flags = json!({ "port": 9001, "name": "worker", "process_type": 1 });
        let Value::Object(flags) = flags else {
            unreachable!()
        };

        let args = sub_process_args(&flags);
        assert_eq!(args, vec!["-name=worker", "-port=9001", "-process_type=2"]);
    }

    #[tokio::test]
    async fn test_disabled_list_spawns_nothing() {
        let list = SubProcessList {
            enable: false,
            commands: vec![Map::new()],
        };
        assert!(spawn_sub_processes(&list, Duration::ZERO).await.is_empty());
    }
}
