use std::path::PathBuf;

use crate::error::ProxyError;

/// Thin stand-in for the upload/unzip/compile pipeline that precedes the
/// executor lifecycle (spec §1 Non-goals). Resolves the highest-numbered
/// uploaded action directory and validates its execution-environment tag;
/// it does not unpack archives or invoke a compiler itself.
pub struct ActionLoader {
    base_dir: PathBuf,
}

impl ActionLoader {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn action_dir(&self, dir: u32) -> PathBuf {
        self.base_dir.join(dir.to_string())
    }

    /// The highest `<base_dir>/<N>` directory currently on disk, or `None`
    /// if nothing has been uploaded yet (spec §6 persisted state layout).
    pub fn highest_dir(&self) -> Option<u32> {
        std::fs::read_dir(&self.base_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| name.parse::<u32>().ok())
            .max()
    }

    pub fn executable_path(&self, dir: u32) -> PathBuf {
        self.action_dir(dir).join("bin").join("exec")
    }

    /// Validates `OW_EXECUTION_ENV` against `<dir>/bin/exec.env` (spec §6):
    /// a mismatch is a hard `/init` failure, not a warning.
    pub fn check_execution_env(&self, dir: u32, expected: &str) -> Result<(), ProxyError> {
        let path = self.action_dir(dir).join("bin").join("exec.env");
        let actual = std::fs::read_to_string(&path)
            .map_err(|err| ProxyError::BadRequest(format!("cannot read exec.env: {err}")))?;
        if actual.trim() != expected {
            return Err(ProxyError::BadRequest(
                "execution environment version mismatch".to_string(),
            ));
        }
        Ok(())
    }

    /// Removes the action directory whose `Start` failed, so a later
    /// `/init` doesn't keep tripping over a half-usable codebase.
    pub fn remove_action(&self, dir: u32) -> Result<(), ProxyError> {
        match std::fs::remove_dir_all(self.action_dir(dir)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ProxyError::Io(err)),
        }
    }

    /// Removes every uploaded action directory under `base_dir` (spec
    /// `/clean`).
    pub fn remove_all_actions(&self) -> Result<(), ProxyError> {
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(ProxyError::Io(err)),
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            std::fs::remove_dir_all(entry.path())?;
        }
        Ok(())
    }

    /// Resets whatever "highest uploaded action" index `/clean` is meant to
    /// clear. A no-op here: unlike the original's cached `currentDir`
    /// field, `highest_dir` always recomputes from disk, so once
    /// `remove_all_actions` has run there's nothing left to reset.
    pub fn reset_current_dir(&self) {}
}
