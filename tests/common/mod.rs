use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use whiskproxy::executor::LogSinks;

/// Writes an executable shell script fixture under a per-process temp
/// directory and returns its path. No tempfile crate: the teacher's stack
/// doesn't carry one, and this is simple enough with `std::fs`.
pub fn write_script(name: &str, body: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("whiskproxy-tests-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("create fixture dir");
    let path = dir.join(name);
    fs::write(&path, body).expect("write fixture script");
    let mut perms = fs::metadata(&path).expect("stat fixture script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod fixture script");
    path
}

/// A `LogSinks` backed by real files under the same per-process temp
/// directory, tagged so parallel tests don't collide.
pub fn log_sinks(tag: &str) -> LogSinks {
    let dir = std::env::temp_dir().join(format!("whiskproxy-tests-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("create fixture dir");
    let stdout = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{tag}-stdout.log")))
        .expect("open stdout sink");
    let stderr = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{tag}-stderr.log")))
        .expect("open stderr sink");
    LogSinks {
        stdout: Arc::new(Mutex::new(tokio::fs::File::from_std(stdout))),
        stderr: Arc::new(Mutex::new(tokio::fs::File::from_std(stderr))),
    }
}

/// A shell script that echoes a fixed ack then loops, replying `{"ok":
/// true}` to every input line. Used as a stand-in warm model executor.
pub const ECHO_LOOP_SCRIPT: &str = "#!/bin/sh\nwhile IFS= read -r line; do\n  echo \"{\\\"ok\\\": true}\"\ndone\n";

/// A script that replies once with a fixed ack line before looping, for
/// exercising `OW_WAIT_FOR_ACK`.
pub const ACK_THEN_LOOP_SCRIPT: &str = "#!/bin/sh\necho '{\"ok\": true}'\nwhile IFS= read -r line; do\n  echo \"{\\\"ok\\\": true}\"\ndone\n";

/// A script that prints one line and exits, standing in for a cold
/// (one-shot) model executor.
pub const COLD_ONESHOT_SCRIPT: &str = "#!/bin/sh\necho '{\"ok\": true, \"result\": \"cold-done\"}'\n";

/// A script that exits immediately without producing any output.
pub const EXIT_IMMEDIATELY_SCRIPT: &str = "#!/bin/sh\nexit 1\n";
