use std::collections::HashMap;
use std::path::Path;

use crate::error::ProxyError;
use crate::executor::child::{ChildProcess, LaunchSpec, LogSinks, START_TIMEOUT_GENERIC};
use crate::executor::kind::ModelKind;

/// A child that starts, produces one output line, and exits (spec §3,
/// §4.C). Discarded after one use — the registry constructs a
/// replacement in the same slot.
pub struct ColdExecutor {
    child: ChildProcess,
}

impl ColdExecutor {
    pub fn new(
        kind: &'static ModelKind,
        script_path: &Path,
        env: HashMap<String, String>,
        log_sinks: LogSinks,
    ) -> Self {
        let spec = LaunchSpec {
            command: script_path.to_string_lossy().into_owned(),
            args: Vec::new(),
            env,
            process_group: kind.process_group,
            start_timeout: START_TIMEOUT_GENERIC,
            interact_timeout: kind.interact_timeout,
        };
        Self {
            child: ChildProcess::launch(spec, log_sinks),
        }
    }

    /// Starts the child without ack, concurrently reads one output line,
    /// and returns when either the line arrives or the child exits,
    /// preferring the line if both are ready (spec §4.C). Appends the
    /// activation-boundary sentinel to both log sinks afterward.
    pub async fn start_and_wait_for_output(mut self) -> Result<Vec<u8>, ProxyError> {
        let result = match self.child.start(false).await {
            Ok(()) => self.child.read_one_line_or_exit().await,
            Err(err) => Err(err),
        };
        self.child.write_sentinel().await;
        result
    }
}
