use std::collections::HashMap;
use std::path::Path;

use crate::error::ProxyError;
use crate::executor::child::{ChildProcess, LaunchSpec, LogSinks, START_TIMEOUT_WARM};
use crate::executor::kind::ModelKind;

/// A long-lived child that has loaded a model and serves repeated
/// requests until stopped (spec §3, §4.B). `started == true` iff the
/// child has been launched and not yet stopped or observed to exit —
/// this flag is the sole source of truth the dispatcher uses to
/// distinguish pre-loaded from cold.
pub struct WarmExecutor {
    kind: &'static ModelKind,
    child: ChildProcess,
}

impl WarmExecutor {
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
            start_timeout: START_TIMEOUT_WARM,
            interact_timeout: kind.interact_timeout,
        };
        Self {
            kind,
            child: ChildProcess::launch(spec, log_sinks),
        }
    }

    pub fn kind(&self) -> &'static ModelKind {
        self.kind
    }

    pub fn started(&self) -> bool {
        self.child.started()
    }

    pub fn exited(&self) -> bool {
        self.child.exited()
    }

    /// Launches the child without requiring an ack, unless the caller
    /// configured `wait_for_ack` (spec §6 `OW_WAIT_FOR_ACK`).
    pub async fn start(&mut self, wait_for_ack: bool) -> Result<(), ProxyError> {
        self.child.start(wait_for_ack).await
    }

    /// Serves one request. Per the Open Question decision recorded in
    /// DESIGN.md: `started` is cleared only on a terminal Interact error,
    /// never merely because a request was served — back-to-back warm
    /// serves stay warm.
    pub async fn interact(&mut self, payload: &[u8]) -> Result<Vec<u8>, ProxyError> {
        match self.child.interact(payload).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                self.child.stop();
                Err(err)
            }
        }
    }

    /// Idempotent: stopping an already-stopped executor is a no-op at the
    /// process-management level (the underlying pid is already cleared).
    pub fn stop(&mut self) {
        self.child.stop();
    }
}
