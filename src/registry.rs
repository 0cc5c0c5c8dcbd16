use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::executor::child::ChildProcess;
use crate::executor::{kind, ColdExecutor, LogSinks, ModelKind, WarmExecutor, MODEL_KINDS};

/// Owns every executor slot in the proxy (spec §3, §9 Globals):
/// one `WarmSlot` and one `ColdSlot` per `ModelKind`, one generic slot for
/// the uploaded action, and the shared `ActionEnvironment` map. Enforces
/// invariants I1–I4; the dispatcher never touches a slot directly.
pub struct ExecutorRegistry {
    script_dir: PathBuf,
    log_sinks: LogSinks,
    wait_for_ack: bool,
    warm_slots: Vec<Mutex<Option<WarmExecutor>>>,
    cold_slots: Vec<Mutex<ColdExecutor>>,
    generic: Mutex<Option<ChildProcess>>,
    env: Mutex<HashMap<String, String>>,
}

impl ExecutorRegistry {
    pub fn new(config: &ProxyConfig, log_sinks: LogSinks) -> Self {
        let warm_slots = MODEL_KINDS.iter().map(|_| Mutex::new(None)).collect();
        let cold_slots = MODEL_KINDS
            .iter()
            .map(|k| {
                let path = config.script_dir.join(k.cold_script);
                Mutex::new(ColdExecutor::new(
                    k,
                    &path,
                    config.base_env.clone(),
                    log_sinks.clone(),
                ))
            })
            .collect();

        Self {
            script_dir: config.script_dir.clone(),
            log_sinks,
            wait_for_ack: config.wait_for_ack,
            warm_slots,
            cold_slots,
            generic: Mutex::new(None),
            env: Mutex::new(config.base_env.clone()),
        }
    }

    pub fn log_sinks(&self) -> LogSinks {
        self.log_sinks.clone()
    }

    fn warm_script_path(&self, kind: &ModelKind) -> PathBuf {
        self.script_dir.join(kind.warm_script)
    }

    fn cold_script_path(&self, kind: &ModelKind) -> PathBuf {
        self.script_dir.join(kind.cold_script)
    }

    pub async fn env_snapshot(&self) -> HashMap<String, String> {
        self.env.lock().await.clone()
    }

    /// Overlays `overlay` onto the current `ActionEnvironment` (spec §3,
    /// used by `/init`). Already-running children keep whatever they
    /// snapshotted at their own launch.
    pub async fn set_env(&self, overlay: HashMap<String, String>) {
        let mut env = self.env.lock().await;
        env.extend(overlay);
    }

    /// Wipes the `ActionEnvironment` entirely (spec `/clean`), matching the
    /// original's full reset rather than falling back to the base OS
    /// snapshot — the next `/init` rebuilds it from scratch.
    pub async fn clear_env(&self) {
        self.env.lock().await.clear();
    }

    /// True if any cold slot is currently mid-flight. A cold slot's mutex is
    /// held for the full duration of `start_and_wait_for_output`, so a
    /// failed `try_lock` is an exact proxy for "running" (spec I2's
    /// `HasAnyColdRunning`, grounded on `actionProxy.go`'s
    /// `HasAnyExecutorStarted` over the Origin executors).
    pub async fn has_any_cold_running(&self) -> bool {
        for slot in &self.cold_slots {
            if slot.try_lock().is_err() {
                return true;
            }
        }
        false
    }

    /// `/load` (spec §4.B). No-op if already warm and running; on a failed
    /// `Start`, the slot stays populated with the unstarted handle so the
    /// caller sees `ProcessExited`/`InitRefused` rather than a silent 500.
    pub async fn load(&self, kind: &'static ModelKind) -> Result<(), ProxyError> {
        // I1: at most one warm executor system-wide. Safe to do before
        // locking this kind's own slot below — stop_all_except skips `kind`
        // by name, so it never tries to lock the same slot twice.
        self.stop_all_except(Some(kind.name)).await;

        let idx = kind::slot_index(kind.name);
        let mut slot = self.warm_slots[idx].lock().await;

        if let Some(exec) = slot.as_ref() {
            if exec.started() && !exec.exited() {
                return Ok(());
            }
        }

        let needs_fresh = match slot.as_ref() {
            None => true,
            Some(exec) => exec.exited() || !exec.started(),
        };

        if needs_fresh {
            if let Some(mut old) = slot.take() {
                if old.started() && !old.exited() {
                    old.stop();
                }
            }
            let env = self.env_snapshot().await;
            *slot = Some(WarmExecutor::new(
                kind,
                &self.warm_script_path(kind),
                env,
                self.log_sinks.clone(),
            ));
        }

        let exec = slot.as_mut().expect("constructed or already present above");
        exec.start(self.wait_for_ack).await
    }

    /// `/offload` (spec §4.E). Stopping an absent or already-stopped slot is
    /// a no-op, per the spec's literal description (not the original Go's
    /// 500-on-absent behavior — see DESIGN.md).
    pub async fn offload(&self, kind: &'static ModelKind) -> Result<(), ProxyError> {
        let idx = kind::slot_index(kind.name);
        let mut slot = self.warm_slots[idx].lock().await;
        if let Some(exec) = slot.as_mut() {
            if exec.started() {
                exec.stop();
            }
        }
        Ok(())
    }

    /// Stops every warm executor except `except` (spec I1, used by `/load`
    /// and `/run`'s cold path). Each slot is locked and released one at a
    /// time in ascending kind-table order, so no two locks are ever held
    /// simultaneously and the iteration order can't deadlock against itself.
    pub async fn stop_all_except(&self, except: Option<&str>) {
        for kind in MODEL_KINDS.iter() {
            if Some(kind.name) == except {
                continue;
            }
            let idx = kind::slot_index(kind.name);
            let mut slot = self.warm_slots[idx].lock().await;
            if let Some(exec) = slot.as_mut() {
                if exec.started() {
                    tracing::info!(kind = kind.name, "stopping warm executor");
                    exec.stop();
                }
            }
        }
    }

    /// `/run`'s warm path (spec §4.E). Returns `None` when the slot isn't
    /// currently running so the dispatcher can fall through to the cold
    /// path; `Some(Err(_))` on a genuine Interact failure.
    pub async fn run_warm(
        &self,
        kind: &'static ModelKind,
        body: &[u8],
    ) -> Option<Result<Vec<u8>, ProxyError>> {
        let idx = kind::slot_index(kind.name);

        {
            let slot = self.warm_slots[idx].lock().await;
            let running = slot
                .as_ref()
                .is_some_and(|exec| exec.started() && !exec.exited());
            if !running {
                return None;
            }
        }

        // Dropped the guard before calling stop_all_except, which locks
        // other warm slots in ascending index order (spec §5) — holding
        // this slot while doing so would invert that order against a
        // concurrent run_warm/load for a lower-indexed kind and deadlock.
        self.stop_all_except(Some(kind.name)).await;

        let mut slot = self.warm_slots[idx].lock().await;
        let running = slot
            .as_ref()
            .is_some_and(|exec| exec.started() && !exec.exited());
        if !running {
            return None;
        }

        let exec = slot.as_mut().expect("checked running above");
        Some(exec.interact(body).await)
    }

    /// `/run`'s cold path (spec §4.C, I3). Stops every warm executor first,
    /// then swaps a fresh `ColdExecutor` into the slot before running the
    /// old one to completion, so the slot always holds a ready replacement
    /// regardless of how the run turns out.
    pub async fn run_cold(&self, kind: &'static ModelKind) -> Result<Vec<u8>, ProxyError> {
        self.stop_all_except(None).await;

        let idx = kind::slot_index(kind.name);
        let mut slot = self.cold_slots[idx].lock().await;
        let env = self.env_snapshot().await;
        let fresh = ColdExecutor::new(
            kind,
            &self.cold_script_path(kind),
            env,
            self.log_sinks.clone(),
        );
        let old = std::mem::replace(&mut *slot, fresh);
        old.start_and_wait_for_output().await
    }

    /// Installs the generic (uploaded-action) executor, killing any
    /// previous one that hadn't already exited (spec I4).
    pub async fn set_generic(&self, child: ChildProcess) {
        let mut slot = self.generic.lock().await;
        if let Some(mut old) = slot.take() {
            if !old.exited() {
                old.stop();
            }
        }
        *slot = Some(child);
    }

    /// Stops and clears the generic executor, if any (spec `/clean`, `/init`
    /// with no uploaded action).
    pub async fn clear_generic(&self) {
        if let Some(mut child) = self.generic.lock().await.take() {
            child.stop();
        }
    }

    /// `/run`'s generic fallback (spec §4.E). On Interact error the slot is
    /// cleared and the (now-dead) child stopped; on success it's restored.
    pub async fn run_generic(&self, body: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let mut slot = self.generic.lock().await;
        let mut child = match slot.take() {
            None => return Err(ProxyError::NotInitialized),
            Some(child) => child,
        };

        if child.exited() {
            return Err(ProxyError::NotInitialized);
        }

        match child.interact(body).await {
            Ok(bytes) => {
                *slot = Some(child);
                Ok(bytes)
            }
            Err(err) => {
                child.stop();
                Err(err)
            }
        }
    }
}
