use std::collections::HashMap;
use std::env;

/// Prefix OpenWhisk-style environment variables that must be propagated
/// verbatim into every child process (spec §6).
pub const RESERVED_ENV_PREFIX: &str = "__OW_";

/// Proxy version string, propagated to every child as `__OW_PROXY_VERSION`
/// (original: `ap.env["__OW_PROXY_VERSION"] = Version`).
pub const PROXY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Proxy-wide configuration, read once at startup. Mirrors the teacher's
/// `Config::from_env()` shape but sources action-proxy knobs instead of
/// model API keys.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// TCP port the dispatcher binds (spec §6: default 8080).
    pub port: u16,
    /// Directory under which uploaded action codebases are unpacked
    /// (spec §6: `./action/<N>/bin/exec`).
    pub base_dir: std::path::PathBuf,
    /// Compiler to use for on-the-fly source compilation (`OW_COMPILER`).
    pub compiler: Option<String>,
    /// Expected execution-environment tag; `/init` hard-fails if the
    /// uploaded action's `exec.env` doesn't match (`OW_EXECUTION_ENV`).
    pub execution_env: Option<String>,
    /// Require the `{"ok": true}` ack line before a child is considered
    /// started (`OW_WAIT_FOR_ACK`).
    pub wait_for_ack: bool,
    /// Enables the `/tmp/action.log` debug sink and verbose `tracing::debug!`.
    pub debug: bool,
    /// `__OW_`-prefixed variables from the proxy's own environment, snapshot
    /// at startup and overlaid with init-payload values per request.
    pub base_env: HashMap<String, String>,
    /// Directory holding the per-kind warm/cold model scripts named by the
    /// `ModelKind` table (`WHISK_SCRIPT_DIR`, default `_test`, mirroring the
    /// original's `_test/loadalex.sh`-style fixture layout).
    pub script_dir: std::path::PathBuf,
    /// Where merged child stdout (and copied-over stderr) is appended.
    pub log_stdout_path: std::path::PathBuf,
    /// Where child stderr is appended before being copied into stdout.
    pub log_stderr_path: std::path::PathBuf,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let debug = env::var("OW_DEBUG").is_ok_and(|v| !v.is_empty());
        if debug {
            // The teacher's main.rs sets its own env flag before doing
            // anything else so downstream code can observe it; the original
            // proxy does the same with OW_DEBUG=1 for the debug CLI flag.
            // SAFETY: single-threaded startup, before any child is spawned.
            unsafe {
                env::set_var("OW_DEBUG", "1");
            }
        }

        let mut base_env: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(RESERVED_ENV_PREFIX))
            .collect();
        base_env.insert("__OW_PROXY_VERSION".to_string(), PROXY_VERSION.to_string());
        if debug {
            // The original also folds OW_DEBUG into the child-facing env,
            // not just its own process env (main.go sets OW_DEBUG=1 then
            // the executor inherits it via ap.env).
            base_env.insert("OW_DEBUG".to_string(), "1".to_string());
        }

        let script_dir = env::var("WHISK_SCRIPT_DIR")
            .ok()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::path::PathBuf::from("_test"));

        let log_stdout_path = env::var("WHISK_STDOUT_LOG")
            .ok()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("whiskproxy-stdout.log"));
        let log_stderr_path = env::var("WHISK_STDERR_LOG")
            .ok()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("whiskproxy-stderr.log"));

        Self {
            port,
            base_dir: std::path::PathBuf::from("./action"),
            compiler: env::var("OW_COMPILER").ok().filter(|s| !s.is_empty()),
            execution_env: env::var("OW_EXECUTION_ENV").ok().filter(|s| !s.is_empty()),
            wait_for_ack: env::var("OW_WAIT_FOR_ACK").is_ok_and(|v| !v.is_empty()),
            debug,
            base_env,
            script_dir,
            log_stdout_path,
            log_stderr_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_8080() {
        // Avoid mutating the real process env from a parallel test run;
        // only assert the fallback path when PORT is absent.
        if env::var("PORT").is_err() {
            let config = ProxyConfig::from_env();
            assert_eq!(config.port, 8080);
        }
    }

    #[test]
    fn base_env_only_keeps_reserved_prefix() {
        // SAFETY: test runs single-threaded w.r.t. this var name.
        unsafe {
            env::set_var("__OW_TEST_KEY", "value");
            env::set_var("NOT_RESERVED_TEST_KEY", "other");
        }
        let config = ProxyConfig::from_env();
        assert_eq!(
            config.base_env.get("__OW_TEST_KEY").map(String::as_str),
            Some("value")
        );
        assert!(!config.base_env.contains_key("NOT_RESERVED_TEST_KEY"));
        unsafe {
            env::remove_var("__OW_TEST_KEY");
            env::remove_var("NOT_RESERVED_TEST_KEY");
        }
    }
}
