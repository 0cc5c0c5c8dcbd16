use std::collections::HashMap;
use std::path::PathBuf;

use whiskproxy::config::ProxyConfig;
use whiskproxy::executor::kind;
use whiskproxy::registry::ExecutorRegistry;

mod common;

fn script_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("whiskproxy-tests-{}-scripts", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create script dir");
    dir
}

fn write_into(dir: &PathBuf, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
}

fn test_config(dir: PathBuf) -> ProxyConfig {
    ProxyConfig {
        port: 0,
        base_dir: std::env::temp_dir().join("whiskproxy-tests-unused-actions"),
        compiler: None,
        execution_env: None,
        wait_for_ack: false,
        debug: false,
        base_env: HashMap::new(),
        script_dir: dir,
        log_stdout_path: std::env::temp_dir().join("whiskproxy-tests-registry-stdout.log"),
        log_stderr_path: std::env::temp_dir().join("whiskproxy-tests-registry-stderr.log"),
    }
}

#[tokio::test]
async fn load_and_run_warm_round_trip() {
    let dir = script_dir();
    let alex = &kind::MODEL_KINDS[0];
    write_into(&dir, alex.warm_script, common::ECHO_LOOP_SCRIPT);
    write_into(&dir, alex.cold_script, common::COLD_ONESHOT_SCRIPT);

    let config = test_config(dir);
    let registry = ExecutorRegistry::new(&config, common::log_sinks("registry-warm"));

    registry.load(alex).await.expect("load should succeed");
    let result = registry
        .run_warm(alex, br#"{"value": 1}"#)
        .await
        .expect("warm slot should be running");
    assert_eq!(result.unwrap(), br#"{"ok": true}"#.to_vec());
}

#[tokio::test]
async fn loading_a_second_kind_stops_the_first() {
    let dir = script_dir();
    let alex = &kind::MODEL_KINDS[0];
    let vgg = &kind::MODEL_KINDS[1];
    write_into(&dir, alex.warm_script, common::ECHO_LOOP_SCRIPT);
    write_into(&dir, alex.cold_script, common::COLD_ONESHOT_SCRIPT);
    write_into(&dir, vgg.warm_script, common::ECHO_LOOP_SCRIPT);
    write_into(&dir, vgg.cold_script, common::COLD_ONESHOT_SCRIPT);

    let config = test_config(dir);
    let registry = ExecutorRegistry::new(&config, common::log_sinks("registry-exclusive"));

    registry.load(alex).await.expect("alex loads");
    registry.load(vgg).await.expect("vgg loads");

    // I1: at most one warm executor system-wide. alex must have been
    // stopped when vgg loaded, so /run for alex falls through to cold.
    assert!(registry.run_warm(alex, b"{}").await.is_none());
    assert!(registry.run_warm(vgg, b"{}").await.is_some());
}

#[tokio::test]
async fn cold_slot_is_replaced_after_every_run() {
    let dir = script_dir();
    let alex = &kind::MODEL_KINDS[0];
    write_into(&dir, alex.warm_script, common::ECHO_LOOP_SCRIPT);
    write_into(&dir, alex.cold_script, common::COLD_ONESHOT_SCRIPT);

    let config = test_config(dir);
    let registry = ExecutorRegistry::new(&config, common::log_sinks("registry-cold"));

    let first = registry.run_cold(alex).await.expect("first cold run");
    assert_eq!(first, br#"{"ok": true, "result": "cold-done"}"#.to_vec());

    // I3: the slot holds a fresh, unused executor immediately after —
    // running it again must work exactly the same way.
    let second = registry.run_cold(alex).await.expect("second cold run");
    assert_eq!(second, br#"{"ok": true, "result": "cold-done"}"#.to_vec());
}

#[tokio::test]
async fn offload_on_never_loaded_kind_is_a_no_op() {
    let dir = script_dir();
    let alex = &kind::MODEL_KINDS[0];
    write_into(&dir, alex.warm_script, common::ECHO_LOOP_SCRIPT);
    write_into(&dir, alex.cold_script, common::COLD_ONESHOT_SCRIPT);

    let config = test_config(dir);
    let registry = ExecutorRegistry::new(&config, common::log_sinks("registry-offload"));

    registry.offload(alex).await.expect("offload on absent slot is a no-op");
}
