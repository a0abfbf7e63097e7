//! Configuration files, environment overrides and persisted agent state.

use crate::prelude::*;
use colony_runtime::{Runtime, RuntimeConfig};
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

fn clear_env() {
    for var in ["COLONY_CONFIG", "COLONY_QUEUE_CAPACITY", "COLONY_MONITOR_INTERVAL_MS"] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn env_overrides_the_config_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("colony.toml");
    std::fs::write(
        &path,
        "queue_capacity = 64\n\n[monitor]\ninterval = \"100ms\"\n",
    )
    .unwrap();
    std::env::set_var("COLONY_CONFIG", &path);
    std::env::set_var("COLONY_QUEUE_CAPACITY", "32");

    let config = RuntimeConfig::load(None).unwrap();
    clear_env();

    assert_eq!(config.monitor_interval, Duration::from_millis(100));
    let runtime = Runtime::new(config).unwrap();
    assert_eq!(runtime.bus().capacity(), 32);
}

#[test]
#[serial]
fn broken_config_file_is_reported() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("colony.toml");
    std::fs::write(&path, "queue_capacity = \"lots\"\n").unwrap();

    let err = RuntimeConfig::load(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().contains("colony.toml"), "{err}");
}

#[test]
fn agent_state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        persist_state: true,
        state_dir: Some(dir.path().to_path_buf()),
        ..fast_config()
    };

    let runtime = Runtime::new(config.clone()).unwrap();
    let agent = runtime.spawn_agent("keeper").unwrap();
    agent.state().set("shift", json!("night")).unwrap();
    runtime.shutdown();
    drop(agent);
    drop(runtime);

    let runtime = Runtime::new(config).unwrap();
    let agent = runtime.spawn_agent("keeper").unwrap();
    assert_eq!(agent.state().get("shift"), Some(json!("night")));
    assert!(agent.status_report().state.persistent);
}
