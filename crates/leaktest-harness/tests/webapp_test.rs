//! End-to-end tests for the leak-test harness.
//!
//! Artifacts are JSON descriptors written to scratch files; a leaking
//! artifact stores a strong reference to its own loading context in a
//! process-wide registry during startup, which is exactly the condition
//! the harness exists to detect.

use leaktest_harness::{HarnessError, MetadataRegion, WebAppTest};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Region limit small enough that the pressure generator forces a pass
/// within a couple of seconds.
const TEST_REGION_LIMIT: usize = 4 * 1024 * 1024;

fn init() {
    MetadataRegion::init_with_limit(TEST_REGION_LIMIT);
    assert!(
        MetadataRegion::global().limit().is_some(),
        "process-wide region must be bounded"
    );
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_artifact(json: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("leaktest-war-{}.json", Uuid::new_v4()));
    std::fs::write(&path, json).expect("write artifact");
    path
}

#[tokio::test]
async fn clean_artifact_run_succeeds_and_cleans_up() {
    init();
    let artifact = write_artifact("{}");

    let mut test = WebAppTest::new()
        .war_path(&artifact)
        .ping_end_point("health")
        .deploy_duration(10);

    test.start().await.expect("start");
    let working_dir = test.working_dir().expect("working dir").to_path_buf();
    assert!(working_dir.exists());
    assert_ne!(test.port(), 0);

    // A non-leaking artifact must clear in a small fraction of the
    // two-minute ceiling; this bounds flakiness in CI.
    let stop_started = Instant::now();
    test.stop().await.expect("stop");
    assert!(
        stop_started.elapsed() < Duration::from_secs(30),
        "leak wait took {:?}, expected well under the ceiling",
        stop_started.elapsed()
    );

    assert!(!working_dir.exists(), "working directory must be removed");
    let _ = std::fs::remove_file(artifact);
}

#[tokio::test]
async fn leaking_artifact_is_detected() {
    init();
    let artifact = write_artifact(r#"{"name": "leaking", "leak_context": true}"#);

    let mut test = WebAppTest::new()
        .war_path(&artifact)
        .ping_end_point("health")
        .deploy_duration(10)
        .leak_duration(5)
        .test_leak(true);

    let error = test.run().await.expect_err("leak must be detected");
    assert!(matches!(error, HarnessError::LeakDetected(_)));

    // A failed verification must not mask teardown.
    let working_dir = test.working_dir().expect("working dir");
    assert!(!working_dir.exists(), "working directory must be removed");
    let _ = std::fs::remove_file(artifact);
}

#[tokio::test]
async fn leak_check_can_be_opted_out() {
    init();
    let artifact = write_artifact(r#"{"name": "leaking", "leak_context": true}"#);

    let mut test = WebAppTest::new()
        .war_path(&artifact)
        .deploy_duration(10)
        .test_leak(false);

    test.run().await.expect("leak check skipped entirely");
    let _ = std::fs::remove_file(artifact);
}

#[tokio::test]
async fn unready_artifact_fails_probe_and_still_cleans_up() {
    init();
    let artifact = write_artifact(r#"{"ready_delay_ms": 60000}"#);

    let mut test = WebAppTest::new()
        .war_path(&artifact)
        .ping_end_point("health")
        .deploy_duration(2);

    let error = test.run().await.expect_err("probe must time out");
    assert!(matches!(error, HarnessError::DeploymentNotReady(_)));

    let working_dir = test.working_dir().expect("working dir");
    assert!(!working_dir.exists(), "working directory must be removed");
    let _ = std::fs::remove_file(artifact);
}

#[tokio::test]
async fn failed_deployment_state_raises_lifecycle_error() {
    init();
    let artifact = write_artifact(r#"{"fail_startup": true}"#);

    let mut test = WebAppTest::new().war_path(&artifact).deploy_duration(5);

    let error = test.run().await.expect_err("startup failure must surface");
    match &error {
        HarnessError::Lifecycle { expected, actual } => {
            assert_eq!(expected, "started");
            assert!(actual.contains("failed"), "actual state was {actual}");
        }
        other => panic!("expected Lifecycle error, got {other}"),
    }

    let working_dir = test.working_dir().expect("working dir");
    assert!(!working_dir.exists(), "working directory must be removed");
    let _ = std::fs::remove_file(artifact);
}

#[tokio::test]
async fn descriptor_override_applies_on_top_of_artifact() {
    init();
    let artifact = write_artifact(r#"{"leak_context": true}"#);
    let override_path = write_artifact(r#"{"leak_context": false}"#);

    let mut test = WebAppTest::new()
        .war_path(&artifact)
        .context_path(&override_path)
        .deploy_duration(10)
        .leak_duration(30);

    // The override disables the leak, so the run must pass.
    test.run().await.expect("override must win");
    let _ = std::fs::remove_file(artifact);
    let _ = std::fs::remove_file(override_path);
}

#[tokio::test]
async fn teardown_is_idempotent() {
    init();
    let artifact = write_artifact("{}");

    let mut test = WebAppTest::new().war_path(&artifact).deploy_duration(10);
    test.run().await.expect("run");

    // A second stop (and its embedded teardown) must not raise.
    test.stop().await.expect("second stop is a no-op");
    test.teardown().await.expect("explicit extra teardown");
    let _ = std::fs::remove_file(artifact);
}

#[tokio::test]
async fn missing_war_path_fails_before_any_resource() {
    init();
    let mut test = WebAppTest::new();
    let error = test.start().await.expect_err("no war path");
    assert!(matches!(error, HarnessError::InvalidConfiguration(_)));
    assert!(test.working_dir().is_none(), "nothing may be provisioned");
}

#[tokio::test]
async fn nonexistent_war_file_fails_validation() {
    init();
    let mut test = WebAppTest::new().war_path("/nonexistent/leaking.war");
    let error = test.start().await.expect_err("missing file");
    match error {
        HarnessError::InvalidConfiguration(message) => {
            assert!(message.contains("does not exist"));
        }
        other => panic!("expected InvalidConfiguration, got {other}"),
    }
}
