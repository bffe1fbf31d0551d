//! Complete runs against the fake provider with shell-script executors.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use astrolabe::client::ClusterStateName::{Creating, Idle};
use astrolabe::client::ResourceClient;
use astrolabe::config::{ExecutionMode, PollerSettings, RunSettings};
use astrolabe::controller::{
    Context, DataSeeder, FailureKind, TestReport, TestRunner, run_spec_tests,
};
use astrolabe::plan::TestPlanRegistry;

use crate::common::fixtures::{TestCaseBuilder, default_case};
use crate::common::scripts::ScriptDir;
use crate::mock_client::{Call, FakeProvider, FakeSeeder};

fn settings(executor: &Path) -> RunSettings {
    RunSettings::new("unused", executor, "build-1234")
        .with_project("MongoDB", "evergreen-project")
        .with_polling(PollerSettings::new(
            Duration::from_millis(20),
            Duration::from_secs(5),
        ))
        // Leaves the executor time to install its interrupt trap.
        .with_maintenance_grace(Duration::from_millis(300))
        .with_workload_stop_timeout(Duration::from_secs(5))
}

fn registry(names: &[&str]) -> TestPlanRegistry {
    let mut registry = TestPlanRegistry::new();
    for name in names {
        registry.add(default_case(name)).unwrap();
    }
    registry
}

async fn run(provider: &Arc<FakeProvider>, settings: RunSettings, registry: TestPlanRegistry) -> TestReport {
    run_with_cancel(provider, settings, registry, CancellationToken::new()).await
}

async fn run_with_cancel(
    provider: &Arc<FakeProvider>,
    settings: RunSettings,
    registry: TestPlanRegistry,
    cancel: CancellationToken,
) -> TestReport {
    let clusters = Arc::clone(provider);
    run_spec_tests(
        provider.as_ref(),
        move |_project| clusters as Arc<dyn ResourceClient>,
        settings,
        registry,
        cancel,
    )
    .await
}

/// Run provisioned cases directly, with a recording seeder.
async fn run_seeded(
    provider: &Arc<FakeProvider>,
    settings: RunSettings,
    registry: TestPlanRegistry,
    seeder: &Arc<FakeSeeder>,
) -> TestReport {
    let clusters = Arc::clone(provider) as Arc<dyn ResourceClient>;
    let ctx = Context::new(clusters, settings, CancellationToken::new())
        .with_seeder(Arc::clone(seeder) as Arc<dyn DataSeeder>);
    TestRunner::new(ctx).run(registry).await
}

/// A token the operator cancels after `delay`.
fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn test_sequential_run_passes_every_case() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new());
    let report = run(
        &provider,
        settings(&scripts.passing_executor()),
        registry(&["first", "second"]),
    )
    .await;

    assert!(report.passed(), "{report}");
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| o.stdout == "ok\n"));
    assert_eq!(provider.count(|c| matches!(c, Call::CreateCluster(_))), 2);
    assert_eq!(
        provider.count(|c| matches!(c, Call::ModifyProcessArguments(..))),
        2
    );
    assert_eq!(provider.count(|c| matches!(c, Call::CreateProject(_))), 1);
    assert_eq!(
        provider.count(|c| matches!(c, Call::AddNetworkAccess(entry) if entry.ends_with("0.0.0.0/0"))),
        1
    );
}

#[tokio::test]
async fn test_parallel_run_passes_every_case() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new().with_creation_script(&[Creating, Idle]));
    let report = run(
        &provider,
        settings(&scripts.passing_executor()).with_mode(ExecutionMode::Parallel),
        registry(&["first", "second", "third"]),
    )
    .await;

    assert!(report.passed(), "{report}");
    assert_eq!(report.outcomes.len(), 3);
}

#[tokio::test]
async fn test_failing_workload_fails_only_its_case() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new());
    let report = run(
        &provider,
        settings(&scripts.failing_executor(1, 0)),
        registry(&["first", "second"]),
    )
    .await;

    assert!(!report.passed());
    assert!(report.aborted.is_none());
    assert_eq!(report.failures(), 2);
    assert!(
        report
            .outcomes
            .iter()
            .all(|o| o.failure_kind() == Some(FailureKind::Failure))
    );
}

#[tokio::test]
async fn test_invalid_plan_never_gets_a_cluster() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new());
    let invalid = TestCaseBuilder::new("invalid").empty_final().build();
    let invalid_cluster = invalid.cluster_name.clone();

    let mut cases = registry(&["valid"]);
    cases.add(invalid).unwrap();

    let report = run(&provider, settings(&scripts.passing_executor()), cases).await;

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.errors(), 1);
    assert!(!provider.has_cluster(&invalid_cluster));
    assert_eq!(
        provider.count(|c| *c == Call::CreateCluster(invalid_cluster.clone())),
        0
    );
    let valid = report.outcomes.iter().find(|o| o.case_name == "valid").unwrap();
    assert!(valid.success);
}

#[tokio::test]
async fn test_readiness_timeout_fails_pending_cases() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new().with_creation_script(&[Creating]));
    let settings = settings(&scripts.passing_executor()).with_polling(PollerSettings::new(
        Duration::from_millis(20),
        Duration::from_millis(200),
    ));

    let report = run(&provider, settings, registry(&["first", "second"])).await;

    assert!(!report.passed());
    assert!(report.aborted.is_none());
    assert_eq!(report.errors(), 2);
}

#[tokio::test]
async fn test_rejected_credentials_abort_the_run() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new().rejecting_credentials());

    let report = run(
        &provider,
        settings(&scripts.passing_executor()),
        registry(&["first", "second"]),
    )
    .await;

    assert!(report.aborted.is_some());
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| !o.success));
}

#[tokio::test]
async fn test_missing_organization_aborts_before_clusters() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new().without_organizations());

    let report = run(
        &provider,
        settings(&scripts.passing_executor()),
        registry(&["first"]),
    )
    .await;

    assert!(report.aborted.is_some());
    assert_eq!(report.errors(), 1);
    assert_eq!(provider.count(|c| matches!(c, Call::CreateCluster(_))), 0);
}

#[tokio::test]
async fn test_clusters_are_deleted_when_requested() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new());
    let case_cluster = default_case("first").cluster_name;

    let report = run(
        &provider,
        settings(&scripts.passing_executor()).with_delete_clusters(true),
        registry(&["first"]),
    )
    .await;

    assert!(report.passed(), "{report}");
    assert!(!provider.has_cluster(&case_cluster));
}

#[tokio::test]
async fn test_test_data_is_seeded_before_the_workload() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new());
    let seeder = Arc::new(FakeSeeder::default());
    let docs = vec![json!({"_id": 1, "name": "a"}), json!({"_id": 2, "name": "b"})];
    let seeded = TestCaseBuilder::new("seeded").test_data(docs.clone()).build();
    let seeded_cluster = seeded.cluster_name.clone();

    let mut cases = registry(&["plain"]);
    cases.add(seeded).unwrap();

    let report = run_seeded(&provider, settings(&scripts.passing_executor()), cases, &seeder).await;

    assert!(report.passed(), "{report}");
    let calls = seeder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].database, "test_database");
    assert_eq!(calls[0].collection, "test_collection");
    assert_eq!(calls[0].documents, docs);
    assert!(calls[0].connection_string.starts_with("mongodb+srv://"));
    assert!(
        calls[0]
            .connection_string
            .contains(&format!("{seeded_cluster}.fake.mongodb.net"))
    );
}

#[tokio::test]
async fn test_failed_seeding_fails_only_its_case() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new());
    let seeder = Arc::new(FakeSeeder::failing());
    let seeded = TestCaseBuilder::new("seeded")
        .test_data(vec![json!({"x": 1})])
        .build();
    let seeded_cluster = seeded.cluster_name.clone();

    let mut cases = TestPlanRegistry::new();
    cases.add(seeded).unwrap();

    let report = run_seeded(&provider, settings(&scripts.passing_executor()), cases, &seeder).await;

    assert!(report.aborted.is_none());
    assert_eq!(report.errors(), 1);
    let outcome = &report.outcomes[0];
    assert!(outcome.stdout.is_empty(), "executor must not start");
    assert!(
        outcome
            .failure
            .as_ref()
            .unwrap()
            .message
            .contains("Test data seeding error")
    );
    assert_eq!(
        provider.count(|c| matches!(c, Call::ModifyProcessArguments(name, _) if *name == seeded_cluster)),
        0
    );
}

#[tokio::test]
async fn test_operator_cancel_aborts_sequential_run_and_cleans_up() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new().with_creation_script(&[Creating]));

    let report = run_with_cancel(
        &provider,
        settings(&scripts.passing_executor()).with_delete_clusters(true),
        registry(&["first", "second"]),
        cancel_after(Duration::from_millis(200)),
    )
    .await;

    let reason = report.aborted.as_deref().unwrap();
    assert!(reason.contains("Cancelled"), "{reason}");
    assert_eq!(report.errors(), 2);
    assert_eq!(provider.count(|c| matches!(c, Call::DeleteCluster(_))), 2);
    assert!(!provider.has_cluster(&default_case("first").cluster_name));
    assert!(!provider.has_cluster(&default_case("second").cluster_name));
}

#[tokio::test]
async fn test_operator_cancel_aborts_parallel_run() {
    let scripts = ScriptDir::new();
    let provider = Arc::new(FakeProvider::new().with_creation_script(&[Creating]));

    let report = run_with_cancel(
        &provider,
        settings(&scripts.passing_executor())
            .with_mode(ExecutionMode::Parallel)
            .with_delete_clusters(true),
        registry(&["first", "second"]),
        cancel_after(Duration::from_millis(200)),
    )
    .await;

    assert_eq!(report.aborted.as_deref(), Some("cancelled by operator"));
    assert_eq!(report.errors(), 2);
    assert_eq!(provider.count(|c| matches!(c, Call::DeleteCluster(_))), 2);
}

#[tokio::test]
async fn test_fatal_worker_error_stops_parallel_siblings() {
    let scripts = ScriptDir::new();
    let rejected = default_case("first").cluster_name;
    let provider = Arc::new(
        FakeProvider::new()
            .with_creation_script(&[Creating])
            .rejecting_cluster(&rejected),
    );

    let report = run(
        &provider,
        settings(&scripts.passing_executor()).with_mode(ExecutionMode::Parallel),
        registry(&["first", "second"]),
    )
    .await;

    let reason = report.aborted.as_deref().unwrap();
    assert!(reason.contains("401"), "{reason}");
    assert!(!reason.contains("cancelled by operator"));

    let message = |name: &str| {
        report
            .outcomes
            .iter()
            .find(|o| o.case_name == name)
            .and_then(|o| o.failure.as_ref())
            .map(|f| f.message.clone())
            .unwrap()
    };
    assert!(message("first").contains("401"));
    assert!(message("second").contains("Cancelled"));
    assert!(!message("second").contains("401"));
}
