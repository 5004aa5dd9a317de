//! Freeze/restore round trips against the mock provider.

mod common;

use benchflow_cloud::ResourceState;
use benchflow_controlplane::{BenchmarkRun, RunError, RunSnapshot, SNAPSHOT_VERSION};
use benchflow_core::{Cloud, RunConfig};
use common::{MockWorld, mock_registry, restorable_service, run_context, service, vm_group};

fn config(name: &str) -> RunConfig {
    let mut cfg = RunConfig {
        benchmark_name: name.to_string(),
        ..Default::default()
    };
    cfg.vm_groups
        .insert("default".to_string(), vm_group(Cloud::Gcp, "us-east1-b", 1));
    cfg
}

#[test]
fn test_freeze_restore_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let ctx = run_context(temp.path());

    let mut cfg = config("ycsb");
    cfg.non_relational_db = Some(restorable_service(Cloud::Gcp));

    let mut run = BenchmarkRun::new(cfg.clone(), ctx.clone(), &registry, "ycsb0").unwrap();
    run.provision().unwrap();
    let vm_id = run.vms()[0].resource().id().unwrap();

    run.set_freeze_path(Some(temp.path().join("snaps").join("run.json")));
    let path = run.freeze().unwrap();
    assert_eq!(path, temp.path().join("snaps").join("run.json"));

    let snapshot = RunSnapshot::load(&path).unwrap();
    let mut restored =
        BenchmarkRun::restore(cfg, ctx.clone(), &registry, &snapshot).unwrap();

    assert_eq!(restored.uuid(), run.uuid());
    assert_eq!(restored.sequence_number(), run.sequence_number());
    assert!(!restored.is_deleted());
    assert_eq!(restored.vms()[0].resource().state(), ResourceState::Exists);
    assert_eq!(restored.vms()[0].resource().id().as_deref(), Some(vm_id.as_str()));
    assert_eq!(
        restored.non_relational_db().unwrap().state(),
        ResourceState::Exists
    );

    // Provisioning a restored run creates nothing new.
    let creates = world.count_containing("create ");
    restored.provision().unwrap();
    assert_eq!(world.count_containing("create "), creates);

    // The restored run can tear down what the original process created.
    restored.delete();
    assert!(restored.is_deleted());
    assert_eq!(world.count_containing("delete network"), 1);
    assert_eq!(world.count_containing("delete vm "), 1);
}

#[test]
fn test_held_locks_survive_restore() {
    let temp = tempfile::tempdir().unwrap();
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let ctx = run_context(temp.path());

    let cfg = config("iperf");
    let run = BenchmarkRun::new(cfg.clone(), ctx.clone(), &registry, "iperf0").unwrap();

    let snapshot = {
        let _guard = run.networks_lock().acquire();
        RunSnapshot::capture(&run)
    };
    assert!(snapshot.locks.networks);
    assert!(!snapshot.locks.firewalls);

    let restored = BenchmarkRun::restore(cfg, ctx, &registry, &snapshot).unwrap();
    assert!(restored.networks_lock().is_held());
    assert!(restored.networks_lock().try_acquire().is_none());
    assert!(!restored.firewalls_lock().is_held());
}

#[test]
fn test_newer_snapshot_version_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let ctx = run_context(temp.path());

    let cfg = config("iperf");
    let run = BenchmarkRun::new(cfg.clone(), ctx.clone(), &registry, "iperf0").unwrap();

    let mut snapshot = RunSnapshot::capture(&run);
    snapshot.version = SNAPSHOT_VERSION + 1;

    let err = BenchmarkRun::restore(cfg, ctx, &registry, &snapshot).unwrap_err();
    assert!(matches!(err, RunError::SnapshotVersion { .. }));

    // Loading from disk rejects it too.
    let path = temp.path().join("future.json");
    std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
    let err = RunSnapshot::load(&path).unwrap_err();
    assert!(matches!(err, RunError::SnapshotVersion { .. }));
}

#[test]
fn test_freeze_falls_back_to_the_temp_dir() {
    let temp = tempfile::tempdir().unwrap();
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let ctx = run_context(temp.path());

    let mut run =
        BenchmarkRun::new(config("iperf"), ctx, &registry, "iperf0").unwrap();

    // The freeze path's parent is a plain file, so the write cannot land.
    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, "in the way").unwrap();
    run.set_freeze_path(Some(blocker.join("snap.json")));

    let path = run.freeze().unwrap();
    assert_eq!(path, temp.path().join("iperf0.snapshot.json"));
    assert!(path.exists());
}

#[test]
fn test_non_restorable_service_is_reprovisioned() {
    let temp = tempfile::tempdir().unwrap();
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let ctx = run_context(temp.path());

    let mut cfg = config("spanner_bench");
    cfg.spanner = Some(service(Cloud::Gcp));

    let mut run = BenchmarkRun::new(cfg.clone(), ctx.clone(), &registry, "sp0").unwrap();
    run.provision().unwrap();
    assert_eq!(world.count_containing("create spanner"), 1);

    let snapshot = RunSnapshot::capture(&run);
    let mut restored = BenchmarkRun::restore(cfg, ctx, &registry, &snapshot).unwrap();

    // Without the freeze/restore opt-in the service is not rehydrated.
    assert_eq!(restored.spanner().unwrap().state(), ResourceState::Absent);
    restored.provision().unwrap();
    assert_eq!(world.count_containing("create spanner"), 2);
}

#[test]
fn test_restore_clears_deleted_flag() {
    let temp = tempfile::tempdir().unwrap();
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let ctx = run_context(temp.path());

    let cfg = config("iperf");
    let mut run = BenchmarkRun::new(cfg.clone(), ctx.clone(), &registry, "iperf0").unwrap();
    run.provision().unwrap();
    run.delete();
    assert!(run.is_deleted());

    let snapshot = RunSnapshot::capture(&run);
    assert!(snapshot.deleted);

    let restored = BenchmarkRun::restore(cfg, ctx, &registry, &snapshot).unwrap();
    assert!(!restored.is_deleted());
}
