//! End-to-end flows through SyncEngine with in-memory collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use procsync_core::testing::{project, FakePortProbe, FakeSupervisor, MemoryFs};
use procsync_core::{
    process_key, Collaborators, EngineConfig, ProjectAction, ProjectStatus, SyncCoordinator,
    SyncEngine, SyncTrigger,
};

struct Harness {
    supervisor: Arc<FakeSupervisor>,
    probe: Arc<FakePortProbe>,
    fs: Arc<MemoryFs>,
    engine: Arc<SyncEngine>,
}

fn harness(fs: MemoryFs, probe: FakePortProbe) -> Harness {
    let supervisor = Arc::new(FakeSupervisor::new());
    let probe = Arc::new(probe);
    let fs = Arc::new(fs);
    let engine = Arc::new(SyncEngine::from_parts(
        EngineConfig::default(),
        Collaborators {
            supervisor: supervisor.clone(),
            probe: probe.clone(),
            fs: fs.clone(),
        },
        Vec::new(),
    ));
    Harness {
        supervisor,
        probe,
        fs,
        engine,
    }
}

#[tokio::test]
async fn test_import_start_and_reconcile() {
    let h = harness(
        MemoryFs::new()
            .with_file(
                "/work/shop/package.json",
                r#"{"name":"shop","scripts":{"dev":"vite"}}"#,
            )
            .with_file("/work/shop/yarn.lock", ""),
        FakePortProbe::all_free(),
    );
    let mut changes = h.engine.subscribe();

    let imported = h
        .engine
        .import_project(Path::new("/work/shop"))
        .await
        .expect("import");
    h.engine.start_project(&imported.id).await.expect("start");

    let applied = h.engine.reconcile_all().await;
    assert_eq!(applied.len(), 1);

    let change = changes.recv().await.expect("change event");
    assert_eq!(change.project_id, imported.id);
    assert_eq!(change.new_status, ProjectStatus::Running);
    assert_eq!(change.previous_status, ProjectStatus::Stopped);

    // A second pass with nothing new emits nothing.
    assert!(h.engine.reconcile_all().await.is_empty());
    assert!(changes.try_recv().is_err());

    let key = process_key("shop", "/work/shop");
    assert!(h.supervisor.calls().contains(&format!("start {}", key)));
}

#[tokio::test]
async fn test_double_start_leaves_one_live_process() {
    let h = harness(MemoryFs::new(), FakePortProbe::all_free());
    let demo = project("a", "demo", "/p/a");
    let key = demo.process_key();
    h.engine.add_project(demo).await.expect("add");

    h.engine.start_project("a").await.expect("first start");
    h.engine.start_project("a").await.expect("second start");

    assert_eq!(h.supervisor.live_count(&key), 1);
}

#[tokio::test]
async fn test_same_name_different_paths_stay_independent() {
    let h = harness(MemoryFs::new(), FakePortProbe::all_free());
    h.engine
        .add_project(project("a", "demo", "/p/a"))
        .await
        .expect("add a");
    h.engine
        .add_project(project("b", "demo", "/p/b"))
        .await
        .expect("add b");

    h.engine.start_project("a").await.expect("start a");
    h.engine.reconcile_all().await;

    assert_eq!(h.engine.project("a").expect("a").status, ProjectStatus::Running);
    assert_eq!(h.engine.project("b").expect("b").status, ProjectStatus::Stopped);
}

#[tokio::test]
async fn test_large_registry_reconciles_with_one_list() {
    let h = harness(MemoryFs::new(), FakePortProbe::all_free());
    for i in 0..8 {
        h.engine
            .add_project(project(&format!("p{}", i), "svc", &format!("/srv/{}", i)))
            .await
            .expect("add");
    }
    h.supervisor.insert(&process_key("svc", "/srv/3"), "errored");
    h.supervisor.clear_calls();

    let changes = h.engine.reconcile_all().await;

    assert_eq!(h.supervisor.call_count("list"), 1);
    assert_eq!(h.supervisor.call_count("describe"), 0);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new_status, ProjectStatus::Error);
}

#[tokio::test]
async fn test_unreachable_supervisor_keeps_stored_status() {
    let h = harness(MemoryFs::new(), FakePortProbe::all_free());
    let mut web = project("a", "web", "/p/web");
    web.status = ProjectStatus::Running;
    h.engine.add_project(web).await.expect("add");
    h.supervisor.set_reachable(false);

    assert!(h.engine.reconcile_all().await.is_empty());
    assert_eq!(h.engine.project("a").expect("a").status, ProjectStatus::Running);
}

#[tokio::test]
async fn test_detect_and_resolve_port_conflicts() {
    let h = harness(
        MemoryFs::new()
            .with_file("/p/a/.env", "PORT=3000\n")
            .with_file("/p/b/.env", "PORT=3000\n")
            .with_file("/p/c/vite.config.ts", "export default { server: { port: 5173 } }"),
        FakePortProbe::occupied(3000..=3005),
    );
    for (id, path) in [("a", "/p/a"), ("b", "/p/b"), ("c", "/p/c")] {
        h.engine
            .add_project(project(id, id, path))
            .await
            .expect("add");
    }

    let detection = h.engine.detect_project_ports(Path::new("/p/c")).await;
    assert_eq!(detection.default_port, Some(5173));

    let conflicts = h.engine.detect_port_conflicts(&h.engine.projects()).await;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].port, 3000);

    let report = h.engine.auto_resolve_port_conflicts(&conflicts).await;
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.resolved[0].project_id, "b");
    assert_eq!(report.resolved[0].to, 3006);
    assert_eq!(h.fs.get("/p/a/.env").as_deref(), Some("PORT=3000\n"));
    assert_eq!(h.fs.get("/p/b/.env").as_deref(), Some("PORT=3006\n"));
    assert!(!h.probe.checked().contains(&3000));

    assert!(h
        .engine
        .detect_port_conflicts(&h.engine.projects())
        .await
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_action_trigger_reconciles_after_settle() {
    let h = harness(MemoryFs::new(), FakePortProbe::all_free());
    h.engine
        .add_project(project("a", "web", "/p/web"))
        .await
        .expect("add");
    let coordinator = SyncCoordinator::new(h.engine.clone(), &EngineConfig::default());

    h.engine.start_project("a").await.expect("start");
    let outcome = coordinator.trigger(SyncTrigger::ActionCompleted {
        action: ProjectAction::Start,
        project_id: "a".to_string(),
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.engine.project("a").expect("a").status, ProjectStatus::Stopped);

    outcome.finished().await;
    assert_eq!(h.engine.project("a").expect("a").status, ProjectStatus::Running);
}
