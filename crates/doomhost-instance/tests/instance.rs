//! Integration tests for hosting and supervising instances, using shell
//! scripts in place of the engine.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use doomhost_instance::{
    CloseReason, GameMode, HostRequest, InstanceError, LaunchSettings, LifecycleState, PortPool,
    ServerRegistry, StartupOutcome,
};
use doomhost_session::{AccountStore, MemoryStore, UserRecord};
use tempfile::TempDir;

// =========================================================================
// Fake engines
// =========================================================================

/// Scripts are written once, before any test spawns a process, so no
/// script is ever open for writing while another thread forks.
struct FakeEngines {
    _dir: TempDir,
    ready: PathBuf,
    fail: PathBuf,
    ready_then_exit: PathBuf,
    never_ready: PathBuf,
}

static ENGINES: LazyLock<FakeEngines> = LazyLock::new(|| {
    let dir = tempfile::tempdir().expect("tempdir");
    let ready = write_script(
        dir.path(),
        "ready.sh",
        "echo 'Zandronum fake engine'\necho 'UDP Initialized.'\nexec sleep 30",
    );
    let fail = write_script(dir.path(), "fail.sh", "echo 'Could not find IWAD' >&2\nexit 1");
    let ready_then_exit = write_script(
        dir.path(),
        "ready_then_exit.sh",
        "echo 'UDP Initialized.'\nsleep 0.3\nexit 0",
    );
    let never_ready = write_script(dir.path(), "never_ready.sh", "echo 'loading'\nexec sleep 30");
    FakeEngines {
        _dir: dir,
        ready,
        fail,
        ready_then_exit,
        never_ready,
    }
});

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

struct Fixture {
    registry: ServerRegistry,
    store: Arc<MemoryStore>,
    owner: UserRecord,
}

fn fixture(engine: &Path, min_port: u16, max_port: u16) -> Fixture {
    let store = Arc::new(MemoryStore::with_accounts([("alice", "pw")]));
    let owner = store.get_user("alice").expect("store").expect("seeded user");
    let launch = LaunchSettings {
        executable: engine.to_path_buf(),
        ..LaunchSettings::default()
    };
    let shared: Arc<dyn AccountStore> = store.clone();
    let registry = ServerRegistry::new(PortPool::new(min_port, max_port).expect("range"), launch, shared);
    Fixture { registry, store, owner }
}

fn request() -> HostRequest {
    let mut request = HostRequest::new("Test", "doom2.wad", GameMode::Deathmatch);
    request.wads = vec!["dwango5.wad".into()];
    request
}

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_host_reaches_running_and_marks_online() {
    let fx = fixture(&ENGINES.ready, 10666, 10670);
    let handle = fx.registry.host(request(), &fx.owner).expect("host");

    assert_eq!(handle.state(), LifecycleState::Starting);
    assert_eq!(handle.port(), 10666);
    assert_eq!(handle.owner(), "alice");
    assert_eq!(fx.registry.len(), 1);
    assert!(handle.pid().is_some());

    assert_eq!(handle.wait_started(WAIT).await, StartupOutcome::Started);
    assert_eq!(handle.state(), LifecycleState::Running);

    let record = fx.store.server(handle.id()).expect("server recorded");
    assert!(record.online);
    assert_eq!(record.port, Some(10666));
    assert_eq!(record.user_id, fx.owner.id);
    assert_eq!(record.wads, vec!["dwango5.wad".to_string()]);

    handle.kill().await;
}

#[tokio::test]
async fn test_exit_before_ready_is_startup_failure() {
    let fx = fixture(&ENGINES.fail, 10666, 10670);
    let handle = fx.registry.host(request(), &fx.owner).expect("host");

    assert_eq!(handle.wait_started(WAIT).await, StartupOutcome::Failed);
    let status = handle.wait_closed().await;
    assert_eq!(status.state, LifecycleState::Closed);
    assert_eq!(status.reason, Some(CloseReason::StartupFailed));
    assert!(!status.started);

    assert!(fx.registry.is_empty());
    assert!(!fx.registry.is_port_allocated(10666));
    let record = fx.store.server(handle.id()).expect("server recorded");
    assert!(!record.online);
}

#[tokio::test]
async fn test_exit_after_ready_is_normal_stop() {
    let fx = fixture(&ENGINES.ready_then_exit, 10666, 10670);
    let handle = fx.registry.host(request(), &fx.owner).expect("host");

    assert_eq!(handle.wait_started(WAIT).await, StartupOutcome::Started);
    let status = handle.wait_closed().await;
    assert_eq!(status.reason, Some(CloseReason::Stopped));
    assert!(status.started);

    assert!(fx.registry.is_empty());
    let record = fx.store.server(handle.id()).expect("server recorded");
    assert!(!record.online, "online flag toggled back exactly once");
}

#[tokio::test]
async fn test_wait_started_pending_while_never_ready() {
    let fx = fixture(&ENGINES.never_ready, 10666, 10670);
    let handle = fx.registry.host(request(), &fx.owner).expect("host");

    assert_eq!(
        handle.wait_started(Duration::from_millis(200)).await,
        StartupOutcome::Pending
    );
    assert_eq!(handle.state(), LifecycleState::Starting);
    handle.kill().await;
}

// =========================================================================
// Kill
// =========================================================================

#[tokio::test]
async fn test_kill_running_closes_and_removes() {
    let fx = fixture(&ENGINES.ready, 10666, 10670);
    let handle = fx.registry.host(request(), &fx.owner).expect("host");
    assert_eq!(handle.wait_started(WAIT).await, StartupOutcome::Started);

    assert_eq!(handle.kill().await, CloseReason::Killed);
    assert_eq!(handle.state(), LifecycleState::Closed);
    assert!(fx.registry.get(10666).is_none());
    assert!(!fx.registry.is_port_allocated(10666));
    assert!(!fx.store.server(handle.id()).expect("record").online);

    // Idempotent.
    assert_eq!(handle.kill().await, CloseReason::Killed);
    assert!(!fx.store.server(handle.id()).expect("record").online);
}

#[tokio::test]
async fn test_kill_while_starting_leaves_record_offline() {
    let fx = fixture(&ENGINES.never_ready, 10666, 10670);
    let handle = fx.registry.host(request(), &fx.owner).expect("host");

    assert_eq!(handle.kill().await, CloseReason::Killed);
    let status = handle.status();
    assert_eq!(status.state, LifecycleState::Closed);
    assert!(!status.started);
    assert!(fx.registry.is_empty());
    assert!(!fx.store.server(handle.id()).expect("record").online);
}

#[tokio::test]
async fn test_kill_racing_natural_exit_removes_once() {
    let fx = fixture(&ENGINES.ready_then_exit, 10666, 10670);
    let handle = fx.registry.host(request(), &fx.owner).expect("host");
    assert_eq!(handle.wait_started(WAIT).await, StartupOutcome::Started);

    tokio::time::sleep(Duration::from_millis(280)).await;
    let reason = handle.kill().await;
    assert!(matches!(reason, CloseReason::Killed | CloseReason::Stopped));

    assert!(fx.registry.is_empty());
    assert!(!fx.registry.is_port_allocated(10666));
    assert!(!fx.store.server(handle.id()).expect("record").online);
}

#[tokio::test]
async fn test_kill_all_closes_every_instance() {
    let fx = fixture(&ENGINES.ready, 10666, 10670);
    let first = fx.registry.host(request(), &fx.owner).expect("host");
    let second = fx.registry.host(request(), &fx.owner).expect("host");

    assert_eq!(fx.registry.kill_all().await, 2);
    assert!(fx.registry.is_empty());
    assert!(!first.state().is_live());
    assert!(!second.state().is_live());
}

// =========================================================================
// Ports
// =========================================================================

#[tokio::test]
async fn test_pool_exhaustion_and_reuse() {
    let fx = fixture(&ENGINES.ready, 10666, 10666);
    let first = fx.registry.host(request(), &fx.owner).expect("host");

    let err = fx.registry.host(request(), &fx.owner).unwrap_err();
    assert!(matches!(err, InstanceError::NoFreePort { min: 10666, max: 10666 }));
    assert_eq!(fx.registry.len(), 1);

    first.kill().await;
    let again = fx.registry.host(request(), &fx.owner).expect("host after kill");
    assert_eq!(again.port(), 10666);
    again.kill().await;
}

#[tokio::test]
async fn test_lowest_free_port_is_reused() {
    let fx = fixture(&ENGINES.ready, 10666, 10668);
    let handles: Vec<_> = (0..3)
        .map(|_| fx.registry.host(request(), &fx.owner).expect("host"))
        .collect();
    let ports: Vec<u16> = handles.iter().map(|h| h.port()).collect();
    assert_eq!(ports, vec![10666, 10667, 10668]);

    handles[1].kill().await;
    let replacement = fx.registry.host(request(), &fx.owner).expect("host");
    assert_eq!(replacement.port(), 10667);

    let listed: Vec<u16> = fx.registry.list().iter().map(|s| s.port).collect();
    assert_eq!(listed, vec![10666, 10667, 10668]);
    fx.registry.kill_all().await;
}

#[tokio::test]
async fn test_spawn_failure_releases_port() {
    let fx = fixture(Path::new("/nonexistent/zandronum-server"), 10666, 10670);
    let err = fx.registry.host(request(), &fx.owner).unwrap_err();

    assert!(matches!(err, InstanceError::Spawn { .. }));
    assert!(fx.registry.is_empty());
    assert!(!fx.registry.is_port_allocated(10666));
}

#[tokio::test]
async fn test_summary_reports_request_fields() {
    let fx = fixture(&ENGINES.ready, 10666, 10670);
    let mut req = request();
    req.autorestart = true;
    let handle = fx.registry.host(req, &fx.owner).expect("host");

    let summary = handle.summary();
    assert_eq!(summary.hostname, "Test");
    assert_eq!(summary.gamemode, "deathmatch");
    assert!(summary.autorestart);
    assert_eq!(summary.owner, "alice");
    handle.kill().await;
}
