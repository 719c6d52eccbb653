mod common;
use crate::common::{ConfigBuilder, FakeLauncher, init_tracing};

use std::path::Path;
use std::sync::Arc;

use odm_task::fs::FileSystem;
use odm_task::fs::mock::MockFileSystem;
use odm_task::task::{JsonFileStore, MemoryStore, Task, TaskContext, TaskStore};
use odm_task::types::{TaskOption, TaskStatus};

fn mock_context(fs: &MockFileSystem) -> Arc<TaskContext> {
    let config = ConfigBuilder::new(Path::new("/data")).max_cores(2).build();
    Arc::new(
        TaskContext::new(config)
            .with_fs(Arc::new(fs.clone()))
            .with_launcher(Arc::new(FakeLauncher::new())),
    )
}

fn seeded_fs() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("/data/t1/images/a.jpg", b"x".to_vec());
    fs.add_file("/data/t1/images/b.jpg", b"x".to_vec());
    fs.add_file("/data/t1/gcp/gcp_list.txt", b"WGS84".to_vec());
    fs
}

#[test]
fn json_store_round_trips_snapshots() {
    init_tracing();
    let fs = seeded_fs();
    let ctx = mock_context(&fs);
    let task = Task::create("t1", "survey", vec![TaskOption::new("resize-to", 2400)], ctx).unwrap();

    let store = JsonFileStore::in_data_dir(Arc::new(fs.clone()), Path::new("/data"));
    assert!(store.load().unwrap().is_empty());

    store.upsert(task.serialize()).unwrap();
    assert!(fs.is_file(Path::new("/data/tasks.json")));

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].uuid, "t1");
    assert_eq!(loaded[0].name, "survey");
    assert_eq!(loaded[0].status, TaskStatus::Queued);
    assert_eq!(loaded[0].options, vec![TaskOption::new("resize-to", 2400)]);
}

#[test]
fn stored_json_uses_wire_names() {
    init_tracing();
    let fs = seeded_fs();
    let task = Task::create("t1", "survey", vec![], mock_context(&fs)).unwrap();
    let store = JsonFileStore::in_data_dir(Arc::new(fs.clone()), Path::new("/data"));
    store.save(&[task.serialize()]).unwrap();

    let raw = fs.read_to_string(Path::new("/data/tasks.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entry = &value[0];
    assert_eq!(entry["uuid"], "t1");
    assert_eq!(entry["status"]["code"], 10);
    assert!(entry["dateCreated"].is_i64());
    assert!(entry.get("images").is_none());
}

#[test]
fn reloaded_running_task_is_requeued() {
    init_tracing();
    let fs = seeded_fs();
    let ctx = mock_context(&fs);
    let task = Task::create("t1", "survey", vec![], Arc::clone(&ctx)).unwrap();

    let mut snapshot = task.serialize();
    snapshot.status = TaskStatus::Running;
    let store = MemoryStore::new();
    store.upsert(snapshot).unwrap();

    let restored: Vec<Task> = store
        .load()
        .unwrap()
        .into_iter()
        .map(|s| Task::from_snapshot(s, Arc::clone(&ctx)).unwrap())
        .collect();

    assert_eq!(restored[0].status(), TaskStatus::Queued);
    assert_eq!(restored[0].images().len(), 2);
}

#[test]
fn reloaded_terminal_status_is_kept() {
    init_tracing();
    let fs = seeded_fs();
    let ctx = mock_context(&fs);
    let task = Task::create("t1", "", vec![], Arc::clone(&ctx)).unwrap();

    let mut snapshot = task.serialize();
    snapshot.status = TaskStatus::failed("Process exited with code 1");
    let restored = Task::from_snapshot(snapshot, ctx).unwrap();

    assert_eq!(
        restored.status().error_message(),
        Some("Process exited with code 1")
    );
    restored.restart().unwrap();
    assert_eq!(restored.status(), TaskStatus::Queued);
}

#[test]
fn worker_command_uses_filesystem_paths() {
    init_tracing();
    let fs = seeded_fs();
    let task = Task::create("t1", "", vec![], mock_context(&fs)).unwrap();

    let spec = task.worker_command().unwrap();
    assert_eq!(
        spec.to_string(),
        "python run.py --odm_georeferencing-gcpFile /data/t1/gcp/gcp_list.txt \
         --odm_georeferencing-useGcp --pmvs-num-cores 2 --project-path /data t1"
    );
}

#[test]
fn cleanup_removes_only_the_task_directory() {
    init_tracing();
    let fs = seeded_fs();
    fs.add_file("/data/t2/images/c.jpg", b"x".to_vec());
    let task = Task::create("t1", "", vec![], mock_context(&fs)).unwrap();

    task.cleanup().unwrap();

    assert!(!fs.exists(Path::new("/data/t1")));
    assert!(fs.exists(Path::new("/data/t2/images/c.jpg")));
}
