mod common;
use crate::common::{FakeLauncher, FakeScript, TaskDirBuilder, init_tracing, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use odm_task::pipeline::ARCHIVES;
use odm_task::task::{Task, TaskSnapshot};
use odm_task::types::{TaskOption, TaskStatus};

fn slow_worker() -> FakeScript {
    FakeScript::success()
        .with_output("\x1b[92m[INFO]\x1b[0m Running ODM\n")
        .with_delay(Duration::from_millis(25))
}

#[tokio::test]
async fn completed_run_executes_every_stage_in_order() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(3).with_odm_outputs().build();
    let launcher = FakeLauncher::new().script("python", slow_worker());
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    assert_eq!(task.status(), TaskStatus::Queued);
    assert_eq!(task.info().images_count, 3);
    assert_eq!(task.info().processing_time, -1);
    assert!(task.name().starts_with("Task of "));

    let handle = task.start().expect("queued task starts");
    assert_eq!(task.status(), TaskStatus::Running);

    with_timeout(handle).await.unwrap();

    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(task.info().processing_time > 0);
    assert_eq!(task.running_process_count(), 0);
    assert_eq!(
        launcher.launched_programs(),
        vec!["python", "gdal2tiles.py", "PotreeConverter"]
    );

    let output = task.output(0);
    assert_eq!(output[0], "[INFO] Running ODM\n");
    let compressing: Vec<String> = output
        .iter()
        .filter(|c| c.starts_with("Compressing"))
        .cloned()
        .collect();
    let expected: Vec<String> = ARCHIVES
        .iter()
        .map(|a| format!("Compressing {}\n", a.name))
        .collect();
    assert_eq!(compressing, expected);

    for archive in ARCHIVES {
        assert!(
            dir.project_dir().join(archive.name).is_file(),
            "{} missing",
            archive.name
        );
    }
}

#[tokio::test]
async fn tools_receive_working_directory_paths() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new();
    let task = Task::create(dir.uuid(), "tools", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    with_timeout(task.start().unwrap()).await.unwrap();

    let launched = launcher.launched();
    let tiler = &launched[1];
    let project = dir.project_dir();
    assert_eq!(
        tiler.args,
        vec![
            "-z".to_string(),
            "16-21".to_string(),
            "-n".to_string(),
            "-w".to_string(),
            "none".to_string(),
            project.join("odm_orthophoto/odm_orthophoto.tif").to_string_lossy().into_owned(),
            project.join("orthophoto_tiles").to_string_lossy().into_owned(),
        ]
    );

    let converter = &launched[2];
    assert_eq!(converter.args[1], "-o");
    assert!(converter.args[0].ends_with("odm_georeferenced_model.las"));
    assert!(converter.args[2].ends_with("potree_pointcloud"));
}

#[tokio::test]
async fn worker_command_carries_options_and_computed_keys() {
    init_tracing();
    let dir = TaskDirBuilder::new("t-gcp")
        .images(2)
        .gcp_file("gcp_list.txt")
        .gcp_file("notes.md")
        .build();
    let launcher = FakeLauncher::new();
    let options = vec![
        TaskOption::new("resize-to", 2400),
        TaskOption::new("fast-orthophoto", true),
        TaskOption::new("skip-3dmodel", false),
    ];
    let task = Task::create(dir.uuid(), "gcp", options, dir.context(Arc::new(launcher.clone()))).unwrap();

    assert_eq!(task.ground_control_files().len(), 1);
    with_timeout(task.start().unwrap()).await.unwrap();

    let worker = &launcher.launched()[0];
    let data_dir = std::fs::canonicalize(dir.data_dir()).unwrap();
    let gcp = std::fs::canonicalize(dir.project_dir().join("gcp/gcp_list.txt")).unwrap();

    assert_eq!(worker.program, "python");
    assert_eq!(
        worker.args,
        vec![
            "run.py".to_string(),
            "--fast-orthophoto".to_string(),
            "--odm_georeferencing-gcpFile".to_string(),
            gcp.to_string_lossy().into_owned(),
            "--odm_georeferencing-useGcp".to_string(),
            "--pmvs-num-cores".to_string(),
            "4".to_string(),
            "--project-path".to_string(),
            data_dir.to_string_lossy().into_owned(),
            "--resize-to".to_string(),
            "2400".to_string(),
            "t-gcp".to_string(),
        ]
    );
}

#[tokio::test]
async fn nonzero_worker_exit_fails_without_post_processing() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(3).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::exit_code(1).with_output("boom\n"));
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    with_timeout(task.start().unwrap()).await.unwrap();

    assert_eq!(task.status(), TaskStatus::failed("Process exited with code 1"));
    assert_eq!(launcher.launched_programs(), vec!["python"]);
    assert_eq!(task.output(0), vec!["boom\n"]);
    assert!(task.info().processing_time >= 0);
}

#[tokio::test]
async fn spawn_failure_is_reported_as_failed() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::spawn_failure());
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher))).unwrap();

    with_timeout(task.start().unwrap()).await.unwrap();

    let status = task.status();
    let message = status.error_message().expect("failed with a message");
    assert!(message.starts_with("Could not start process"), "{message}");
    assert_eq!(task.running_process_count(), 0);
}

#[tokio::test]
async fn failing_stage_aborts_the_pipeline() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).with_odm_outputs().build();
    let launcher = FakeLauncher::new().script("gdal2tiles.py", FakeScript::exit_code(2));
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    with_timeout(task.start().unwrap()).await.unwrap();

    assert_eq!(task.status(), TaskStatus::failed("Process exited with code 2"));
    assert_eq!(launcher.launched_programs(), vec!["python", "gdal2tiles.py"]);
    assert!(!dir.project_dir().join("all.zip").exists());
}

#[tokio::test]
async fn start_is_a_no_op_unless_queued() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::hanging());
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    let handle = task.start().unwrap();
    assert!(task.start().is_none());
    assert_eq!(task.status(), TaskStatus::Running);

    task.cancel().unwrap();
    with_timeout(handle).await.unwrap();
    assert!(task.start().is_none());
    assert_eq!(task.status(), TaskStatus::Canceled);
}

#[tokio::test]
async fn restart_after_completion_allows_a_fresh_run() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(3).build();
    let launcher = FakeLauncher::new().script("python", slow_worker());
    let task = Task::create(dir.uuid(), "survey", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    with_timeout(task.start().unwrap()).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    let first_created = task.info().date_created;
    assert!(!task.output(0).is_empty());

    tokio::time::sleep(Duration::from_millis(5)).await;
    task.restart().unwrap();

    let info = task.info();
    assert_eq!(info.status, TaskStatus::Queued);
    assert!(task.output(0).is_empty());
    assert_eq!(info.processing_time, -1);
    assert!(info.date_created > first_created);
    assert_eq!(info.images_count, 3);

    with_timeout(task.start().expect("restarted task starts")).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(launcher.launched_programs().len(), 6);
}

#[tokio::test]
async fn output_query_returns_suffix() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new().script(
        "python",
        FakeScript::exit_code(1)
            .with_output("a\n")
            .with_output("b\n")
            .with_output("c\n"),
    );
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher))).unwrap();
    with_timeout(task.start().unwrap()).await.unwrap();

    assert_eq!(task.output(0), vec!["a\n", "b\n", "c\n"]);
    assert_eq!(task.output(2), vec!["c\n"]);
    assert!(task.output(3).is_empty());
    assert!(task.output(100).is_empty());
}

#[tokio::test]
async fn snapshot_round_trip_requeues_running_tasks() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(2).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::hanging());
    let ctx = dir.context(Arc::new(launcher));
    let task = Task::create(dir.uuid(), "survey", vec![TaskOption::new("dsm", true)], Arc::clone(&ctx)).unwrap();

    let handle = task.start().unwrap();
    let snapshot: TaskSnapshot = task.serialize();
    assert_eq!(snapshot.status, TaskStatus::Running);

    let json = serde_json::to_string(&snapshot).unwrap();
    let restored = Task::from_snapshot(serde_json::from_str(&json).unwrap(), ctx).unwrap();

    assert_eq!(restored.status(), TaskStatus::Queued);
    assert_eq!(restored.name(), "survey");
    assert_eq!(restored.options(), task.options());
    assert_eq!(
        restored.info().date_created.timestamp_millis(),
        task.info().date_created.timestamp_millis()
    );
    assert_eq!(restored.info().images_count, 2);

    task.cancel().unwrap();
    with_timeout(handle).await.unwrap();
}

#[tokio::test]
async fn asset_paths_resolve_against_working_directory() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(FakeLauncher::new()))).unwrap();

    assert_eq!(task.asset_path("all.zip"), Some(dir.project_dir().join("all.zip")));
    assert!(
        task.asset_path("orthophoto.tif")
            .unwrap()
            .ends_with("odm_orthophoto/odm_orthophoto.tif")
    );
    assert_eq!(task.asset_path("foo.zip"), None);
}

#[tokio::test]
async fn test_mode_archives_canned_results() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let results = tempfile::tempdir().unwrap();
    odm_task_test_utils::builders::write_odm_outputs(results.path());

    let config = dir.config().test_mode(results.path(), false).build();
    let launcher = FakeLauncher::new();
    let ctx = Arc::new(odm_task::task::TaskContext::new(config).with_launcher(Arc::new(launcher)));
    let task = Task::create(dir.uuid(), "", vec![], ctx).unwrap();

    with_timeout(task.start().unwrap()).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);

    let textured = std::fs::File::open(dir.project_dir().join("textured_model.zip")).unwrap();
    let archive = zip::ZipArchive::new(textured).unwrap();
    assert_eq!(archive.len(), 4);
    assert_eq!(
        task.asset_path("orthophoto.png"),
        Some(results.path().join("odm_orthophoto/odm_orthophoto.png"))
    );
}
