mod common;
use crate::common::{FakeLauncher, FakeScript, TaskDirBuilder, init_tracing, wait_until, with_timeout};

use std::io::Write;
use std::sync::{Arc, Mutex};

use odm_task::errors::TaskError;
use odm_task::exec::TermSignal;
use odm_task::task::Task;
use odm_task::types::TaskStatus;

#[tokio::test]
async fn cancel_right_after_start_runs_no_stage() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(3).with_odm_outputs().build();
    let launcher = FakeLauncher::new();
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    let handle = task.start().unwrap();
    assert_eq!(task.status(), TaskStatus::Running);

    task.cancel().unwrap();
    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(task.running_process_count(), 0);

    with_timeout(handle).await.unwrap();

    assert_eq!(task.status(), TaskStatus::Canceled);
    assert!(launcher.launched().is_empty());
    assert!(!dir.project_dir().join("all.zip").exists());
    assert_eq!(task.info().processing_time, -1);
}

#[tokio::test]
async fn cancel_interrupts_the_running_worker() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(3).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::hanging().with_output("working\n"));
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    let handle = task.start().unwrap();
    wait_until(|| task.running_process_count() == 1).await;

    task.cancel().unwrap();

    // The state flips before the process has exited.
    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(task.running_process_count(), 0);
    assert_eq!(
        launcher.terminations(),
        vec![("python".to_string(), TermSignal::Interrupt)]
    );

    with_timeout(handle).await.unwrap();

    // The interrupted exit is not reported as a failure.
    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(launcher.launched_programs(), vec!["python"]);
    assert_eq!(task.output(0), vec!["working\n"]);
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn interrupted_worker_exit_is_not_logged_as_a_failure() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    // Current-thread runtime: the spawned run logs on this thread too.
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::hanging());
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    let handle = task.start().unwrap();
    wait_until(|| task.running_process_count() == 1).await;
    task.cancel().unwrap();
    with_timeout(handle).await.unwrap();

    let logs = logs.contents();
    assert!(logs.contains("canceled run exited"), "{logs}");
    assert!(!logs.contains("run failed"), "{logs}");
    assert!(!logs.contains("WARN"), "{logs}");
}

#[tokio::test]
async fn cancel_during_post_processing_stops_the_pipeline() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).with_odm_outputs().build();
    let launcher = FakeLauncher::new().script("gdal2tiles.py", FakeScript::hanging());
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    let handle = task.start().unwrap();
    wait_until(|| {
        launcher.launched_programs().len() == 2 && task.running_process_count() == 1
    })
    .await;

    task.cancel().unwrap();
    with_timeout(handle).await.unwrap();

    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(
        launcher.terminations(),
        vec![("gdal2tiles.py".to_string(), TermSignal::Interrupt)]
    );
    assert_eq!(launcher.launched_programs(), vec!["python", "gdal2tiles.py"]);
    assert!(!dir.project_dir().join("all.zip").exists());
}

#[tokio::test]
async fn cancel_twice_reports_already_canceled() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(FakeLauncher::new()))).unwrap();

    task.cancel().unwrap();
    let err = task.cancel().unwrap_err();

    assert!(matches!(err, TaskError::AlreadyCanceled));
    assert_eq!(err.to_string(), "Task already cancelled");
    assert_eq!(task.status(), TaskStatus::Canceled);
}

#[tokio::test]
async fn canceled_queued_task_cannot_start_until_restarted() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new();
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    task.cancel().unwrap();
    assert!(task.start().is_none());
    assert!(launcher.launched().is_empty());

    task.restart().unwrap();
    with_timeout(task.start().unwrap()).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[tokio::test]
async fn stale_run_cannot_touch_a_restarted_task() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::hanging().with_output("old\n"));
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    let first = task.start().unwrap();
    wait_until(|| task.running_process_count() == 1).await;
    task.cancel().unwrap();
    task.restart().unwrap();

    let launcher = launcher.script("python", FakeScript::exit_code(4).with_output("new\n"));
    let second = task.start().unwrap();

    with_timeout(first).await.unwrap();
    with_timeout(second).await.unwrap();

    assert_eq!(task.status(), TaskStatus::failed("Process exited with code 4"));
    assert_eq!(task.output(0), vec!["new\n"]);
    assert_eq!(launcher.launched_programs(), vec!["python", "python"]);
}

#[tokio::test]
async fn cleanup_cancels_and_removes_working_directory() {
    init_tracing();
    let dir = TaskDirBuilder::new("t1").images(1).build();
    let launcher = FakeLauncher::new().script("python", FakeScript::hanging());
    let task = Task::create(dir.uuid(), "", vec![], dir.context(Arc::new(launcher.clone()))).unwrap();

    let handle = task.start().unwrap();
    wait_until(|| task.running_process_count() == 1).await;

    task.cleanup().unwrap();

    assert_eq!(task.status(), TaskStatus::Canceled);
    assert!(!dir.project_dir().exists());
    assert_eq!(launcher.terminations().len(), 1);
    with_timeout(handle).await.unwrap();
}
