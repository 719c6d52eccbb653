#![allow(dead_code, unused_imports)]

pub use odm_task_test_utils::{
    ConfigBuilder, FakeLauncher, FakeScript, TaskDir, TaskDirBuilder, init_tracing, wait_until,
    with_timeout,
};
