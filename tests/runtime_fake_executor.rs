// tests/runtime_fake_executor.rs

use std::sync::Arc;
use std::time::Duration;

use flowgraph::dag::{GraphCompiler, Task};
use flowgraph::engine::Runtime;
use flowgraph::exec::NullCollector;
use flowgraph::scheduler::{Scheduler, SchedulerOptions, SharedScheduler};
use flowgraph::store::{JobRecordStore, MemoryJobRecordStore};
use flowgraph::types::TaskState;
use flowgraph_test_utils::builders::TaskBuilder;
use flowgraph_test_utils::fake_executor::FakeExecutor;
use flowgraph_test_utils::{fast_runtime, init_tracing, with_timeout};

fn shared(tasks: Vec<Task>, store: Box<dyn JobRecordStore>) -> SharedScheduler {
    let dags = GraphCompiler::from_tasks(tasks).unwrap().compile().unwrap();
    SharedScheduler::new(Scheduler::new(dags, store, SchedulerOptions::default()))
}

fn chain() -> Vec<Task> {
    let a = TaskBuilder::shell("a").output("x").build();
    let b = TaskBuilder::shell("b").output("y").input_from("in", &a, "x").build();
    let c = TaskBuilder::shell("c").input_from("in", &b, "y").build();
    vec![a, b, c]
}

#[tokio::test]
async fn chain_runs_in_dependency_order() {
    init_tracing();
    let scheduler = shared(chain(), Box::new(MemoryJobRecordStore::new()));
    let executor = FakeExecutor::new();

    let runtime = Runtime::new(
        scheduler.clone(),
        Arc::new(executor.clone()),
        Arc::new(NullCollector),
        fast_runtime(&["h1"]),
    );
    let report = with_timeout(runtime.run()).await.unwrap();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.summary.done, 3);
    assert_eq!(executor.executed_ids(), vec!["a", "b", "c"]);

    let c = scheduler.task("c").unwrap().unwrap();
    assert_eq!(c.inputs["in"].id(), FakeExecutor::output_id("b", "y"));
}

#[tokio::test]
async fn failure_blocks_everything_downstream() {
    init_tracing();
    let mut tasks = chain();
    tasks.push(TaskBuilder::shell("other").build());
    let scheduler = shared(tasks, Box::new(MemoryJobRecordStore::new()));
    let executor = FakeExecutor::new().failing("a");

    let runtime = Runtime::new(
        scheduler.clone(),
        Arc::new(executor.clone()),
        Arc::new(NullCollector),
        fast_runtime(&["h1"]),
    );
    let report = with_timeout(runtime.run()).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "a");
    assert!(report.failed[0].1.contains("on purpose"));
    assert_eq!(report.blocked, vec!["b", "c"]);
    assert_eq!(report.summary.done, 1);

    let mut ran = executor.executed_ids();
    ran.sort();
    assert_eq!(ran, vec!["a", "other"]);
    assert_eq!(scheduler.task("b").unwrap().unwrap().state, TaskState::Pending);
}

#[tokio::test]
async fn downstream_work_stays_on_the_host_holding_its_inputs() {
    init_tracing();
    let scheduler = shared(chain(), Box::new(MemoryJobRecordStore::new()));
    let executor = FakeExecutor::new().with_delay(Duration::from_millis(2));

    let runtime = Runtime::new(
        scheduler.clone(),
        Arc::new(executor.clone()),
        Arc::new(NullCollector),
        fast_runtime(&["h1", "h2"]),
    );
    let report = with_timeout(runtime.run()).await.unwrap();
    assert!(report.is_success(), "{report:?}");

    let (x_hosts, y_hosts) = scheduler
        .with(|s| {
            let index = s.locality_index();
            (
                index.hosts_of(&FakeExecutor::output_id("a", "x")).cloned(),
                index.hosts_of(&FakeExecutor::output_id("b", "y")).cloned(),
            )
        })
        .unwrap();
    let x_hosts = x_hosts.expect("x was recorded");
    assert_eq!(x_hosts.len(), 1);
    assert_eq!(y_hosts.expect("y was recorded"), x_hosts);
}

#[tokio::test]
async fn independent_tasks_spread_over_hosts() {
    let tasks = (0..4)
        .map(|i| TaskBuilder::shell(&format!("t{i}")).output("o").build())
        .collect();
    let scheduler = shared(tasks, Box::new(MemoryJobRecordStore::new()));
    let executor = FakeExecutor::new().with_delay(Duration::from_millis(5));

    let runtime = Runtime::new(
        scheduler,
        Arc::new(executor.clone()),
        Arc::new(NullCollector),
        fast_runtime(&["h1", "h2"]),
    );
    let report = with_timeout(runtime.run()).await.unwrap();

    assert!(report.is_success(), "{report:?}");
    let mut ran = executor.executed_ids();
    ran.sort();
    assert_eq!(ran, vec!["t0", "t1", "t2", "t3"]);
}

#[tokio::test]
async fn second_run_with_same_records_executes_nothing() {
    init_tracing();
    let records = MemoryJobRecordStore::new();

    let first = FakeExecutor::new();
    let report = with_timeout(
        Runtime::new(
            shared(chain(), Box::new(records.clone())),
            Arc::new(first.clone()),
            Arc::new(NullCollector),
            fast_runtime(&["h1"]),
        )
        .run(),
    )
    .await
    .unwrap();
    assert!(report.is_success());
    assert_eq!(first.executed_ids().len(), 3);
    assert_eq!(records.len(), 3);

    let second = FakeExecutor::new();
    let report = with_timeout(
        Runtime::new(
            shared(chain(), Box::new(records.clone())),
            Arc::new(second.clone()),
            Arc::new(NullCollector),
            fast_runtime(&["h1"]),
        )
        .run(),
    )
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.done, 3);
    assert!(second.executed_ids().is_empty());
}

#[tokio::test]
async fn unplaceable_task_ends_in_a_stall() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("remote.dat");
    std::fs::write(&data, "only on some other host").unwrap();

    let task = TaskBuilder::shell("stuck").source("data", &data).build();
    let scheduler = shared(vec![task], Box::new(MemoryJobRecordStore::new()));

    let mut opts = fast_runtime(&["h1"]);
    opts.stall_timeout = Some(Duration::from_millis(50));
    let runtime = Runtime::new(
        scheduler,
        Arc::new(FakeExecutor::new()),
        Arc::new(NullCollector),
        opts,
    );
    let report = with_timeout(runtime.run()).await.unwrap();

    assert!(report.stalled);
    assert_eq!(report.stranded, vec!["stuck"]);
    assert!(!report.is_success());
}

#[tokio::test]
async fn unplaceable_task_stalls_without_a_timeout() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("remote.dat");
    std::fs::write(&data, "held by no worker").unwrap();

    let stuck = TaskBuilder::shell("stuck").source("data", &data).build();
    let free = TaskBuilder::shell("free").build();
    let scheduler = shared(vec![stuck, free], Box::new(MemoryJobRecordStore::new()));
    let executor = FakeExecutor::new();

    let opts = fast_runtime(&["h1", "h2"]);
    assert!(opts.stall_timeout.is_none());
    let runtime = Runtime::new(
        scheduler,
        Arc::new(executor.clone()),
        Arc::new(NullCollector),
        opts,
    );
    let report = with_timeout(runtime.run()).await.unwrap();

    assert!(report.stalled);
    assert_eq!(report.stranded, vec!["stuck"]);
    assert_eq!(report.summary.done, 1);
    assert_eq!(executor.executed_ids(), vec!["free"]);
}
