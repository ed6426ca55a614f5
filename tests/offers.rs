// tests/offers.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use flowgraph::dag::{GraphCompiler, Task};
use flowgraph::engine::offers::{CPU_SLICE, MEM_SLICE_MB};
use flowgraph::engine::{OfferScheduler, PlacementUpdate, ResourceOffer};
use flowgraph::exec::{ExecutionResult, ExecutionService, JobOutput, NullCollector};
use flowgraph::scheduler::{Scheduler, SchedulerOptions, SharedScheduler};
use flowgraph::store::MemoryJobRecordStore;
use flowgraph::types::TaskState;
use flowgraph_test_utils::builders::TaskBuilder;
use flowgraph_test_utils::{fast_wait, with_timeout};

fn adapter(tasks: Vec<Task>, max_servers: usize) -> (OfferScheduler, SharedScheduler) {
    let dags = GraphCompiler::from_tasks(tasks).unwrap().compile().unwrap();
    let scheduler = SharedScheduler::new(Scheduler::new(
        dags,
        Box::new(MemoryJobRecordStore::new()),
        SchedulerOptions::default(),
    ));
    let service = Arc::new(ExecutionService::new(
        "offers",
        fast_wait(),
        Duration::from_millis(1),
    ));
    let offers = OfferScheduler::new(scheduler.clone(), service, Arc::new(NullCollector), max_servers);
    (offers, scheduler)
}

fn offer(id: &str, host: &str) -> ResourceOffer {
    ResourceOffer {
        offer_id: id.to_string(),
        host: host.to_string(),
        cpus: 4.0,
        mem_mb: 8192,
    }
}

fn independent(n: usize) -> Vec<Task> {
    (0..n)
        .map(|i| TaskBuilder::shell(&format!("t{i}")).output("o").build())
        .collect()
}

fn finished(outputs: &[(&str, uuid::Uuid)]) -> ExecutionResult {
    ExecutionResult {
        outputs: outputs
            .iter()
            .map(|(name, id)| {
                (
                    name.to_string(),
                    JobOutput {
                        artifact: *id,
                        path: None,
                        visible: true,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
        error: None,
        scratch: None,
    }
}

#[test]
fn offer_yields_one_slice_sized_placement() {
    let (mut offers, scheduler) = adapter(independent(2), 10);

    let placed = offers.resource_offers(vec![offer("o1", "h1")]).unwrap();
    assert_eq!(placed.len(), 1);

    let p = &placed[0];
    assert_eq!(p.offer_id, "o1");
    assert_eq!(p.name(), "flowgraph:t0:h1");
    assert_eq!((p.cpus, p.mem_mb), (CPU_SLICE, MEM_SLICE_MB));
    assert_eq!(
        scheduler.task("t0").unwrap().unwrap().state,
        TaskState::Running
    );
    assert_eq!(offers.in_flight(), 1);
}

#[test]
fn undersized_offers_are_declined() {
    let (mut offers, scheduler) = adapter(independent(1), 10);
    let small_cpu = ResourceOffer {
        cpus: 0.5,
        ..offer("o1", "h1")
    };
    let small_mem = ResourceOffer {
        mem_mb: 512,
        ..offer("o2", "h2")
    };

    assert!(offers.resource_offers(vec![small_cpu, small_mem]).unwrap().is_empty());
    assert_eq!(
        scheduler.task("t0").unwrap().unwrap().state,
        TaskState::Pending
    );
}

#[test]
fn a_busy_host_gets_no_second_placement() {
    let (mut offers, _) = adapter(independent(3), 10);

    let placed = offers
        .resource_offers(vec![offer("o1", "h1"), offer("o2", "h1")])
        .unwrap();
    assert_eq!(placed.len(), 1);

    let later = offers.resource_offers(vec![offer("o3", "h1")]).unwrap();
    assert!(later.is_empty());

    let elsewhere = offers.resource_offers(vec![offer("o4", "h2")]).unwrap();
    assert_eq!(elsewhere.len(), 1);
    assert_eq!(elsewhere[0].request.task_id, "t1");
}

#[test]
fn placements_are_capped_by_max_servers() {
    let (mut offers, _) = adapter(independent(3), 1);

    let placed = offers
        .resource_offers(vec![offer("o1", "h1"), offer("o2", "h2")])
        .unwrap();
    assert_eq!(placed.len(), 1);
    assert_eq!(offers.in_flight(), 1);
}

#[tokio::test]
async fn finished_placement_completes_the_task_and_unlocks_dependents() {
    let a = TaskBuilder::shell("a").output("x").build();
    let b = TaskBuilder::shell("b").input_from("in", &a, "x").build();
    let (mut offers, scheduler) = adapter(vec![a, b], 4);

    let placed = offers.resource_offers(vec![offer("o1", "h1")]).unwrap();
    let job_id = placed[0].job_id;
    let produced = uuid::Uuid::new_v4();

    offers
        .status_update(PlacementUpdate::Running { job_id })
        .await
        .unwrap();
    with_timeout(offers.status_update(PlacementUpdate::Finished {
        job_id,
        result: finished(&[("x", produced)]),
    }))
    .await
    .unwrap();

    assert_eq!(offers.in_flight(), 0);
    assert_eq!(scheduler.task("a").unwrap().unwrap().state, TaskState::Done);
    assert_eq!(
        scheduler.task("b").unwrap().unwrap().inputs["in"].id(),
        produced
    );

    // b's input lives on h1 only.
    assert!(offers.resource_offers(vec![offer("o2", "h2")]).unwrap().is_empty());
    let next = offers.resource_offers(vec![offer("o3", "h1")]).unwrap();
    assert_eq!(next[0].request.task_id, "b");
}

#[tokio::test]
async fn failed_placement_fails_the_task() {
    let (mut offers, scheduler) = adapter(independent(1), 4);
    let placed = offers.resource_offers(vec![offer("o1", "h1")]).unwrap();

    with_timeout(offers.status_update(PlacementUpdate::Failed {
        job_id: placed[0].job_id,
        message: "container exited with 137".into(),
    }))
    .await
    .unwrap();

    let task = scheduler.task("t0").unwrap().unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.error.as_deref(), Some("container exited with 137"));
    assert!(scheduler.is_done().unwrap());
}

#[tokio::test]
async fn updates_for_unknown_jobs_are_ignored() {
    let (mut offers, _) = adapter(independent(1), 4);
    offers
        .status_update(PlacementUpdate::Finished {
            job_id: 99,
            result: ExecutionResult::default(),
        })
        .await
        .unwrap();
    assert_eq!(offers.in_flight(), 0);
}

#[tokio::test]
async fn file_scan_report_makes_a_host_eligible() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("ref.fa");
    std::fs::write(&data, ">chr1\nACGT\n").unwrap();
    let task = TaskBuilder::shell("index").source("ref", &data).build();
    let source = task.inputs["ref"].id();
    let (mut offers, _) = adapter(vec![task], 4);

    assert!(offers.resource_offers(vec![offer("o1", "h1")]).unwrap().is_empty());

    offers
        .status_update(PlacementUpdate::FileScan {
            host: "h1".into(),
            found: vec![source],
        })
        .await
        .unwrap();
    let placed = offers.resource_offers(vec![offer("o2", "h1")]).unwrap();
    assert_eq!(placed[0].request.task_id, "index");
}
