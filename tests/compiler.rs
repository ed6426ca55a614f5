// tests/compiler.rs

use std::collections::BTreeSet;

use flowgraph::artifact::{ArtifactRef, InputRef, PendingRef};
use flowgraph::dag::{DagSet, GraphCompiler, Task};
use flowgraph::errors::{CompileError, FlowError};
use flowgraph::types::TaskState;
use flowgraph_test_utils::builders::TaskBuilder;
use flowgraph_test_utils::init_tracing;

fn compile(tasks: Vec<Task>) -> Result<DagSet, FlowError> {
    GraphCompiler::from_tasks(tasks)?.compile()
}

fn members(dags: &DagSet) -> Vec<BTreeSet<String>> {
    dags.iter()
        .map(|d| d.tasks.keys().cloned().collect())
        .collect()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn chain_and_unrelated_task_make_two_dags() {
    init_tracing();

    let a = TaskBuilder::shell("a").output("x").build();
    let b = TaskBuilder::shell("b").output("y").input_from("in", &a, "x").build();
    let c = TaskBuilder::shell("c").output("z").build();

    let dags = compile(vec![a, b, c]).unwrap();

    assert_eq!(members(&dags), vec![set(&["a", "b"]), set(&["c"])]);
    for dag in dags.iter() {
        for task in dag.tasks.values() {
            assert_eq!(task.dag_id, Some(dag.dag_id));
            assert_eq!(task.state, TaskState::Pending);
        }
    }
}

#[test]
fn shared_producer_joins_consumers() {
    let p = TaskBuilder::shell("p").output("o").build();
    let q = TaskBuilder::shell("q").input_from("in", &p, "o").build();
    let r = TaskBuilder::shell("r").input_from("in", &p, "o").build();
    let s = TaskBuilder::shell("s").output("o").build();
    let t = TaskBuilder::shell("t").input_from("in", &s, "o").build();

    let dags = compile(vec![p, q, r, s, t]).unwrap();
    assert_eq!(members(&dags), vec![set(&["p", "q", "r"]), set(&["s", "t"])]);
}

#[test]
fn component_of_only_composites_is_dropped() {
    let inner = TaskBuilder::composite("inner").output("x").build();
    let outer = TaskBuilder::composite("outer")
        .input_from("x", &inner, "x")
        .output("x")
        .build();
    let real = TaskBuilder::shell("real").build();

    let dags = compile(vec![inner, outer, real]).unwrap();
    assert_eq!(members(&dags), vec![set(&["real"])]);
    assert_eq!(dags.dag(0).unwrap().dag_id, 0);
}

#[test]
fn composite_next_to_active_task_is_kept() {
    let comp = TaskBuilder::composite("comp").output("x").build();
    let user = TaskBuilder::shell("user").input_from("in", &comp, "x").build();

    let dags = compile(vec![comp, user]).unwrap();
    assert_eq!(members(&dags), vec![set(&["comp", "user"])]);
}

#[test]
fn reference_to_missing_slot_is_unresolved() {
    let a = TaskBuilder::shell("a").output("x").build();
    let ghost = PendingRef::new("a", uuid::Uuid::new_v4()).unwrap();
    let mut b = TaskBuilder::shell("b").build();
    b.add_input("in", InputRef::Pending(ghost));

    let err = compile(vec![a, b]).unwrap_err();
    match err {
        FlowError::Compile(CompileError::UnresolvedReference { task, producer, .. }) => {
            assert_eq!(task, "b");
            assert_eq!(producer, "a");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn plain_artifact_input_is_broken() {
    let mut a = TaskBuilder::shell("a").build();
    a.add_input("raw", InputRef::Artifact(ArtifactRef::new(uuid::Uuid::new_v4())));

    let err = compile(vec![a]).unwrap_err();
    assert!(matches!(
        err,
        FlowError::Compile(CompileError::BrokenInput { .. })
    ));
}

#[test]
fn duplicate_ids_are_rejected() {
    let err = GraphCompiler::from_tasks(vec![
        TaskBuilder::shell("a").build(),
        TaskBuilder::shell("a").build(),
    ])
    .unwrap_err();
    assert!(matches!(
        err,
        FlowError::Compile(CompileError::DuplicateTask(id)) if id == "a"
    ));
}

#[test]
fn cycles_are_rejected() {
    let mut a = TaskBuilder::shell("a").output("x").build();
    let b = TaskBuilder::shell("b").output("y").input_from("in", &a, "x").build();
    a.add_input("back", InputRef::Pending(b.output_ref("y").unwrap()));

    let err = compile(vec![a, b]).unwrap_err();
    assert!(matches!(err, FlowError::Compile(CompileError::Cycle(_))));
}

#[test]
fn pending_ref_requires_a_valid_producer_id() {
    assert!(PendingRef::new("", uuid::Uuid::new_v4()).is_err());
    assert!(PendingRef::new("has space", uuid::Uuid::new_v4()).is_err());
    assert!(PendingRef::new("ok_id", uuid::Uuid::new_v4()).is_ok());
}

#[test]
fn dagset_queries_filter_by_state_with_limit() {
    let tasks = vec![
        TaskBuilder::shell("a").build(),
        TaskBuilder::shell("b").build(),
        TaskBuilder::shell("c").build(),
    ];
    let dags = compile(tasks).unwrap();

    // Default filter is RUNNING; nothing runs yet.
    assert!(dags.get_tasks(None, 0).is_empty());
    assert!(dags.get_dags(None, 0).is_empty());

    assert_eq!(dags.get_tasks(Some(&[TaskState::Pending]), 0).len(), 3);
    assert_eq!(dags.get_tasks(Some(&[TaskState::Pending]), 2).len(), 2);
    assert_eq!(dags.get_dags(Some(&[TaskState::Pending]), 1).len(), 1);
    assert_eq!(dags.find_task("b").unwrap().dag_id, Some(1));
}
