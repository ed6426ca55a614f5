// tests/compiler_props.rs

use std::collections::{BTreeMap, BTreeSet};

use flowgraph::dag::{GraphCompiler, Task};
use flowgraph::scheduler::LocalityIndex;
use flowgraph_test_utils::builders::TaskBuilder;
use proptest::prelude::*;

// Strategy: `n` tasks plus edges. Each raw pair is mapped to (consumer,
// producer) with producer < consumer, which keeps the graph acyclic.
fn graph_strategy(max_tasks: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1..=max_tasks).prop_flat_map(|n| {
        let edges = proptest::collection::vec((any::<usize>(), any::<usize>()), 0..(2 * n));
        edges.prop_map(move |raw| {
            let edges = raw
                .into_iter()
                .filter_map(|(a, b)| {
                    let (a, b) = (a % n, b % n);
                    match a.cmp(&b) {
                        std::cmp::Ordering::Greater => Some((a, b)),
                        std::cmp::Ordering::Less => Some((b, a)),
                        std::cmp::Ordering::Equal => None,
                    }
                })
                .collect::<Vec<_>>();
            (n, edges)
        })
    })
}

fn build(n: usize, edges: &[(usize, usize)]) -> Vec<Task> {
    let producers: Vec<Task> = (0..n)
        .map(|i| TaskBuilder::shell(&format!("t{i:02}")).output("out").build())
        .collect();

    let mut tasks = producers.clone();
    for (k, (consumer, producer)) in edges.iter().enumerate() {
        let pending = producers[*producer].output_ref("out").unwrap();
        tasks[*consumer].add_input(
            format!("in{k}"),
            flowgraph::artifact::InputRef::Pending(pending),
        );
    }
    tasks
}

/// Reference connectivity: plain flood fill over undirected edges.
fn components(n: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut adj = vec![Vec::new(); n];
    for &(a, b) in edges {
        adj[a].push(b);
        adj[b].push(a);
    }
    let mut comp = vec![usize::MAX; n];
    let mut next = 0;
    for start in 0..n {
        if comp[start] != usize::MAX {
            continue;
        }
        let mut stack = vec![start];
        while let Some(v) = stack.pop() {
            if comp[v] != usize::MAX {
                continue;
            }
            comp[v] = next;
            stack.extend(adj[v].iter().copied());
        }
        next += 1;
    }
    comp
}

proptest! {
    #[test]
    fn same_dag_iff_connected((n, edges) in graph_strategy(12)) {
        let dags = GraphCompiler::from_tasks(build(n, &edges)).unwrap().compile().unwrap();
        let expected = components(n, &edges);

        let dag_of: BTreeMap<String, usize> = dags
            .iter()
            .flat_map(|d| d.tasks.keys().map(move |id| (id.clone(), d.dag_id)))
            .collect();
        prop_assert_eq!(dag_of.len(), n);

        for i in 0..n {
            for j in 0..n {
                let same_dag = dag_of[&format!("t{i:02}")] == dag_of[&format!("t{j:02}")];
                prop_assert_eq!(same_dag, expected[i] == expected[j]);
            }
        }
        let distinct: BTreeSet<usize> = expected.iter().copied().collect();
        prop_assert_eq!(dags.len(), distinct.len());
    }

    #[test]
    fn locality_fractions_stay_in_unit_range(
        holdings in proptest::collection::vec((0..6usize, 0..3usize), 0..20),
        wanted in proptest::collection::btree_set(0..6usize, 1..6),
    ) {
        let ids: Vec<uuid::Uuid> = (0..6).map(|_| uuid::Uuid::new_v4()).collect();
        let mut index = LocalityIndex::new();
        for (artifact, host) in holdings {
            index.add(ids[artifact], &format!("h{host}"));
        }

        let inputs: BTreeSet<uuid::Uuid> = wanted.iter().map(|&i| ids[i]).collect();
        for (_, fraction) in index.locality(&inputs) {
            prop_assert!(fraction > 0.0 && fraction <= 1.0);
        }
    }
}
