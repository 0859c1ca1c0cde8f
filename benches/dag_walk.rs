//! Benchmarks for DAG walks and object graph planning

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rollout_operator::graph::Dag;
use rollout_operator::model::{to_object, Action, GraphClient, GraphWriter, ObjectGraph, ObjectVertex, Scheme};
use rollout_operator::store::MemoryStore;
use std::sync::Arc;

/// Root 0 depending on `width` vertices per layer, each layer on the next
fn layered_dag(layers: u32, width: u32) -> Dag<u32> {
    let mut dag = Dag::new();
    dag.add_vertex(0);
    let mut previous = vec![0];
    for layer in 0..layers {
        let current: Vec<u32> = (0..width).map(|i| 1 + layer * width + i).collect();
        for from in &previous {
            for to in &current {
                dag.connect(*from, *to);
            }
        }
        previous = current;
    }
    dag
}

fn bench_walks(c: &mut Criterion) {
    let mut group = c.benchmark_group("dag_walk");

    for size in [10u32, 50, 100] {
        let dag = layered_dag(size / 10, 10);
        group.throughput(Throughput::Elements(u64::from(size)));

        group.bench_with_input(BenchmarkId::new("reverse_topo", size), &dag, |b, dag| {
            b.iter(|| {
                let mut visited = 0usize;
                let _ = dag.walk_reverse_topo_order(
                    |_| {
                        visited += 1;
                        Ok(())
                    },
                    None,
                );
                black_box(visited)
            });
        });

        let less = |a: &u32, b: &u32| a < b;
        group.bench_with_input(BenchmarkId::new("topo_ordered", size), &dag, |b, dag| {
            b.iter(|| black_box(dag.topo_order(false, Some(&less))));
        });

        group.bench_with_input(BenchmarkId::new("bfs", size), &dag, |b, dag| {
            b.iter(|| {
                let mut visited = 0usize;
                let _ = dag.walk_bfs(
                    |_| {
                        visited += 1;
                        Ok(())
                    },
                    None,
                );
                black_box(visited)
            });
        });

        group.bench_with_input(BenchmarkId::new("validate", size), &dag, |b, dag| {
            b.iter(|| black_box(dag.validate()));
        });
    }

    group.finish();
}

fn meta(name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some("default".into()),
        ..Default::default()
    }
}

fn bench_plan_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_graph");
    group.throughput(Throughput::Elements(100));

    let scheme = Arc::new(Scheme::new().register::<Pod>().register::<ConfigMap>());
    let client = GraphClient::new(Arc::new(MemoryStore::new(scheme.clone())), scheme);
    let root = to_object(&ConfigMap {
        metadata: meta("root".into()),
        ..Default::default()
    })
    .unwrap();
    let pods: Vec<_> = (0..100)
        .map(|i| {
            to_object(&Pod {
                metadata: meta(format!("pod-{:03}", i)),
                ..Default::default()
            })
            .unwrap()
        })
        .collect();

    group.bench_function("plan_100_creates", |b| {
        b.iter(|| {
            let mut graph = ObjectGraph::new();
            client.root(&mut graph, None, root.clone(), Action::Noop).unwrap();
            for pod in &pods {
                client.create(&mut graph, pod.clone(), &[]).unwrap();
            }
            black_box(graph.reverse_topo_order(&|a: &ObjectVertex, b: &ObjectVertex| {
                a.key() < b.key()
            }))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_walks, bench_plan_graph);
criterion_main!(benches);
