use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fusion_core::association::AssociatorConfig;
use fusion_core::pipeline::{Pipeline, PipelineConfig};
use fusion_core::types::DMat;
use fusion_core::{AgentId, CtrvState, DetectedObject, ObjectId, Track, TrackId};

/// `n` vehicles on a ring, driving tangentially.
fn ring(n: usize) -> Vec<CtrvState> {
    (0..n)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / n as f64;
            let r = 5.0 * n as f64;
            CtrvState::new(
                r * angle.cos(),
                r * angle.sin(),
                12.0,
                angle + std::f64::consts::FRAC_PI_2,
                0.0,
            )
        })
        .collect()
}

fn make_tracks(n: usize) -> Vec<Track> {
    ring(n)
        .into_iter()
        .enumerate()
        .filter_map(|(i, s)| {
            Track::new(TrackId(format!("t{i:05}")), 0.0, s.into(), DMat::identity(5, 5)).ok()
        })
        .collect()
}

/// Two agents observing every vehicle, with different latencies.
fn make_objects(n: usize, t: f64) -> Vec<DetectedObject> {
    ring(n)
        .into_iter()
        .enumerate()
        .flat_map(|(i, s)| {
            [(1u32, 0.02), (2u32, 0.08)].map(|(agent, latency)| (i, s, agent, latency))
        })
        .filter_map(|(i, s, agent, latency)| {
            DetectedObject::new(
                ObjectId(format!("a{agent}-o{i:05}")),
                AgentId(agent),
                t - latency,
                s.into(),
                DMat::identity(5, 5) * 0.5,
            )
            .ok()
        })
        .collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    for n in [10, 50, 200] {
        let tracks = make_tracks(n);
        let objects = make_objects(n, 0.1);
        for (name, associator, parallel) in [
            ("gnn", AssociatorConfig::Gnn, false),
            ("cluster", AssociatorConfig::Cluster, false),
            ("hungarian", AssociatorConfig::Hungarian { dummy_cost: 1000.0 }, false),
            ("cluster_parallel", AssociatorConfig::Cluster, true),
        ] {
            let pipeline = Pipeline::new(&PipelineConfig {
                associator,
                parallel,
                ..Default::default()
            });
            group.bench_function(format!("{name}_{n}_tracks"), |b| {
                b.iter(|| black_box(pipeline.run(&tracks, &objects, 0.1)));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
