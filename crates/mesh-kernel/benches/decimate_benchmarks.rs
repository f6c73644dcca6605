//! Benchmarks for simplification and the defect analyses run on every level.
//!
//! Run with: cargo bench -p mesh-kernel

use std::f64::consts::PI;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mesh_kernel::{
    DecimateParams, IntersectionParams, Mesh, Vertex, decimate_mesh, detect_self_intersections,
    manifold_defects,
};

/// Closed UV sphere with `2 * segments * (rings - 1)` triangles.
fn uv_sphere(segments: u32, rings: u32) -> Mesh {
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
    for r in 1..rings {
        let theta = PI * r as f64 / rings as f64;
        for s in 0..segments {
            let phi = 2.0 * PI * s as f64 / segments as f64;
            mesh.vertices.push(Vertex::from_coords(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ));
        }
    }
    let south = mesh.vertices.len() as u32;
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, -1.0));

    let ring = |r: u32, s: u32| 1 + (r - 1) * segments + (s % segments);
    for s in 0..segments {
        mesh.faces.push([0, ring(1, s), ring(1, s + 1)]);
        mesh.faces.push([south, ring(rings - 1, s + 1), ring(rings - 1, s)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            mesh.faces.push([ring(r, s), ring(r + 1, s), ring(r + 1, s + 1)]);
            mesh.faces.push([ring(r, s), ring(r + 1, s + 1), ring(r, s + 1)]);
        }
    }
    mesh
}

fn sizes() -> Vec<(&'static str, Mesh)> {
    vec![
        ("sphere_528tri", uv_sphere(24, 12)),
        ("sphere_4032tri", uv_sphere(64, 32)),
        ("sphere_16128tri", uv_sphere(128, 64)),
    ]
}

fn bench_decimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decimate");
    group.sample_size(20);

    for (name, mesh) in &sizes() {
        group.throughput(Throughput::Elements(mesh.faces.len() as u64));
        for ratio in [0.8, 0.4, 0.2] {
            let params = DecimateParams::with_target_ratio(ratio);
            group.bench_with_input(
                BenchmarkId::new(format!("ratio_{}", ratio), name),
                mesh,
                |b, mesh| b.iter(|| decimate_mesh(black_box(mesh), &params)),
            );
        }
    }

    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("Analysis");

    for (name, mesh) in &sizes() {
        group.throughput(Throughput::Elements(mesh.faces.len() as u64));
        group.bench_with_input(BenchmarkId::new("manifold_defects", name), mesh, |b, mesh| {
            b.iter(|| manifold_defects(black_box(mesh)))
        });
        group.bench_with_input(BenchmarkId::new("self_intersections", name), mesh, |b, mesh| {
            b.iter(|| detect_self_intersections(black_box(mesh), &IntersectionParams::first_hit()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decimate, bench_analysis);
criterion_main!(benches);
