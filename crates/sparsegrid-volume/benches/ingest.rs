//! Ingestion benchmarks over generated sphere grids.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::Vec3;
use sparsegrid_core::LevelTopology;
use sparsegrid_volume::{GridSource, MemoryGrid, TreeIngestor};

fn sphere_grid(spheres: usize) -> MemoryGrid {
    let mut grid = MemoryGrid::new("bench", LevelTopology::new(&[6, 5, 4, 3]).unwrap());
    for i in 0..spheres {
        let center = Vec3::new(64.0 + 160.0 * i as f32, 96.0, 64.0 + 48.0 * (i % 3) as f32);
        grid.fill_sphere(center, 40.0, 1.0 + i as f32).unwrap();
    }
    grid.collapse_uniform_leaves();
    grid
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for spheres in [1, 4] {
        let grid = sphere_grid(spheres);
        let ingestor = TreeIngestor::new(grid.topology().clone());
        group.throughput(Throughput::Elements(
            grid.active_tile_count() + grid.active_leaf_count(),
        ));

        group.bench_with_input(BenchmarkId::new("sequential", spheres), &grid, |b, grid| {
            b.iter(|| black_box(ingestor.ingest(grid).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("parallel", spheres), &grid, |b, grid| {
            b.iter(|| black_box(ingestor.ingest_parallel(grid).unwrap()));
        });
    }

    group.finish();
}

fn bench_gpu_nodes(c: &mut Criterion) {
    let grid = sphere_grid(4);
    let buffer = TreeIngestor::new(grid.topology().clone())
        .ingest(&grid)
        .unwrap();
    c.bench_function("gpu_nodes", |b| b.iter(|| black_box(buffer.gpu_nodes())));
}

criterion_group!(benches, bench_ingest, bench_gpu_nodes);
criterion_main!(benches);
