use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hitl_checkpoint::{
    generate_token, Checkpoint, CheckpointPatch, CheckpointStore, FileCheckpointStore,
    InMemoryCheckpointStore, InMemoryTokenRegistry, Stage, TokenRegistry,
};
use uuid::Uuid;

fn memory_store_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryCheckpointStore::new();

    c.bench_function("memory create + patch", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let stored = store
                    .create(Checkpoint::paused(Uuid::new_v4(), Utc::now()))
                    .await
                    .unwrap();
                store
                    .patch(
                        &stored.run_id,
                        black_box(CheckpointPatch::new().with_reminder_sent(Utc::now())),
                    )
                    .await
                    .unwrap();
            })
        });
    });
}

fn file_store_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::open(dir.path()).unwrap();
    let stored = runtime
        .block_on(store.create(Checkpoint::paused(Uuid::new_v4(), Utc::now())))
        .unwrap();

    c.bench_function("file load", |b| {
        b.iter(|| runtime.block_on(store.load(black_box(&stored.run_id))).unwrap());
    });
}

fn token_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let registry = InMemoryTokenRegistry::new();
    let run_id = Uuid::new_v4();

    c.bench_function("generate token", |b| b.iter(generate_token));
    c.bench_function("mint + resolve", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let token = registry.mint(run_id, Stage::Stage1).await.unwrap();
                registry.resolve(black_box(&token)).await.unwrap();
            })
        });
    });
}

criterion_group!(benches, memory_store_benchmark, file_store_benchmark, token_benchmark);
criterion_main!(benches);
