use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;
use std::thread;

use stockroom_core::{ProductId, ReceiptId};
use stockroom_infra::{
    PoolConfig, ReceiptLine, ReceiptPipeline, ReceiptPipelineConfig, TaskQueue, WorkerPool,
};
use stockroom_inventory::{MutationKind, ProductRecord, ProductRegistry, StockMutator};

const PRODUCTS: u64 = 8;

fn mutator() -> Arc<StockMutator> {
    let records = (1..=PRODUCTS)
        .map(|id| ProductRecord::new(id, format!("product-{id}"), 1_000, 1_000_000));
    Arc::new(StockMutator::new(Arc::new(
        ProductRegistry::from_records(records).expect("seed registry"),
    )))
}

fn bench_mutation_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutation_latency");
    let mutator = mutator();

    group.bench_function("reserve_then_return", |b| {
        b.iter(|| {
            mutator.reserve(black_box(ProductId::new(1)), 1).expect("reserve");
            mutator.return_stock(black_box(ProductId::new(1)), 1).expect("return");
        });
    });

    group.bench_function("check", |b| {
        b.iter(|| mutator.check(black_box(ProductId::new(2)), 1).expect("check"));
    });

    group.finish();
}

/// Same product on every thread versus one product per thread.
fn bench_contended_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_mutation");
    let mutator = mutator();
    let ops_per_thread = 1_000u64;

    for threads in [2u64, 4, 8] {
        group.throughput(Throughput::Elements(threads * ops_per_thread * 2));

        group.bench_with_input(
            BenchmarkId::new("shared_product", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    thread::scope(|s| {
                        for _ in 0..threads {
                            s.spawn(|| {
                                for _ in 0..ops_per_thread {
                                    mutator.reserve_one(ProductId::new(1)).expect("reserve");
                                    mutator.return_one(ProductId::new(1)).expect("return");
                                }
                            });
                        }
                    });
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("disjoint_products", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    thread::scope(|s| {
                        for t in 0..threads {
                            let mutator = &mutator;
                            s.spawn(move || {
                                let id = ProductId::new(t % PRODUCTS + 1);
                                for _ in 0..ops_per_thread {
                                    mutator.reserve_one(id).expect("reserve");
                                    mutator.return_one(id).expect("return");
                                }
                            });
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

fn bench_task_queue_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_queue_throughput");
    let mutator = mutator();

    for batch_size in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(batch_size));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let queue = TaskQueue::spawn("bench-queue", Arc::clone(&mutator))
                        .expect("spawn queue");
                    for i in 0..batch_size {
                        let kind = if i % 2 == 0 {
                            MutationKind::Reserve
                        } else {
                            MutationKind::Return
                        };
                        queue
                            .submit_mutation(kind, ProductId::new(3), 1, |outcome| {
                                black_box(outcome.is_ok());
                            })
                            .expect("submit");
                    }
                    queue.shutdown();
                });
            },
        );
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    let mutator = mutator();
    let receipts = 200u64;
    group.throughput(Throughput::Elements(receipts));

    for workers in [1usize, 2, 4] {
        group.bench_with_input(
            BenchmarkId::new("receipt_pipeline", workers),
            &workers,
            |b, &workers| {
                b.iter(|| {
                    let pipeline = ReceiptPipeline::new(
                        Arc::clone(&mutator),
                        ReceiptPipelineConfig::default().with_workers(workers),
                    )
                    .expect("pipeline");
                    for id in 0..receipts {
                        let product = id % PRODUCTS + 1;
                        let line = ReceiptLine::new(product, 1);
                        let lines = vec![line, line];
                        pipeline
                            .submit_receipt(ReceiptId::new(id), lines)
                            .expect("submit");
                    }
                    pipeline.shutdown();
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("worker_pool_noop", workers),
            &workers,
            |b, &workers| {
                b.iter(|| {
                    let pool = WorkerPool::new(PoolConfig::default().with_workers(workers))
                        .expect("pool");
                    for _ in 0..receipts {
                        pool.submit(|| {
                            black_box(());
                        })
                        .expect("submit");
                    }
                    pool.shutdown();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_mutation_latency,
    bench_contended_mutation,
    bench_task_queue_throughput,
    bench_fan_out
);
criterion_main!(benches);
