use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferrous_dispatch::*;
use std::sync::Arc;

struct Repository {
    rows: Vec<u64>,
}

struct Handler {
    repository: Arc<Repository>,
}

fn container() -> Arc<RootContainer> {
    let mut registry = ComponentRegistry::new();
    registry.register_type::<Repository, _>(Lifetime::Singleton, |_| Ok(Repository { rows: (0..64).collect() }));
    registry.register("Handler", Lifetime::Scoped, |scope| {
        Ok(Handler { repository: scope.resolve_type::<Repository>()? })
    });
    Arc::new(registry.build())
}

fn per_call_host() -> ServiceHost {
    let mut config = HostConfiguration::with_container(container());
    config.register("Handler", ResolutionStrategy::Contract, false).unwrap();
    let host = ServiceHostFactory::new(Arc::new(config)).create_host("Handler", &["main"]).unwrap();
    host.open().unwrap();
    host
}

// ===== Micro Benchmarks =====

fn bench_per_call_cycle(c: &mut Criterion) {
    let container = container();
    let descriptor = ServiceDescriptor::builder().contract("Handler").resolve_contract().build().unwrap();
    let provider = PerCallInstanceProvider::new(container, descriptor);

    c.bench_function("per_call_get_release", |b| {
        b.iter(|| {
            let call = CallContext::new();
            let instance = provider.get_instance(&call).unwrap();
            black_box(&instance);
            provider.release_instance(&call, instance).unwrap();
        })
    });
}

fn bench_dispatch_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_modes");

    let per_call = per_call_host();
    group.bench_function("per_call", |b| {
        b.iter(|| {
            let sum = per_call
                .endpoint("main")
                .unwrap()
                .dispatcher()
                .dispatch_as::<Handler, _, _>(&per_call.new_call(), |handler| {
                    Ok(handler.repository.rows.len())
                })
                .unwrap();
            black_box(sum);
        })
    });

    let mut config = HostConfiguration::with_container(container());
    config.register("Handler", ResolutionStrategy::Contract, true).unwrap();
    let singleton = ServiceHostFactory::new(Arc::new(config)).create_host("Handler", &["main"]).unwrap();
    singleton.open().unwrap();
    group.bench_function("singleton", |b| {
        b.iter(|| {
            let sum = singleton
                .endpoint("main")
                .unwrap()
                .dispatcher()
                .dispatch_as::<Handler, _, _>(&singleton.new_call(), |handler| {
                    Ok(handler.repository.rows.len())
                })
                .unwrap();
            black_box(sum);
        })
    });

    group.finish();
}

fn bench_safe_release(c: &mut Criterion) {
    c.bench_function("safe_release_open_host", |b| {
        b.iter_batched(
            || {
                let host = ServiceHost::new(HostDescription::new("Bench"));
                host.open().unwrap();
                host
            },
            |host| {
                safe_release(&host).unwrap();
                black_box(host.state());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

// ===== Concurrency Benchmarks =====

fn bench_concurrent_dispatch(c: &mut Criterion) {
    let host = per_call_host();
    let mut group = c.benchmark_group("concurrent_dispatch");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                crossbeam_utils::thread::scope(|s| {
                    for _ in 0..threads {
                        s.spawn(|_| {
                            for _ in 0..64 {
                                host.dispatch("main", &host.new_call(), |_| Ok(())).unwrap();
                            }
                        });
                    }
                })
                .unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(micro_benches, bench_per_call_cycle, bench_dispatch_modes, bench_safe_release);

criterion_group!(concurrency_benches, bench_concurrent_dispatch);

criterion_main!(micro_benches, concurrency_benches);
