use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use txsink::{
    buffer::BatchBuffer,
    command::{TransformError, WriteCommand},
    config::{ConnectionParams, SinkConfig},
    sink::{TaskContext, TransactionalSink},
};

fn insert(id: &i64) -> Result<WriteCommand, TransformError> {
    Ok(WriteCommand::new("INSERT INTO events(id, payload) VALUES (?1, ?2)")
        .bind(*id)
        .bind(format!("payload-{id}")))
}

const DDL: &str = "CREATE TABLE events (id INTEGER PRIMARY KEY, payload TEXT);";

fn config(batch_size: usize) -> SinkConfig {
    SinkConfig {
        batch_size,
        flush_interval_ms: 60_000,
        connection: ConnectionParams {
            init_sql: Some(DDL.to_string()),
            ..ConnectionParams::default()
        },
        ..SinkConfig::default()
    }
}

fn bench_buffer_append(c: &mut Criterion) {
    c.bench_function("buffer_append_take_10k", |b| {
        b.iter(|| {
            let mut buf = BatchBuffer::new();
            for i in 0..10_000i64 {
                buf.add(insert(&i).expect("transform"));
                if buf.is_size_due(500) {
                    let _ = buf.take();
                }
            }
        });
    });
}

fn bench_sink_batch_sizes(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let mut group = c.benchmark_group("sink_2k_records");
    group.sample_size(10);

    for batch_size in [1usize, 50, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &n| {
            b.iter(|| {
                rt.block_on(async {
                    let (mut sink, _) = TransactionalSink::sqlite(config(n), insert).expect("sink");
                    sink.open(&TaskContext::default()).await.expect("open");
                    for id in 0..2_000i64 {
                        sink.invoke(&id).await.expect("invoke");
                    }
                    sink.close().await.expect("close");
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_buffer_append, bench_sink_batch_sizes);
criterion_main!(benches);
