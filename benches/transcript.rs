use confab::core::message::{EntryId, MessageEntry, MessageStatus};
use confab::core::transcript::TranscriptStore;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn filled_store(entries: usize, text: &str) -> (TranscriptStore, Vec<EntryId>) {
    let mut store = TranscriptStore::new();
    let mut ids = Vec::with_capacity(entries);
    for i in 0..entries {
        let id = EntryId::new(format!("local-{i}"));
        let entry = if i % 2 == 0 {
            MessageEntry::local_pending(id.clone(), text)
        } else {
            MessageEntry::remote(id.clone(), text)
        };
        store.append(entry);
        ids.push(id);
    }
    (store, ids)
}

fn bench_transcript(c: &mut Criterion) {
    let text = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor";

    for &entries in &[200usize, 2_000usize] {
        let mut group = c.benchmark_group(format!("transcript_{entries}"));
        group.throughput(Throughput::Elements(entries as u64));

        group.bench_function(BenchmarkId::new("append", entries), |b| {
            b.iter(|| black_box(filled_store(entries, text)))
        });

        let (store, ids) = filled_store(entries, text);
        group.bench_function(BenchmarkId::new("snapshot", entries), |b| {
            b.iter(|| black_box(store.snapshot()))
        });

        group.bench_function(BenchmarkId::new("confirm_all", entries), |b| {
            b.iter_batched(
                || filled_store(entries, text).0,
                |mut store| {
                    for id in &ids {
                        store.update_status(id, MessageStatus::Confirmed);
                    }
                    store
                },
                criterion::BatchSize::LargeInput,
            )
        });

        group.finish();
    }
}

criterion_group!(benches, bench_transcript);
criterion_main!(benches);
