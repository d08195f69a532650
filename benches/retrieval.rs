use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ragctx::{
    AssemblerConfig, ContextAssembler, Document, EmbeddingProvider, SearchConfig, SearchScope,
    SimilaritySearch, VectorIndex, VectorStore,
};
use tokio::runtime::Runtime;

const DIM: usize = 384;

fn corpus(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("message {i} about sailing, weather and the harbour schedule"))
        .collect()
}

fn build_index(rt: &Runtime, provider: &EmbeddingProvider, n: usize) -> VectorIndex {
    let texts = corpus(n);
    let embeddings = rt.block_on(provider.embed_batch(&texts));
    let mut index = VectorIndex::new(DIM);
    let docs = texts.into_iter().zip(embeddings).enumerate().map(|(i, (text, emb))| Document {
        id: format!("doc-{i}"),
        content: text,
        owner: Some(if i % 4 == 0 { "alice" } else { "bob" }.to_string()),
        embedding: Some(emb.vector),
        ..Default::default()
    });
    index.extend(docs).expect("bench documents share the index dimension");
    index
}

fn bench_hash_embedding(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let provider = EmbeddingProvider::hash_only(DIM);

    let mut group = c.benchmark_group("embed_hash");
    for batch in [1usize, 32, 256] {
        let texts = corpus(batch);
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &texts, |b, texts| {
            b.iter(|| rt.block_on(provider.embed_batch(black_box(texts))))
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let provider = EmbeddingProvider::hash_only(DIM);
    let query = rt
        .block_on(provider.embed("when does the harbour open"))
        .vector;

    let mut group = c.benchmark_group("search_in_memory");
    for size in [1_000usize, 10_000] {
        let store: Arc<dyn VectorStore> = Arc::new(build_index(&rt, &provider, size));
        let search = SimilaritySearch::new(store, SearchConfig::default()).expect("valid config");
        let scope = SearchScope::owner("alice");
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| search.search(black_box(&query), &scope, 20, 0.0))
        });
    }
    group.finish();
}

fn bench_build_context(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let provider = Arc::new(EmbeddingProvider::hash_only(DIM));
    let store: Arc<dyn VectorStore> = Arc::new(build_index(&rt, &provider, 5_000));
    let search = SimilaritySearch::new(store, SearchConfig::default()).expect("valid config");
    let assembler = ContextAssembler::new(provider, search, AssemblerConfig::default())
        .expect("valid config");
    let scope = SearchScope::owner("alice");

    c.bench_function("build_context_5k", |b| {
        b.iter(|| rt.block_on(assembler.build_context(black_box("harbour schedule"), &scope, 10, 0.0)))
    });
}

criterion_group!(benches, bench_hash_embedding, bench_search, bench_build_context);
criterion_main!(benches);
