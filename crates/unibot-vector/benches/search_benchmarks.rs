//! Benchmarks for knowledge retrieval.
//!
//! A university FAQ is a few hundred rows; the benchmark uses 2,000 chunks
//! by default so regressions in the brute-force scan show up clearly. Set
//! `BENCH_FULL_SCALE=1` to run against 20,000 chunks:
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p unibot-vector
//! ```

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use unibot_core::generation::MockGenerator;
use unibot_vector::embedding::{EmbeddingService, MockEmbedding};
use unibot_vector::index::VectorIndex;
use unibot_vector::knowledge::{KnowledgeEngine, KnowledgeRow, RetrievalSettings};

const CI_CHUNK_COUNT: usize = 2_000;
const FULL_SCALE_CHUNK_COUNT: usize = 20_000;

fn chunk_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_CHUNK_COUNT
    } else {
        CI_CHUNK_COUNT
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
}

/// FAQ row made unique by its index so every chunk embeds differently.
fn faq_row(index: usize) -> KnowledgeRow {
    let interface = match index % 3 {
        0 => "LMS",
        1 => "CMS",
        _ => "general",
    };
    KnowledgeRow::new(
        &format!("How do I submit assignment {index} for my block?"),
        &format!(
            "Log in to the LMS, open block {index}, choose the assignment tab and \
             upload your file before the deadline. Late submissions need mentor approval."
        ),
        "academic",
        interface,
    )
}

fn build_populated_index(count: usize) -> (VectorIndex, MockEmbedding) {
    let index = VectorIndex::new();
    let embedder = MockEmbedding::new();
    let rt = runtime();

    let batch = (0..count)
        .map(|i| {
            let text = faq_row(i).document();
            let embedding = rt.block_on(embedder.embed(&text)).expect("embed failed");
            (Uuid::new_v4(), embedding, serde_json::json!({ "chunk_id": i }))
        })
        .collect();
    index.insert_batch(batch).expect("insert failed");

    assert_eq!(index.len(), count, "Index should contain all inserted chunks");
    (index, embedder)
}

fn bench_index_search(c: &mut Criterion) {
    let count = chunk_count();
    let (index, embedder) = build_populated_index(count);
    let rt = runtime();
    let query_vec = rt
        .block_on(embedder.embed("how do I submit my assignment late"))
        .expect("query embed failed");

    let mut group = c.benchmark_group("index_search");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(format!("knn_top4_{}chunks", count), |b| {
        b.iter(|| {
            let hits = index.search(&query_vec, 4).expect("search failed");
            assert_eq!(hits.len(), 4);
            hits
        });
    });

    group.finish();
}

fn bench_knowledge_query(c: &mut Criterion) {
    let count = chunk_count();
    let rt = runtime();
    let engine = KnowledgeEngine::new(
        Arc::new(MockEmbedding::new()),
        Arc::new(MockGenerator::new()),
        RetrievalSettings::default(),
    );
    let rows: Vec<KnowledgeRow> = (0..count).map(faq_row).collect();
    rt.block_on(engine.ingest(&rows)).expect("ingest failed");

    let mut group = c.benchmark_group("knowledge_query");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(format!("query_{}chunks", count), |b| {
        b.iter(|| {
            rt.block_on(engine.query(
                "How do I submit assignment 7 for my block?",
                "Student",
                None,
            ))
        });
    });

    group.bench_function(format!("query_filtered_{}chunks", count), |b| {
        b.iter(|| {
            rt.block_on(engine.query(
                "How do I submit assignment 7 for my block?",
                "Student",
                Some("lms"),
            ))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_index_search, bench_knowledge_query);
criterion_main!(benches);
