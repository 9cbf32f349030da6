//! Benchmarks for message classification.
//!
//! Every inbound message goes through the rule chain, and student-specific
//! ones through `extract_question` as well. The message mix below covers
//! each rule so a slow pattern in any branch shows up.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use unibot_chat::keywords::KeywordSet;
use unibot_chat::router::{extract_question, route, topic_label};

/// Message for a given index, cycling through every route.
fn sample_message(index: usize) -> String {
    match index % 8 {
        0 => "hi".to_string(),
        1 => "thank you".to_string(),
        2 => "can I pay through paypal this semester".to_string(),
        3 => format!("I want to submit manuscript {} to the journal", index),
        4 => "please find the bank transfer receipt attached".to_string(),
        5 => format!("Good morning sir, what is my fee balance for block {}", index),
        6 => "Respected madam, what is my course status".to_string(),
        _ => format!(
            "How do I reset my LMS password? I tried the forgot password link {} times \
             and still cannot log in to the portal before my exam.",
            index
        ),
    }
}

fn bench_route(c: &mut Criterion) {
    let keywords = KeywordSet::defaults();
    let messages: Vec<String> = (0..1000).map(sample_message).collect();

    let mut group = c.benchmark_group("router");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("route_mixed", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let r = route(&messages[idx % messages.len()], &keywords);
            idx += 1;
            r
        });
    });

    group.bench_function("topic_label_mixed", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let label = topic_label(&messages[idx % messages.len()], &keywords);
            idx += 1;
            label
        });
    });

    group.finish();
}

fn bench_extract_question(c: &mut Criterion) {
    let keywords = KeywordSet::defaults();
    let prefixed = "Dear sir hello, Good morning madam, Dr. what is my fee balance";
    let plain = "what is my fee balance for the current block";

    let mut group = c.benchmark_group("extract_question");
    group.sample_size(200);

    group.bench_function("nested_prefixes", |b| {
        b.iter(|| extract_question(prefixed, &keywords));
    });

    group.bench_function("no_prefix", |b| {
        b.iter(|| extract_question(plain, &keywords));
    });

    group.finish();
}

criterion_group!(benches, bench_route, bench_extract_question);
criterion_main!(benches);
