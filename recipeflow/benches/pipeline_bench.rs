//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recipeflow::config::PipelineSettings;
use recipeflow::coordinator::RecipeCoordinator;
use recipeflow::events::NoOpEventSink;
use recipeflow::provider::GenerationParams;
use recipeflow::stages::{normalize_headings, parse_recipe_ids};
use recipeflow::testing::{sample_preferences, ScriptedProvider, CUSTOM_RESPONSE, SEARCH_RESPONSE};
use std::sync::Arc;

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let coordinator = RecipeCoordinator::from_provider(
        Arc::new(ScriptedProvider::recipe_fixture()),
        &PipelineSettings::default(),
        GenerationParams::default(),
        Arc::new(NoOpEventSink),
    )
    .unwrap();
    let preferences = sample_preferences();

    c.bench_function("recipe_run", |b| {
        b.iter(|| runtime.block_on(coordinator.run(black_box(&preferences))).unwrap());
    });
}

fn parsing_benchmark(c: &mut Criterion) {
    c.bench_function("parse_recipe_ids", |b| {
        b.iter(|| parse_recipe_ids(black_box(SEARCH_RESPONSE), 5));
    });

    c.bench_function("normalize_headings", |b| {
        b.iter(|| normalize_headings(black_box(CUSTOM_RESPONSE)));
    });
}

criterion_group!(benches, pipeline_benchmark, parsing_benchmark);
criterion_main!(benches);
