use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use factstack_service::{Error, QueryOptions, Stage};
use factstack_testkit::{FailingRerank, MemoryTraceSink, SlowIndex, UnavailableIndex};

use super::{ROLLBACK_EN, ROLLBACK_ZH, backends, engine_with, stage};

#[tokio::test]
async fn semantic_outage_degrades_to_keyword_results() {
	let mut backends = backends();

	backends.semantic = Arc::new(UnavailableIndex);

	let outcome = engine_with(factstack_testkit::test_config(), backends)
		.run_query(ROLLBACK_EN, QueryOptions::default())
		.await
		.expect("Query failed.");
	let vector = stage(&outcome, Stage::VectorSearch);
	let keyword = stage(&outcome, Stage::KeywordSearch);

	assert!(!vector.ok);
	assert!(vector.error.as_deref().is_some_and(|err| err.contains("unavailable")));
	assert!(keyword.ok);
	assert!(outcome.bundle.usable, "{}", outcome.bundle.verdict.reason);
	assert_eq!(outcome.bundle.citations[0].chunk_id, "runbook-rollback");
}

#[tokio::test]
async fn slow_keyword_index_times_out_without_blocking() {
	let mut cfg = factstack_testkit::test_config();
	let mut backends = backends();

	cfg.retrieval.keyword_timeout_ms = 50;
	backends.keyword = Arc::new(SlowIndex { delay: Duration::from_secs(5) });

	let started = Instant::now();
	let outcome = engine_with(cfg, backends)
		.run_query(ROLLBACK_ZH, QueryOptions::default())
		.await
		.expect("Query failed.");
	let keyword = stage(&outcome, Stage::KeywordSearch);

	assert!(started.elapsed() < Duration::from_secs(3));
	assert!(!keyword.ok);
	assert_eq!(keyword.metadata["failures"]["original"], "Backend timed out after 50 ms.");
	assert!(stage(&outcome, Stage::VectorSearch).ok);
	assert_eq!(outcome.bundle.citations[0].chunk_id, "runbook-rollback");
}

#[tokio::test]
async fn total_outage_is_an_error() {
	let sink = Arc::new(MemoryTraceSink::default());
	let mut backends = backends();

	backends.semantic = Arc::new(UnavailableIndex);
	backends.keyword = Arc::new(UnavailableIndex);
	backends.trace = sink.clone();

	let err = engine_with(factstack_testkit::test_config(), backends)
		.run_query(ROLLBACK_ZH, QueryOptions::default())
		.await
		.expect_err("Expected retrieval to be unavailable.");

	assert!(matches!(err, Error::RetrievalUnavailable { .. }), "{err}");

	let stages: Vec<Stage> = sink.events().iter().map(|event| event.stage).collect();

	assert_eq!(
		stages,
		vec![Stage::DetectLanguage, Stage::Translate, Stage::VectorSearch, Stage::KeywordSearch]
	);
}

#[tokio::test]
async fn rerank_failure_keeps_merge_order() {
	let mut backends = backends();

	backends.rerank = Arc::new(FailingRerank);

	let outcome = engine_with(factstack_testkit::test_config(), backends)
		.run_query(ROLLBACK_ZH, QueryOptions::default())
		.await
		.expect("Query failed.");
	let rerank = stage(&outcome, Stage::Rerank);

	assert!(!rerank.ok);
	assert_eq!(rerank.metadata["backend_ok"], false);
	assert!(outcome.bundle.citations.iter().all(|citation| citation.rerank_score.is_none()));
	assert_eq!(outcome.bundle.citations[0].chunk_id, "runbook-rollback");
	assert!(outcome.bundle.usable);
}
