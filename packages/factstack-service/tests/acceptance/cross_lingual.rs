use std::{
	sync::{Arc, atomic::Ordering},
	time::{Duration, Instant},
};

use factstack_service::{
	LanguageTag, QueryOptions, Stage, TranslationMethod, TranslationMode, retrieval::Channel,
};
use factstack_testkit::{
	SlowTranslation, StaticTranslation, UnavailableIndex, UnavailableTranslation,
};

use super::{
	ROLLBACK_EN, ROLLBACK_ZH, backends, counting_backends, engine, engine_with, stage,
};

fn llm() -> QueryOptions {
	QueryOptions { translation_mode: Some(TranslationMode::Llm), ..Default::default() }
}

#[tokio::test]
async fn chinese_question_finds_english_runbook() {
	let outcome = engine()
		.run_query(ROLLBACK_ZH, QueryOptions::default())
		.await
		.expect("Query failed.");

	assert_eq!(outcome.query.language, LanguageTag::Zh);
	assert_eq!(outcome.query.method, TranslationMethod::Rule);
	assert_eq!(outcome.query.translated.as_deref(), Some("how to rollback deploy deployment"));
	assert!(outcome.bundle.usable, "{}", outcome.bundle.verdict.reason);
	assert!(outcome.bundle.verdict.leniency_applied);

	let top = &outcome.bundle.citations[0];

	assert_eq!(top.chunk_id, "runbook-rollback");
	assert_eq!(top.source, "docs/deployment_runbook.md");
	assert_eq!(top.channel, Channel::Translated);
	assert!(top.multiplicity >= 2);
	assert!(outcome.bundle.render_context().starts_with("[C1] Source: docs/deployment_runbook.md"));
}

#[tokio::test]
async fn both_variants_are_searched() {
	let (backends, counting) = counting_backends();
	let engine = engine_with(factstack_testkit::test_config(), backends);

	engine.run_query(ROLLBACK_ZH, QueryOptions::default()).await.expect("Query failed.");

	let queries = counting.queries.lock().expect("Lock poisoned.").clone();

	assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
	assert!(queries.contains(&ROLLBACK_ZH.to_string()));
	assert!(queries.contains(&"how to rollback deploy deployment".to_string()));
}

#[tokio::test]
async fn disabled_cross_lingual_searches_original_only() {
	let (backends, counting) = counting_backends();
	let engine = engine_with(factstack_testkit::test_config(), backends);
	let options = QueryOptions { cross_lingual: Some(false), ..Default::default() };
	let outcome = engine.run_query(ROLLBACK_ZH, options).await.expect("Query failed.");

	assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
	assert_eq!(outcome.query.method, TranslationMethod::Off);
	assert!(outcome.query.translated.is_none());
	// The English corpus has nothing for Chinese characters.
	assert!(!outcome.bundle.usable);
	assert!(outcome.bundle.citations.is_empty());

	let vector = stage(&outcome, Stage::VectorSearch);

	assert!(vector.metadata["candidate_counts"].get("translated").is_none());
}

#[tokio::test]
async fn disabled_cross_lingual_never_yields_translated_candidates() {
	let options = QueryOptions { cross_lingual: Some(false), ..Default::default() };
	let outcome = engine().run_query(ROLLBACK_EN, options).await.expect("Query failed.");

	assert_eq!(outcome.query.method, TranslationMethod::Off);
	assert!(!outcome.bundle.citations.is_empty());
	assert!(outcome.bundle.citations.iter().all(|citation| citation.channel == Channel::Original));
	assert_eq!(stage(&outcome, Stage::Refusal).metadata["cross_lingual_active"], false);
}

#[tokio::test]
async fn translation_without_multi_channel_hits_gets_no_leniency() {
	let mut backends = backends();

	// Only the keyword index answers, so every hit comes from a single (method, channel) pair.
	backends.semantic = Arc::new(UnavailableIndex);
	backends.translation = Some(Arc::new(StaticTranslation::new("rollback deployment")));

	let outcome = engine_with(factstack_testkit::test_config(), backends)
		.run_query(ROLLBACK_ZH, llm())
		.await
		.expect("Query failed.");
	let refusal = stage(&outcome, Stage::Refusal);

	assert!(outcome.query.is_translated());
	assert!(!outcome.bundle.citations.is_empty());
	assert!(outcome.bundle.citations.iter().all(|citation| citation.multiplicity == 1));
	assert_eq!(stage(&outcome, Stage::Merge).metadata["multi_channel_hits"], 0);
	assert_eq!(refusal.metadata["cross_lingual_active"], false);
	assert_eq!(refusal.metadata["leniency_applied"], false);
	assert!(!outcome.bundle.verdict.leniency_applied);
	assert_eq!(
		outcome.bundle.verdict.thresholds.min_top_score,
		factstack_config::RefusalThresholds::base().min_top_score
	);
}

#[tokio::test]
async fn english_question_needs_no_translation() {
	let (backends, counting) = counting_backends();
	let engine = engine_with(factstack_testkit::test_config(), backends);
	let outcome = engine.run_query(ROLLBACK_EN, QueryOptions::default()).await.expect("Query failed.");

	assert_eq!(outcome.query.language, LanguageTag::En);
	assert_eq!(outcome.query.method, TranslationMethod::NoneNeeded);
	assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
	assert_eq!(outcome.bundle.citations[0].chunk_id, "runbook-rollback");
}

#[tokio::test]
async fn llm_keywords_are_used_when_available() {
	let translation = Arc::new(StaticTranslation::new("rollback deployment"));
	let mut backends = backends();

	backends.translation = Some(translation.clone());

	let outcome = engine_with(factstack_testkit::test_config(), backends)
		.run_query(ROLLBACK_ZH, llm())
		.await
		.expect("Query failed.");

	assert_eq!(translation.calls.load(Ordering::SeqCst), 1);
	assert_eq!(outcome.query.method, TranslationMethod::Llm);
	assert_eq!(outcome.query.translated.as_deref(), Some("rollback deployment"));
	assert_eq!(outcome.bundle.citations[0].chunk_id, "runbook-rollback");
}

#[tokio::test]
async fn unavailable_llm_falls_back_to_dictionary() {
	let mut backends = backends();

	backends.translation = Some(Arc::new(UnavailableTranslation));

	let outcome = engine_with(factstack_testkit::test_config(), backends)
		.run_query(ROLLBACK_ZH, llm())
		.await
		.expect("Query failed.");
	let translate = stage(&outcome, Stage::Translate);

	assert_eq!(outcome.query.method, TranslationMethod::Rule);
	assert_eq!(translate.metadata["mode_requested"], "llm");
	assert_eq!(translate.metadata["mode_used"], "rule");
	assert_eq!(translate.metadata["fallback_reason"], "unavailable");
	assert!(outcome.bundle.usable);
}

#[tokio::test]
async fn missing_llm_backend_falls_back_to_dictionary() {
	let outcome = engine().run_query(ROLLBACK_ZH, llm()).await.expect("Query failed.");

	assert_eq!(outcome.query.method, TranslationMethod::Rule);
	assert_eq!(stage(&outcome, Stage::Translate).metadata["fallback_reason"], "backend_missing");
}

#[tokio::test]
async fn slow_llm_is_bounded_by_timeout() {
	let mut cfg = factstack_testkit::test_config();
	let mut backends = backends();

	cfg.translation.timeout_ms = 50;
	backends.translation = Some(Arc::new(SlowTranslation { delay: Duration::from_secs(5) }));

	let started = Instant::now();
	let outcome =
		engine_with(cfg, backends).run_query(ROLLBACK_ZH, llm()).await.expect("Query failed.");

	assert!(started.elapsed() < Duration::from_secs(3));
	assert_eq!(outcome.query.method, TranslationMethod::Rule);
	assert_eq!(stage(&outcome, Stage::Translate).metadata["fallback_reason"], "timeout");
	assert_eq!(outcome.bundle.citations[0].chunk_id, "runbook-rollback");
}
