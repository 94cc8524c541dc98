use factstack_service::{Error, Indicator, Profile, QueryOptions};

use super::{ROLLBACK_ZH, UNRELATED_EN, engine};

#[tokio::test]
async fn unrelated_question_is_refused() {
	let outcome = engine().run_query(UNRELATED_EN, QueryOptions::default()).await.expect("Query failed.");
	let verdict = &outcome.bundle.verdict;

	assert!(!outcome.bundle.usable);
	assert!(!verdict.accepted);
	assert!(verdict.failed.contains(&Indicator::TopScore));
	assert!(verdict.failed.contains(&Indicator::TopMean));
	assert!(verdict.reason.starts_with("Insufficient evidence"));
	assert!(outcome.bundle.citations.is_empty());
}

#[tokio::test]
async fn strict_profile_demands_more_high_quality_evidence() {
	let base = engine().run_query(ROLLBACK_ZH, QueryOptions::default()).await.expect("Query failed.");
	let options = QueryOptions { profile: Some(Profile::Strict), ..Default::default() };
	let strict = engine().run_query(ROLLBACK_ZH, options).await.expect("Query failed.");

	assert!(base.bundle.usable);
	assert!(!strict.bundle.usable);
	assert_eq!(strict.bundle.verdict.profile, Profile::Strict);
	assert_eq!(strict.bundle.verdict.failed, vec![Indicator::HighQualityCount]);
	// Refused bundles still carry what was found.
	assert_eq!(strict.bundle.citations[0].chunk_id, "runbook-rollback");
}

#[tokio::test]
async fn repeated_queries_give_identical_evidence() {
	let engine = engine();
	let first = engine.run_query(ROLLBACK_ZH, QueryOptions::default()).await.expect("Query failed.");
	let second = engine.run_query(ROLLBACK_ZH, QueryOptions::default()).await.expect("Query failed.");

	assert_eq!(first.query, second.query);
	assert_eq!(first.bundle, second.bundle);
	assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
	let engine = engine();

	for (question, options) in [
		("   ", QueryOptions::default()),
		(ROLLBACK_ZH, QueryOptions { top_k: Some(0), ..Default::default() }),
		(ROLLBACK_ZH, QueryOptions { limit: Some(0), ..Default::default() }),
	] {
		let err = engine.run_query(question, options).await.expect_err("Expected rejection.");

		assert!(matches!(err, Error::InvalidRequest { .. }), "{err}");
	}
}

#[tokio::test]
async fn limit_caps_citations() {
	let options = QueryOptions { limit: Some(1), ..Default::default() };
	let outcome = engine().run_query(ROLLBACK_ZH, options).await.expect("Query failed.");

	assert_eq!(outcome.bundle.citations.len(), 1);
	assert_eq!(outcome.bundle.citations[0].number, 1);
}
