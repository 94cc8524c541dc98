use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
	BackendError, BackendResult, BoxFuture, RerankBackend,
	merge::{MergedCandidate, MergedPool},
};
use factstack_domain::text;

const PHRASE_BONUS: f32 = 0.3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
	#[serde(flatten)]
	pub merged: MergedCandidate,
	/// Blended rerank score, absent for entries outside the window or when the backend failed.
	pub rerank_score: Option<f32>,
}
impl RankedCandidate {
	pub fn score(&self) -> f32 {
		self.merged.score
	}
}

#[derive(Clone, Copy, Debug)]
pub struct RerankSettings {
	pub window: u32,
	pub limit: u32,
	pub retrieval_weight: f32,
	pub timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct RerankOutcome {
	pub candidates: Vec<RankedCandidate>,
	pub window: usize,
	pub latency_ms: u64,
	pub error: Option<BackendError>,
}

/// Built-in reranker: share of query terms found in the document plus a bonus for the exact phrase.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalReranker;
impl LexicalReranker {
	pub fn score_one(query: &str, doc: &str) -> f32 {
		let terms = text::tokenize_terms(query);
		let mut score = text::lexical_overlap_ratio(&terms, doc);

		if text::contains_phrase(doc, query) {
			score += PHRASE_BONUS;
		}

		score.min(1.0)
	}
}

impl RerankBackend for LexicalReranker {
	fn score<'a>(
		&'a self,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, BackendResult<Vec<f32>>> {
		Box::pin(async move { Ok(docs.iter().map(|doc| Self::score_one(query, doc)).collect()) })
	}
}

/// Reorders the first `window` pool entries with the backend signal and truncates to `limit`.
///
/// Backend failure keeps the merge order. Entries past the window keep their merge order after the
/// reranked ones.
pub async fn rerank(
	pool: MergedPool,
	query: &str,
	settings: RerankSettings,
	backend: &dyn RerankBackend,
) -> RerankOutcome {
	let mut entries = pool.into_entries();
	let window = (settings.window as usize).min(entries.len());
	let tail = entries.split_off(window);
	let docs: Vec<String> = entries.iter().map(|entry| entry.candidate.text.clone()).collect();
	let started = Instant::now();
	let result = if docs.is_empty() {
		Ok(Vec::new())
	} else {
		let call = backend.score(query, &docs);

		match tokio::time::timeout(Duration::from_millis(settings.timeout_ms), call).await {
			Ok(result) => result,
			Err(_) => Err(BackendError::Timeout { timeout_ms: settings.timeout_ms }),
		}
	};
	let latency_ms = started.elapsed().as_millis() as u64;
	let result = result.and_then(|scores| {
		if scores.len() == entries.len() {
			Ok(scores)
		} else {
			Err(BackendError::Failed {
				message: format!(
					"Reranker returned {} scores for {} documents.",
					scores.len(),
					entries.len()
				),
			})
		}
	});
	let (mut candidates, error) = match result {
		Ok(scores) => (blend(entries, &scores, settings.retrieval_weight), None),
		Err(err) => {
			warn!(error = %err, "Rerank backend failed. Keeping merge order.");

			(unscored(entries), Some(err))
		},
	};

	candidates.extend(unscored(tail));
	candidates.truncate(settings.limit as usize);

	RerankOutcome { candidates, window, latency_ms, error }
}

fn blend(entries: Vec<MergedCandidate>, scores: &[f32], retrieval_weight: f32) -> Vec<RankedCandidate> {
	let mut ranked: Vec<RankedCandidate> = entries
		.into_iter()
		.zip(scores)
		.map(|(merged, backend_score)| {
			let backend_score = if backend_score.is_finite() { *backend_score } else { 0.0 };
			let blended = retrieval_weight * merged.score + (1.0 - retrieval_weight) * backend_score;

			RankedCandidate { merged, rerank_score: Some(blended) }
		})
		.collect();

	// Stable: equal blended scores keep merge order.
	ranked.sort_by(|a, b| {
		crate::merge::cmp_f32_desc(a.rerank_score.unwrap_or(0.0), b.rerank_score.unwrap_or(0.0))
	});

	ranked
}

fn unscored(entries: Vec<MergedCandidate>) -> Vec<RankedCandidate> {
	entries.into_iter().map(|merged| RankedCandidate { merged, rerank_score: None }).collect()
}
