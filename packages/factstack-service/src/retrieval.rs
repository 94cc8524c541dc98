//! Channel retrieval: one query variant against both indexes, and the dual-channel fan-out.

use std::{
	fmt,
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{BackendError, BackendResult, Backends, IndexHit, query::Query};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
	Vector,
	Keyword,
}
impl Method {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Vector => "vector",
			Self::Keyword => "keyword",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
	Original,
	Translated,
}
impl Channel {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Original => "original",
			Self::Translated => "translated",
		}
	}
}

impl fmt::Display for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub chunk_id: String,
	pub source: String,
	pub text: String,
	/// Raw score on the method's own scale.
	pub score: f32,
	pub method: Method,
	pub channel: Channel,
	/// 1-based position within the list the index returned.
	pub rank: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct RetrievalLimits {
	pub top_k: u32,
	pub vector_timeout_ms: u64,
	pub keyword_timeout_ms: u64,
}

/// Result of one (channel, method) index call.
#[derive(Clone, Debug)]
pub struct ChannelResult {
	pub channel: Channel,
	pub method: Method,
	pub latency_ms: u64,
	pub outcome: BackendResult<Vec<Candidate>>,
}
impl ChannelResult {
	pub fn is_ok(&self) -> bool {
		self.outcome.is_ok()
	}

	pub fn count(&self) -> usize {
		self.outcome.as_ref().map(Vec::len).unwrap_or(0)
	}
}

#[derive(Clone, Debug, Default)]
pub struct Retrieval {
	pub results: Vec<ChannelResult>,
}
impl Retrieval {
	pub fn all_failed(&self) -> bool {
		!self.results.is_empty() && self.results.iter().all(|result| !result.is_ok())
	}

	/// Candidate lists from the calls that succeeded, in a fixed channel/method order.
	pub fn candidate_lists(&self) -> Vec<&[Candidate]> {
		self.results
			.iter()
			.filter_map(|result| result.outcome.as_ref().ok().map(Vec::as_slice))
			.collect()
	}

	pub fn for_method(&self, method: Method) -> impl Iterator<Item = &ChannelResult> {
		self.results.iter().filter(move |result| result.method == method)
	}

	pub fn count(&self, channel: Channel, method: Method) -> usize {
		self.results
			.iter()
			.filter(|result| result.channel == channel && result.method == method)
			.map(ChannelResult::count)
			.sum()
	}

	/// Trace metadata for one method's stage: per-channel counts, latency and failures.
	pub fn method_metadata(&self, method: Method) -> Map<String, Value> {
		let mut counts = Map::new();
		let mut failures = Map::new();
		let mut latencies = Map::new();

		for result in self.for_method(method) {
			counts.insert(result.channel.as_str().to_string(), result.count().into());
			latencies.insert(result.channel.as_str().to_string(), result.latency_ms.into());

			if let Err(err) = &result.outcome {
				failures.insert(result.channel.as_str().to_string(), err.to_string().into());
			}
		}

		let mut metadata = Map::new();

		metadata.insert("method".to_string(), method.as_str().into());
		metadata.insert("candidate_counts".to_string(), Value::Object(counts));
		metadata.insert("channel_latency_ms".to_string(), Value::Object(latencies));
		metadata.insert("failures".to_string(), Value::Object(failures));

		metadata
	}
}

/// Runs every active query variant against both indexes concurrently.
///
/// The translated variant only runs when `query` carries a translation. Failures are captured per
/// call and never abort sibling calls.
pub async fn retrieve(backends: &Backends, query: &Query, limits: RetrievalLimits) -> Retrieval {
	let original = retrieve_variant(backends, &query.text, Channel::Original, limits);
	let translated = async {
		match query.translated.as_deref() {
			Some(text) => Some(retrieve_variant(backends, text, Channel::Translated, limits).await),
			None => None,
		}
	};
	let ((original_vector, original_keyword), translated) = tokio::join!(original, translated);
	let mut results = vec![original_vector, original_keyword];

	if let Some((translated_vector, translated_keyword)) = translated {
		results.push(translated_vector);
		results.push(translated_keyword);
	}

	Retrieval { results }
}

async fn retrieve_variant(
	backends: &Backends,
	text: &str,
	channel: Channel,
	limits: RetrievalLimits,
) -> (ChannelResult, ChannelResult) {
	tokio::join!(
		search(backends, text, channel, Method::Vector, limits),
		search(backends, text, channel, Method::Keyword, limits),
	)
}

async fn search(
	backends: &Backends,
	text: &str,
	channel: Channel,
	method: Method,
	limits: RetrievalLimits,
) -> ChannelResult {
	let timeout_ms = match method {
		Method::Vector => limits.vector_timeout_ms,
		Method::Keyword => limits.keyword_timeout_ms,
	};
	let started = Instant::now();
	let call = match method {
		Method::Vector => backends.semantic.search(text, limits.top_k),
		Method::Keyword => backends.keyword.search(text, limits.top_k),
	};
	let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
		Ok(result) => result,
		Err(_) => Err(BackendError::Timeout { timeout_ms }),
	};
	let latency_ms = started.elapsed().as_millis() as u64;

	if let Err(err) = &outcome {
		warn!(
			error = %err,
			channel = channel.as_str(),
			method = method.as_str(),
			"Index search failed. Continuing with remaining channels."
		);
	}

	ChannelResult {
		channel,
		method,
		latency_ms,
		outcome: outcome.map(|hits| to_candidates(hits, channel, method, limits.top_k)),
	}
}

fn to_candidates(hits: Vec<IndexHit>, channel: Channel, method: Method, top_k: u32) -> Vec<Candidate> {
	hits.into_iter()
		.take(top_k as usize)
		.enumerate()
		.map(|(idx, hit)| Candidate {
			chunk_id: hit.chunk_id,
			source: hit.source,
			text: hit.text,
			score: hit.score,
			method,
			channel,
			rank: idx as u32 + 1,
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hit(id: &str, score: f32) -> IndexHit {
		IndexHit {
			chunk_id: id.to_string(),
			score,
			source: format!("{id}.md"),
			text: "text".to_string(),
		}
	}

	#[test]
	fn candidates_are_ranked_and_capped() {
		let hits = vec![hit("a", 0.9), hit("b", 0.5), hit("c", 0.1)];
		let candidates = to_candidates(hits, Channel::Translated, Method::Vector, 2);

		assert_eq!(candidates.len(), 2);
		assert_eq!(candidates[0].rank, 1);
		assert_eq!(candidates[1].chunk_id, "b");
		assert_eq!(candidates[1].rank, 2);
		assert!(candidates.iter().all(|c| c.channel == Channel::Translated));
	}

	#[test]
	fn all_failed_requires_every_call_to_fail() {
		let failed = |method| ChannelResult {
			channel: Channel::Original,
			method,
			latency_ms: 1,
			outcome: Err(BackendError::Unavailable { message: "down".to_string() }),
		};
		let mut retrieval = Retrieval { results: vec![failed(Method::Vector), failed(Method::Keyword)] };

		assert!(retrieval.all_failed());

		retrieval.results[1].outcome = Ok(Vec::new());

		assert!(!retrieval.all_failed());
		assert_eq!(retrieval.candidate_lists().len(), 1);
		assert!(!Retrieval::default().all_failed());
	}

	#[test]
	fn method_metadata_reports_failures_per_channel() {
		let retrieval = Retrieval {
			results: vec![ChannelResult {
				channel: Channel::Original,
				method: Method::Vector,
				latency_ms: 4,
				outcome: Err(BackendError::Timeout { timeout_ms: 50 }),
			}],
		};
		let metadata = retrieval.method_metadata(Method::Vector);

		assert_eq!(metadata["candidate_counts"]["original"], 0);
		assert_eq!(metadata["failures"]["original"], "Backend timed out after 50 ms.");
	}
}
