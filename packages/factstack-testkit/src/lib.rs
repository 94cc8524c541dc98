//! In-memory collaborators and fixtures for exercising the pipeline without Qdrant or providers.

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Map;

use factstack_config::{
	Assemble, Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig, Providers,
	Qdrant, Refusal, Rerank, Retrieval, Service, Storage, Trace, Translation,
};
use factstack_domain::text;
use factstack_service::{
	BackendError, BackendResult, Backends, BoxFuture, IndexHit, KeywordIndex, LanguageTag,
	RerankBackend, SemanticIndex, TraceEvent, TraceSink, TranslationBackend,
	rerank::LexicalReranker,
};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
	pub chunk_id: String,
	pub source: String,
	pub text: String,
}
impl Chunk {
	pub fn new(chunk_id: &str, source: &str, text: &str) -> Self {
		Self { chunk_id: chunk_id.to_string(), source: source.to_string(), text: text.to_string() }
	}

	fn hit(&self, score: f32) -> IndexHit {
		IndexHit {
			chunk_id: self.chunk_id.clone(),
			score,
			source: self.source.clone(),
			text: self.text.clone(),
		}
	}
}

/// A small English operations corpus. `runbook-rollback` answers rollback questions.
pub fn sample_corpus() -> Vec<Chunk> {
	vec![
		Chunk::new(
			"runbook-rollback",
			"docs/deployment_runbook.md",
			"Deployment runbook: to rollback a deployment, run the rollback script and verify the service health.",
		),
		Chunk::new(
			"db-pool",
			"docs/database_guide.md",
			"Database connection pool settings: raise the pool size when connections time out under load.",
		),
		Chunk::new(
			"alert-routing",
			"docs/alerting.md",
			"Alert routing sends pages to the on call engineer when latency exceeds the threshold.",
		),
		Chunk::new(
			"cache-expiry",
			"docs/cache_notes.md",
			"Cache entries expire after ten minutes. Clear the cache after a release.",
		),
		Chunk::new(
			"cluster-scaling",
			"docs/cluster_ops.md",
			"Scale the cluster by adding nodes, then check node health with the status command.",
		),
		Chunk::new(
			"log-retention",
			"docs/logging.md",
			"Service logs are shipped to the central store and kept for thirty days.",
		),
	]
}

pub fn test_config() -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "factstack_test".to_string(),
				vector_dim: 8,
			},
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/embeddings".to_string(),
				model: "test".to_string(),
				dimensions: 8,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			rerank: ProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/rerank".to_string(),
				model: "test".to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			translation: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/chat/completions".to_string(),
				model: "test".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		retrieval: Retrieval::default(),
		translation: Translation::default(),
		rerank: Rerank::default(),
		refusal: Refusal::default(),
		assemble: Assemble::default(),
		trace: Trace::default(),
	}
}

/// In-memory backends over `corpus`: no translation backend, lexical rerank, in-memory trace.
pub fn memory_backends(corpus: &[Chunk]) -> Backends {
	Backends {
		semantic: Arc::new(MemorySemanticIndex::new(corpus.to_vec())),
		keyword: Arc::new(MemoryKeywordIndex::new(corpus.to_vec())),
		translation: None,
		rerank: Arc::new(LexicalReranker),
		trace: Arc::new(MemoryTraceSink::default()),
	}
}

/// Okapi BM25 over the domain tokenizer. Chunks with no matching term are not returned.
pub struct MemoryKeywordIndex {
	chunks: Vec<Chunk>,
	terms: Vec<Vec<String>>,
	avg_len: f32,
}
impl MemoryKeywordIndex {
	pub fn new(chunks: Vec<Chunk>) -> Self {
		let terms: Vec<Vec<String>> = chunks.iter().map(|chunk| text::terms(&chunk.text)).collect();
		let total: usize = terms.iter().map(Vec::len).sum();
		let avg_len = if terms.is_empty() { 0.0 } else { total as f32 / terms.len() as f32 };

		Self { chunks, terms, avg_len }
	}

	pub fn scores(&self, query: &str) -> Vec<(usize, f32)> {
		let query_terms = text::tokenize_terms(query);
		let n = self.chunks.len() as f32;
		let mut out = Vec::new();

		for (idx, doc_terms) in self.terms.iter().enumerate() {
			let len = doc_terms.len() as f32;
			let mut score = 0.0_f32;

			for term in &query_terms {
				let tf = doc_terms.iter().filter(|t| *t == term).count() as f32;

				if tf == 0.0 {
					continue;
				}

				let df = self.terms.iter().filter(|doc| doc.contains(term)).count() as f32;
				let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
				let norm = 1.0 - BM25_B + BM25_B * len / self.avg_len.max(1.0);

				score += idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm);
			}

			if score > 0.0 {
				out.push((idx, score));
			}
		}

		sort_scored(&mut out, &self.chunks);

		out
	}
}

impl KeywordIndex for MemoryKeywordIndex {
	fn search<'a>(&'a self, query: &'a str, k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		let hits = self
			.scores(query)
			.into_iter()
			.take(k as usize)
			.map(|(idx, score)| self.chunks[idx].hit(score))
			.collect();

		Box::pin(async move { Ok(hits) })
	}
}

/// Cosine similarity of term-frequency vectors, standing in for dense embeddings.
pub struct MemorySemanticIndex {
	chunks: Vec<Chunk>,
	vectors: Vec<HashMap<String, f32>>,
}
impl MemorySemanticIndex {
	pub fn new(chunks: Vec<Chunk>) -> Self {
		let vectors = chunks.iter().map(|chunk| term_vector(&chunk.text)).collect();

		Self { chunks, vectors }
	}

	pub fn scores(&self, query: &str) -> Vec<(usize, f32)> {
		let query_vector = term_vector(query);
		let mut out: Vec<(usize, f32)> = self
			.vectors
			.iter()
			.enumerate()
			.map(|(idx, vector)| (idx, cosine(&query_vector, vector)))
			.filter(|(_, score)| *score > 0.0)
			.collect();

		sort_scored(&mut out, &self.chunks);

		out
	}
}

impl SemanticIndex for MemorySemanticIndex {
	fn search<'a>(&'a self, query: &'a str, k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		let hits = self
			.scores(query)
			.into_iter()
			.take(k as usize)
			.map(|(idx, score)| self.chunks[idx].hit(score))
			.collect();

		Box::pin(async move { Ok(hits) })
	}
}

/// Fails every call as if the index were down.
pub struct UnavailableIndex;
impl UnavailableIndex {
	fn fail<'a>() -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		Box::pin(async {
			Err(BackendError::Unavailable { message: "index is offline".to_string() })
		})
	}
}

impl SemanticIndex for UnavailableIndex {
	fn search<'a>(&'a self, _query: &'a str, _k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		Self::fail()
	}
}

impl KeywordIndex for UnavailableIndex {
	fn search<'a>(&'a self, _query: &'a str, _k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		Self::fail()
	}
}

/// Sleeps before answering with nothing.
pub struct SlowIndex {
	pub delay: Duration,
}
impl SlowIndex {
	fn wait<'a>(&'a self) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			Ok(Vec::new())
		})
	}
}

impl SemanticIndex for SlowIndex {
	fn search<'a>(&'a self, _query: &'a str, _k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		self.wait()
	}
}

impl KeywordIndex for SlowIndex {
	fn search<'a>(&'a self, _query: &'a str, _k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		self.wait()
	}
}

/// Records every query it forwards to the wrapped semantic index.
pub struct CountingIndex {
	pub inner: Arc<dyn SemanticIndex>,
	pub calls: Arc<AtomicUsize>,
	pub queries: Arc<Mutex<Vec<String>>>,
}
impl CountingIndex {
	pub fn new(inner: Arc<dyn SemanticIndex>) -> Self {
		Self { inner, calls: Arc::new(AtomicUsize::new(0)), queries: Arc::new(Mutex::new(Vec::new())) }
	}
}

impl SemanticIndex for CountingIndex {
	fn search<'a>(&'a self, query: &'a str, k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).push(query.to_string());

		self.inner.search(query, k)
	}
}

/// Returns the same keywords for every question.
pub struct StaticTranslation {
	pub keywords: String,
	pub calls: Arc<AtomicUsize>,
}
impl StaticTranslation {
	pub fn new(keywords: &str) -> Self {
		Self { keywords: keywords.to_string(), calls: Arc::new(AtomicUsize::new(0)) }
	}
}

impl TranslationBackend for StaticTranslation {
	fn generate_keywords<'a>(
		&'a self,
		_text: &'a str,
		_target: LanguageTag,
	) -> BoxFuture<'a, BackendResult<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let keywords = self.keywords.clone();

		Box::pin(async move { Ok(keywords) })
	}
}

pub struct UnavailableTranslation;
impl TranslationBackend for UnavailableTranslation {
	fn generate_keywords<'a>(
		&'a self,
		_text: &'a str,
		_target: LanguageTag,
	) -> BoxFuture<'a, BackendResult<String>> {
		Box::pin(async {
			Err(BackendError::Unavailable { message: "generation service is offline".to_string() })
		})
	}
}

pub struct SlowTranslation {
	pub delay: Duration,
}
impl TranslationBackend for SlowTranslation {
	fn generate_keywords<'a>(
		&'a self,
		_text: &'a str,
		_target: LanguageTag,
	) -> BoxFuture<'a, BackendResult<String>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			Ok("rollback deployment".to_string())
		})
	}
}

/// Rerank backend that always fails.
pub struct FailingRerank;
impl RerankBackend for FailingRerank {
	fn score<'a>(
		&'a self,
		_query: &'a str,
		_docs: &'a [String],
	) -> BoxFuture<'a, BackendResult<Vec<f32>>> {
		Box::pin(async { Err(BackendError::Failed { message: "rerank service error".to_string() }) })
	}
}

/// Keeps every emitted event for later inspection.
#[derive(Default)]
pub struct MemoryTraceSink {
	events: Mutex<Vec<TraceEvent>>,
}
impl MemoryTraceSink {
	pub fn events(&self) -> Vec<TraceEvent> {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}

impl TraceSink for MemoryTraceSink {
	fn emit(&self, event: &TraceEvent) {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).push(event.clone());
	}
}

fn term_vector(text: &str) -> HashMap<String, f32> {
	let mut out = HashMap::new();

	for term in text::terms(text) {
		*out.entry(term).or_insert(0.0) += 1.0;
	}

	out
}

fn cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
	let dot: f32 = a.iter().filter_map(|(term, x)| b.get(term).map(|y| x * y)).sum();

	if dot == 0.0 {
		return 0.0;
	}

	let norm = |v: &HashMap<String, f32>| v.values().map(|x| x * x).sum::<f32>().sqrt();

	dot / (norm(a) * norm(b))
}

fn sort_scored(scored: &mut [(usize, f32)], chunks: &[Chunk]) {
	scored.sort_by(|a, b| {
		b.1.partial_cmp(&a.1)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| chunks[a.0].chunk_id.cmp(&chunks[b.0].chunk_id))
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keyword_index_ranks_matching_chunk_first() {
		let index = MemoryKeywordIndex::new(sample_corpus());
		let scores = index.scores("rollback deployment");

		assert_eq!(scores.len(), 1);
		assert_eq!(index.chunks[scores[0].0].chunk_id, "runbook-rollback");
	}

	#[test]
	fn semantic_index_skips_unrelated_chunks() {
		let index = MemorySemanticIndex::new(sample_corpus());

		assert!(index.scores("量子色动力学").is_empty());

		let scores = index.scores("how to rollback deploy deployment");

		assert_eq!(index.chunks[scores[0].0].chunk_id, "runbook-rollback");
		assert!((scores[0].1 - 0.5).abs() < 1e-3);
	}
}
