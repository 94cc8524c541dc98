//! Production collaborators: Qdrant indexes and HTTP providers behind the service traits.

use std::sync::Arc;

use tracing::info;

use crate::{
	BackendError, BackendResult, Backends, BoxFuture, IndexHit, KeywordIndex, LanguageTag,
	RerankBackend, Result, SemanticIndex, TranslationBackend,
	rerank::LexicalReranker,
	trace::{JsonlTraceSink, LogTraceSink, TraceSink},
};
use factstack_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use factstack_storage::qdrant::{QdrantStore, StoredHit};

impl Backends {
	/// Wires the Qdrant indexes and the configured providers.
	///
	/// The translation backend is left out when no credential is configured, so `llm` requests fall
	/// back to the dictionary.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let store = Arc::new(QdrantStore::new(&cfg.storage.qdrant)?);
		let semantic = Arc::new(QdrantSemanticIndex {
			store: store.clone(),
			embedding: cfg.providers.embedding.clone(),
		});
		let keyword = Arc::new(QdrantKeywordIndex { store });
		let translation: Option<Arc<dyn TranslationBackend>> =
			if cfg.providers.translation.api_key.trim().is_empty() {
				None
			} else {
				Some(Arc::new(HttpTranslationBackend { cfg: cfg.providers.translation.clone() }))
			};
		let rerank: Arc<dyn RerankBackend> = match cfg.rerank.backend.as_str() {
			"provider" => Arc::new(HttpRerankBackend { cfg: cfg.providers.rerank.clone() }),
			_ => Arc::new(LexicalReranker),
		};
		let trace: Arc<dyn TraceSink> = match cfg.trace.path.as_deref() {
			Some(path) => Arc::new(JsonlTraceSink::new(path)),
			None => Arc::new(LogTraceSink),
		};

		info!(
			collection = %cfg.storage.qdrant.collection,
			rerank_backend = %cfg.rerank.backend,
			translation_backend = translation.is_some(),
			"Backends configured."
		);

		Ok(Self { semantic, keyword, translation, rerank, trace })
	}
}

/// Embeds the query text, then searches the dense vector of the collection.
pub struct QdrantSemanticIndex {
	pub store: Arc<QdrantStore>,
	pub embedding: EmbeddingProviderConfig,
}
impl SemanticIndex for QdrantSemanticIndex {
	fn search<'a>(&'a self, query: &'a str, k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		Box::pin(async move {
			let mut vectors = factstack_providers::embedding::embed(&self.embedding, &[query.to_string()])
				.await
				.map_err(|err| provider_error(err, self.embedding.timeout_ms))?;
			let Some(vector) = vectors.pop() else {
				return Err(BackendError::Failed {
					message: "Embedding provider returned no vectors.".to_string(),
				});
			};
			let hits = self.store.search_dense(vector, k).await?;

			Ok(hits.into_iter().map(index_hit).collect())
		})
	}
}

/// Searches the BM25 sparse vector of the collection.
pub struct QdrantKeywordIndex {
	pub store: Arc<QdrantStore>,
}
impl KeywordIndex for QdrantKeywordIndex {
	fn search<'a>(&'a self, query: &'a str, k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>> {
		Box::pin(async move {
			let hits = self.store.search_bm25(query, k).await?;

			Ok(hits.into_iter().map(index_hit).collect())
		})
	}
}

pub struct HttpTranslationBackend {
	pub cfg: LlmProviderConfig,
}
impl TranslationBackend for HttpTranslationBackend {
	fn generate_keywords<'a>(
		&'a self,
		text: &'a str,
		target: LanguageTag,
	) -> BoxFuture<'a, BackendResult<String>> {
		Box::pin(async move {
			let keywords =
				factstack_providers::keywords::generate_keywords(&self.cfg, text, target.as_str())
					.await
					.map_err(|err| provider_error(err, self.cfg.timeout_ms))?;

			Ok(keywords.join(" "))
		})
	}
}

pub struct HttpRerankBackend {
	pub cfg: ProviderConfig,
}
impl RerankBackend for HttpRerankBackend {
	fn score<'a>(
		&'a self,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, BackendResult<Vec<f32>>> {
		Box::pin(async move {
			factstack_providers::rerank::rerank(&self.cfg, query, docs)
				.await
				.map_err(|err| provider_error(err, self.cfg.timeout_ms))
		})
	}
}

fn provider_error(err: factstack_providers::Error, timeout_ms: u64) -> BackendError {
	match err {
		factstack_providers::Error::Unavailable { message } => BackendError::Unavailable { message },
		err if err.is_timeout() => BackendError::Timeout { timeout_ms },
		err => BackendError::Failed { message: err.to_string() },
	}
}

fn index_hit(hit: StoredHit) -> IndexHit {
	IndexHit { chunk_id: hit.chunk_id, score: hit.score, source: hit.source, text: hit.text }
}
