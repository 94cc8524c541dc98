pub mod assemble;
pub mod backends;
pub mod engine;
pub mod merge;
pub mod query;
pub mod refusal;
pub mod rerank;
pub mod retrieval;
pub mod trace;
pub mod translate;

mod error;

use std::{future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};

pub use assemble::{Citation, EvidenceBundle};
pub use engine::{Engine, QueryOptions, QueryOutcome};
pub use error::{BackendError, BackendResult, Error, Result};
pub use factstack_domain::language::LanguageTag;
pub use merge::{MergedCandidate, MergedPool};
pub use query::{Query, TranslationMethod, TranslationMode};
pub use refusal::{Indicator, Indicators, Profile, RefusalVerdict};
pub use rerank::RankedCandidate;
pub use retrieval::{Candidate, Channel, Method};
pub use trace::{Stage, TraceEvent, TraceSink};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chunk returned by an index collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
	pub chunk_id: String,
	pub score: f32,
	pub source: String,
	pub text: String,
}

/// Dense similarity search. Scores are expected in a bounded similarity range.
pub trait SemanticIndex
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a str, k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>>;
}

/// Lexical search. Scores are an unbounded ranking statistic such as BM25.
pub trait KeywordIndex
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a str, k: u32) -> BoxFuture<'a, BackendResult<Vec<IndexHit>>>;
}

/// Generates retrieval keywords (never prose) for `text` in the `target` language.
pub trait TranslationBackend
where
	Self: Send + Sync,
{
	fn generate_keywords<'a>(
		&'a self,
		text: &'a str,
		target: LanguageTag,
	) -> BoxFuture<'a, BackendResult<String>>;
}

/// Scores each document against the query. The result must be aligned with `docs`.
pub trait RerankBackend
where
	Self: Send + Sync,
{
	fn score<'a>(&'a self, query: &'a str, docs: &'a [String])
	-> BoxFuture<'a, BackendResult<Vec<f32>>>;
}

#[derive(Clone)]
pub struct Backends {
	pub semantic: Arc<dyn SemanticIndex>,
	pub keyword: Arc<dyn KeywordIndex>,
	/// `None` means no generation collaborator is wired; `llm` mode then falls back to `rule`.
	pub translation: Option<Arc<dyn TranslationBackend>>,
	pub rerank: Arc<dyn RerankBackend>,
	pub trace: Arc<dyn TraceSink>,
}
