use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub translation: Translation,
	#[serde(default)]
	pub rerank: Rerank,
	#[serde(default)]
	pub refusal: Refusal,
	#[serde(default)]
	pub assemble: Assemble,
	#[serde(default)]
	pub trace: Trace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub translation: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_k: u32,
	pub cross_lingual: bool,
	/// Language tag of the indexed corpus, either "en" or "zh".
	pub target_language: String,
	pub vector_weight: f32,
	pub keyword_weight: f32,
	/// Extra multiplier for candidates surfaced by the translated query.
	pub translated_weight: f32,
	/// Keyword score at which the scaled keyword score reaches 0.5.
	pub keyword_half_saturation: f32,
	pub vector_timeout_ms: u64,
	pub keyword_timeout_ms: u64,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			top_k: 8,
			cross_lingual: true,
			target_language: "en".to_string(),
			vector_weight: 1.0,
			keyword_weight: 1.0,
			translated_weight: 1.0,
			keyword_half_saturation: 2.0,
			vector_timeout_ms: 3_000,
			keyword_timeout_ms: 3_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Translation {
	pub mode: String,
	pub timeout_ms: u64,
}
impl Default for Translation {
	fn default() -> Self {
		Self { mode: "rule".to_string(), timeout_ms: 5_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Rerank {
	pub backend: String,
	/// Number of merged candidates handed to the reranker.
	pub window: u32,
	pub limit: u32,
	pub retrieval_weight: f32,
	pub timeout_ms: u64,
}
impl Default for Rerank {
	fn default() -> Self {
		Self {
			backend: "lexical".to_string(),
			window: 20,
			limit: 5,
			retrieval_weight: 0.5,
			timeout_ms: 5_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Refusal {
	pub profile: String,
	pub lenience_factor: f32,
	pub top_mean_window: u32,
	pub base: RefusalThresholds,
	pub strict: RefusalThresholds,
}
impl Default for Refusal {
	fn default() -> Self {
		Self {
			profile: "base".to_string(),
			lenience_factor: 0.8,
			top_mean_window: 5,
			base: RefusalThresholds::base(),
			strict: RefusalThresholds::strict(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RefusalThresholds {
	pub min_top_score: f32,
	pub min_top_mean: f32,
	/// Aggregated score a candidate must exceed to count as high quality.
	pub quality_threshold: f32,
	pub min_high_quality: u32,
	/// Aggregated score a candidate must exceed to count toward coverage.
	pub relevance_threshold: f32,
	pub min_coverage: f32,
}
impl RefusalThresholds {
	pub fn base() -> Self {
		Self {
			min_top_score: 0.3,
			min_top_mean: 0.15,
			quality_threshold: 0.45,
			min_high_quality: 1,
			relevance_threshold: 0.15,
			min_coverage: 0.2,
		}
	}

	pub fn strict() -> Self {
		Self {
			min_top_score: 0.5,
			min_top_mean: 0.3,
			quality_threshold: 0.6,
			min_high_quality: 2,
			relevance_threshold: 0.25,
			min_coverage: 0.4,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Assemble {
	pub max_snippet_chars: u32,
	pub max_context_chars: u32,
}
impl Default for Assemble {
	fn default() -> Self {
		Self { max_snippet_chars: 600, max_context_chars: 12_000 }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Trace {
	/// JSON Lines file receiving one record per stage. Unset routes events to the log.
	pub path: Option<String>,
}
