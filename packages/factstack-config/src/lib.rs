mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Assemble, Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig, Providers,
	Qdrant, Refusal, RefusalThresholds, Rerank, Retrieval, Service, Storage, Trace, Translation,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, timeout_ms) in [
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.rerank.timeout_ms", cfg.providers.rerank.timeout_ms),
		("providers.translation.timeout_ms", cfg.providers.translation.timeout_ms),
		("retrieval.vector_timeout_ms", cfg.retrieval.vector_timeout_ms),
		("retrieval.keyword_timeout_ms", cfg.retrieval.keyword_timeout_ms),
		("translation.timeout_ms", cfg.translation.timeout_ms),
		("rerank.timeout_ms", cfg.rerank.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	validate_retrieval(cfg)?;

	if !matches!(cfg.translation.mode.as_str(), "llm" | "rule" | "off") {
		return Err(Error::Validation {
			message: "translation.mode must be one of llm, rule, or off.".to_string(),
		});
	}

	validate_rerank(cfg)?;
	validate_refusal(cfg)?;

	if cfg.assemble.max_snippet_chars < 16 {
		return Err(Error::Validation {
			message: "assemble.max_snippet_chars must be at least 16.".to_string(),
		});
	}
	if cfg.assemble.max_context_chars < cfg.assemble.max_snippet_chars {
		return Err(Error::Validation {
			message: "assemble.max_context_chars must be at least assemble.max_snippet_chars."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_retrieval(cfg: &Config) -> Result<()> {
	let retrieval = &cfg.retrieval;

	if retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if !matches!(retrieval.target_language.as_str(), "en" | "zh") {
		return Err(Error::Validation {
			message: "retrieval.target_language must be one of en or zh.".to_string(),
		});
	}

	for (label, weight) in [
		("retrieval.vector_weight", retrieval.vector_weight),
		("retrieval.keyword_weight", retrieval.keyword_weight),
		("retrieval.translated_weight", retrieval.translated_weight),
	] {
		unit_weight(label, weight)?;
	}

	if !retrieval.keyword_half_saturation.is_finite() || retrieval.keyword_half_saturation <= 0.0
	{
		return Err(Error::Validation {
			message: "retrieval.keyword_half_saturation must be a finite number greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_rerank(cfg: &Config) -> Result<()> {
	let rerank = &cfg.rerank;

	if !matches!(rerank.backend.as_str(), "lexical" | "provider") {
		return Err(Error::Validation {
			message: "rerank.backend must be one of lexical or provider.".to_string(),
		});
	}
	if rerank.window == 0 {
		return Err(Error::Validation {
			message: "rerank.window must be greater than zero.".to_string(),
		});
	}
	if rerank.limit == 0 {
		return Err(Error::Validation {
			message: "rerank.limit must be greater than zero.".to_string(),
		});
	}
	if !rerank.retrieval_weight.is_finite() || !(0.0..=1.0).contains(&rerank.retrieval_weight) {
		return Err(Error::Validation {
			message: "rerank.retrieval_weight must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

fn validate_refusal(cfg: &Config) -> Result<()> {
	let refusal = &cfg.refusal;

	if !matches!(refusal.profile.as_str(), "base" | "strict") {
		return Err(Error::Validation {
			message: "refusal.profile must be one of base or strict.".to_string(),
		});
	}

	unit_weight("refusal.lenience_factor", refusal.lenience_factor)?;

	if refusal.top_mean_window == 0 {
		return Err(Error::Validation {
			message: "refusal.top_mean_window must be greater than zero.".to_string(),
		});
	}

	for (profile, thresholds) in [("base", &refusal.base), ("strict", &refusal.strict)] {
		for (field, value) in [
			("min_top_score", thresholds.min_top_score),
			("min_top_mean", thresholds.min_top_mean),
			("quality_threshold", thresholds.quality_threshold),
			("relevance_threshold", thresholds.relevance_threshold),
			("min_coverage", thresholds.min_coverage),
		] {
			if !value.is_finite() || !(0.0..=1.0).contains(&value) {
				return Err(Error::Validation {
					message: format!("refusal.{profile}.{field} must be in the range 0.0-1.0."),
				});
			}
		}
	}

	Ok(())
}

fn unit_weight(label: &str, value: f32) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{label} must be a finite number.") });
	}
	if value <= 0.0 || value > 1.0 {
		return Err(Error::Validation {
			message: format!("{label} must be greater than 0.0 and at most 1.0."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.translation.mode = cfg.translation.mode.trim().to_ascii_lowercase();
	cfg.rerank.backend = cfg.rerank.backend.trim().to_ascii_lowercase();
	cfg.refusal.profile = cfg.refusal.profile.trim().to_ascii_lowercase();
	cfg.retrieval.target_language = cfg.retrieval.target_language.trim().to_ascii_lowercase();

	if cfg.trace.path.as_deref().map(|path| path.trim().is_empty()).unwrap_or(false) {
		cfg.trace.path = None;
	}
}
