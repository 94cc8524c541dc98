use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
	BackendError, TranslationBackend,
	query::{TranslationMethod, TranslationMode},
};
use factstack_domain::{
	dictionary::{self, DictionaryHit},
	language::{self, LanguageTag},
};

/// Why a requested `llm` translation was replaced by `rule`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
	BackendMissing,
	Unavailable,
	Timeout,
	Failed,
	InvalidOutput,
}
impl FallbackReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::BackendMissing => "backend_missing",
			Self::Unavailable => "unavailable",
			Self::Timeout => "timeout",
			Self::Failed => "failed",
			Self::InvalidOutput => "invalid_output",
		}
	}
}

#[derive(Clone, Debug)]
pub struct TranslationRequest<'a> {
	pub text: &'a str,
	pub language: LanguageTag,
	pub target: LanguageTag,
	pub mode: TranslationMode,
	pub timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct TranslationOutcome {
	/// Translated text, or `None` when no translated variant should be searched.
	pub translated: Option<String>,
	pub method: TranslationMethod,
	pub fallback: Option<FallbackReason>,
	pub fallback_error: Option<String>,
	pub hits: Vec<DictionaryHit>,
}
impl TranslationOutcome {
	fn untranslated(method: TranslationMethod) -> Self {
		Self { translated: None, method, fallback: None, fallback_error: None, hits: Vec::new() }
	}

	pub fn metadata(&self, request: &TranslationRequest<'_>) -> Map<String, Value> {
		let mut metadata = Map::new();

		metadata.insert("detected_language".to_string(), request.language.as_str().into());
		metadata.insert("target_language".to_string(), request.target.as_str().into());
		metadata.insert("original_query".to_string(), request.text.into());
		metadata.insert(
			"translated_query".to_string(),
			self.translated.clone().map(Value::String).unwrap_or(Value::Null),
		);
		metadata.insert("mode_requested".to_string(), request.mode.as_str().into());
		metadata.insert("mode_used".to_string(), self.method.as_str().into());
		metadata.insert(
			"fallback_reason".to_string(),
			self.fallback.map(|reason| Value::from(reason.as_str())).unwrap_or(Value::Null),
		);
		metadata.insert(
			"dictionary_hits".to_string(),
			serde_json::to_value(&self.hits).unwrap_or(Value::Null),
		);

		if let Some(error) = &self.fallback_error {
			metadata.insert("fallback_error".to_string(), error.clone().into());
		}

		metadata
	}
}

/// Produces the retrieval-oriented translation of a query. Never fails.
pub async fn translate(
	request: &TranslationRequest<'_>,
	backend: Option<&dyn TranslationBackend>,
) -> TranslationOutcome {
	if request.mode == TranslationMode::Off {
		return TranslationOutcome::untranslated(TranslationMethod::Off);
	}
	if !language::needs_translation(request.language, request.target) {
		return TranslationOutcome::untranslated(TranslationMethod::NoneNeeded);
	}
	if request.mode == TranslationMode::Rule {
		return translate_rule(request.text, request.target, None, None);
	}

	let Some(backend) = backend else {
		warn!("Translation backend is not configured. Falling back to rule translation.");

		return translate_rule(request.text, request.target, Some(FallbackReason::BackendMissing), None);
	};
	let call = backend.generate_keywords(request.text, request.target);
	let result = match tokio::time::timeout(Duration::from_millis(request.timeout_ms), call).await {
		Ok(result) => result,
		Err(_) => Err(BackendError::Timeout { timeout_ms: request.timeout_ms }),
	};

	match result {
		Ok(keywords) => match validate_keywords(&keywords, request.target) {
			Some(text) => finish(request.text, text, TranslationMethod::Llm, Vec::new(), None, None),
			None => {
				warn!(
					target_language = request.target.as_str(),
					"Translation backend returned unusable keywords. Falling back to rule translation."
				);

				translate_rule(request.text, request.target, Some(FallbackReason::InvalidOutput), None)
			},
		},
		Err(err) => {
			let reason = match &err {
				BackendError::Unavailable { .. } => FallbackReason::Unavailable,
				BackendError::Timeout { .. } => FallbackReason::Timeout,
				BackendError::Failed { .. } => FallbackReason::Failed,
			};

			warn!(
				error = %err,
				reason = reason.as_str(),
				"Translation backend failed. Falling back to rule translation."
			);

			translate_rule(request.text, request.target, Some(reason), Some(err.to_string()))
		},
	}
}

fn translate_rule(
	text: &str,
	target: LanguageTag,
	fallback: Option<FallbackReason>,
	fallback_error: Option<String>,
) -> TranslationOutcome {
	let out = dictionary::bundled().translate(text, target);

	finish(text, out.text, TranslationMethod::Rule, out.hits, fallback, fallback_error)
}

fn finish(
	original: &str,
	translated: String,
	method: TranslationMethod,
	hits: Vec<DictionaryHit>,
	fallback: Option<FallbackReason>,
	fallback_error: Option<String>,
) -> TranslationOutcome {
	let translated = translated.trim();
	let translated = if translated.is_empty() || translated == original.trim() {
		None
	} else {
		Some(translated.to_string())
	};

	TranslationOutcome { translated, method, fallback, fallback_error, hits }
}

fn validate_keywords(keywords: &str, target: LanguageTag) -> Option<String> {
	let joined = keywords.split_whitespace().collect::<Vec<_>>().join(" ");

	if joined.is_empty() {
		return None;
	}
	if target == LanguageTag::En && language::contains_cjk(&joined) {
		return None;
	}

	Some(joined)
}
