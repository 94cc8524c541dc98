use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
	Backends, Error, Result,
	assemble::{self, AssembleLimits, EvidenceBundle},
	merge::{self, MergedPool, ScoreScale},
	query::{Query, TranslationMode},
	refusal::{self, Profile, RefusalPolicy},
	rerank::{self, RerankOutcome, RerankSettings},
	retrieval::{self, Channel, Method, Retrieval, RetrievalLimits},
	trace::{Stage, StageRecord, TraceEvent, Tracer},
	translate::{self, TranslationRequest},
};
use factstack_config::Config;
use factstack_domain::language::{self, LanguageTag};

/// Per-request overrides. Unset fields fall back to configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryOptions {
	pub cross_lingual: Option<bool>,
	pub translation_mode: Option<TranslationMode>,
	pub top_k: Option<u32>,
	pub limit: Option<u32>,
	pub profile: Option<Profile>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryOutcome {
	pub run_id: Uuid,
	pub query: Query,
	pub bundle: EvidenceBundle,
	pub trace: Vec<TraceEvent>,
}

pub struct Engine {
	pub cfg: Config,
	pub backends: Backends,
}

struct Settings {
	cross_lingual: bool,
	mode: TranslationMode,
	target: LanguageTag,
	limits: RetrievalLimits,
	rerank: RerankSettings,
	policy: RefusalPolicy,
}

impl Engine {
	pub fn new(cfg: Config, backends: Backends) -> Self {
		Self { cfg, backends }
	}

	pub fn from_config(cfg: Config) -> Result<Self> {
		let backends = Backends::from_config(&cfg)?;

		Ok(Self::new(cfg, backends))
	}

	/// Runs one question through detection, translation, dual-channel retrieval, merge, rerank,
	/// refusal and assembly.
	///
	/// A refusal is a successful outcome. Only an invalid request or the failure of every index
	/// call is an error.
	pub async fn run_query(&self, question: &str, options: QueryOptions) -> Result<QueryOutcome> {
		let question = question.trim();

		if question.is_empty() {
			return Err(Error::InvalidRequest { message: "question must be non-empty.".to_string() });
		}

		let settings = self.resolve(&options)?;
		let run_id = Uuid::new_v4();
		let mut tracer = Tracer::new(run_id, self.backends.trace.clone());

		debug!(run_id = %run_id, "Query started.");

		let query = self.prepare_query(question, &settings, &mut tracer).await;
		let started = Instant::now();
		let retrieval = retrieval::retrieve(&self.backends, &query, settings.limits).await;

		for method in [Method::Vector, Method::Keyword] {
			record_search(&mut tracer, &query, &retrieval, method);
		}

		if retrieval.all_failed() {
			return Err(Error::RetrievalUnavailable {
				message: format!(
					"All {} index calls failed after {} ms.",
					retrieval.results.len(),
					started.elapsed().as_millis()
				),
			});
		}

		let started = Instant::now();
		let pool = merge::merge(
			retrieval.candidate_lists(),
			&ScoreScale::from_config(&self.cfg.retrieval),
		);

		record_merge(&mut tracer, &retrieval, &pool, elapsed_ms(started));

		let cross_lingual_active = query.is_translated() && pool.multi_hit_count() > 0;
		let pool_size = pool.len();
		let reranked = rerank::rerank(pool, query.rerank_text(), settings.rerank, self.backends.rerank.as_ref())
			.await;

		record_rerank(&mut tracer, &query, &reranked, pool_size);

		let started = Instant::now();
		let verdict = refusal::decide(&reranked.candidates, cross_lingual_active, &settings.policy);
		let mut metadata = Map::new();

		metadata.insert("profile".to_string(), verdict.profile.as_str().into());
		metadata.insert("accepted".to_string(), verdict.accepted.into());
		metadata.insert("cross_lingual_active".to_string(), cross_lingual_active.into());
		metadata.insert("leniency_applied".to_string(), verdict.leniency_applied.into());
		metadata.insert("indicators".to_string(), to_value(&verdict.indicators));
		metadata.insert("thresholds".to_string(), to_value(&verdict.thresholds));
		metadata.insert("failed".to_string(), to_value(&verdict.failed));
		tracer.record(
			StageRecord::new(
				Stage::Refusal,
				format!("{} candidates", reranked.candidates.len()),
				verdict.reason.clone(),
			)
			.latency_ms(elapsed_ms(started))
			.metadata(metadata),
		);

		let started = Instant::now();
		let bundle = assemble::assemble(
			&reranked.candidates,
			verdict,
			AssembleLimits::from_config(&self.cfg.assemble),
		);
		let mut metadata = Map::new();
		let sources: Vec<&str> = bundle.sources();

		metadata.insert("citations".to_string(), bundle.citations.len().into());
		metadata.insert("usable".to_string(), bundle.usable.into());
		metadata.insert("sources".to_string(), to_value(&sources));
		metadata.insert(
			"truncated".to_string(),
			bundle.citations.iter().filter(|citation| citation.truncated).count().into(),
		);
		tracer.record(
			StageRecord::new(
				Stage::Assemble,
				format!("{} candidates", reranked.candidates.len()),
				format!("{} citations, usable={}", bundle.citations.len(), bundle.usable),
			)
			.latency_ms(elapsed_ms(started))
			.metadata(metadata),
		);

		info!(
			run_id = %run_id,
			language = query.language.as_str(),
			mode_used = query.method.as_str(),
			citations = bundle.citations.len(),
			accepted = bundle.usable,
			"Query finished."
		);

		Ok(QueryOutcome { run_id, query, bundle, trace: tracer.into_events() })
	}

	async fn prepare_query(&self, question: &str, settings: &Settings, tracer: &mut Tracer) -> Query {
		let started = Instant::now();
		let (detected, cjk_ratio) = language::detect_with_ratio(question);
		let mut metadata = Map::new();

		metadata.insert("detected_language".to_string(), detected.as_str().into());
		metadata.insert("cjk_ratio".to_string(), Value::from(cjk_ratio));
		tracer.record(
			StageRecord::new(Stage::DetectLanguage, question, detected.as_str())
				.latency_ms(elapsed_ms(started))
				.metadata(metadata),
		);

		// Without cross-lingual retrieval the translated channel never runs, so skip translating.
		let mode = if settings.cross_lingual { settings.mode } else { TranslationMode::Off };
		let request = TranslationRequest {
			text: question,
			language: detected,
			target: settings.target,
			mode,
			timeout_ms: self.cfg.translation.timeout_ms,
		};
		let started = Instant::now();
		let outcome = translate::translate(&request, self.backends.translation.as_deref()).await;
		let mut metadata = outcome.metadata(&request);

		metadata.insert("cross_lingual".to_string(), settings.cross_lingual.into());
		tracer.record(
			StageRecord::new(
				Stage::Translate,
				question,
				outcome.translated.clone().unwrap_or_else(|| "(no translated variant)".to_string()),
			)
			.latency_ms(elapsed_ms(started))
			.metadata(metadata),
		);

		Query {
			text: question.to_string(),
			language: detected,
			translated: outcome.translated,
			method: outcome.method,
		}
	}

	fn resolve(&self, options: &QueryOptions) -> Result<Settings> {
		let top_k = options.top_k.unwrap_or(self.cfg.retrieval.top_k);
		let limit = options.limit.unwrap_or(self.cfg.rerank.limit);

		if top_k == 0 {
			return Err(Error::InvalidRequest { message: "top_k must be greater than zero.".to_string() });
		}
		if limit == 0 {
			return Err(Error::InvalidRequest { message: "limit must be greater than zero.".to_string() });
		}

		let mode = match options.translation_mode {
			Some(mode) => mode,
			None => self.cfg.translation.mode.parse().map_err(|message| Error::InvalidRequest { message })?,
		};
		let profile = match options.profile {
			Some(profile) => profile,
			None => self.cfg.refusal.profile.parse().map_err(|message| Error::InvalidRequest { message })?,
		};
		let target: LanguageTag = self
			.cfg
			.retrieval
			.target_language
			.parse()
			.map_err(|message| Error::InvalidRequest { message })?;

		Ok(Settings {
			cross_lingual: options.cross_lingual.unwrap_or(self.cfg.retrieval.cross_lingual),
			mode,
			target,
			limits: RetrievalLimits {
				top_k,
				vector_timeout_ms: self.cfg.retrieval.vector_timeout_ms,
				keyword_timeout_ms: self.cfg.retrieval.keyword_timeout_ms,
			},
			rerank: RerankSettings {
				window: self.cfg.rerank.window,
				limit,
				retrieval_weight: self.cfg.rerank.retrieval_weight,
				timeout_ms: self.cfg.rerank.timeout_ms,
			},
			policy: RefusalPolicy::from_config(&self.cfg.refusal, profile),
		})
	}
}

fn record_search(tracer: &mut Tracer, query: &Query, retrieval: &Retrieval, method: Method) {
	let stage = match method {
		Method::Vector => Stage::VectorSearch,
		Method::Keyword => Stage::KeywordSearch,
	};
	let results: Vec<_> = retrieval.for_method(method).collect();
	let latency_ms = results.iter().map(|result| result.latency_ms).max().unwrap_or(0);
	let errors: Vec<String> = results
		.iter()
		.filter_map(|result| {
			result.outcome.as_ref().err().map(|err| format!("{}: {err}", result.channel))
		})
		.collect();
	let total: usize = results.iter().map(|result| result.count()).sum();
	let mut metadata = retrieval.method_metadata(method);

	metadata.insert("detected_language".to_string(), query.language.as_str().into());
	metadata.insert("original_query".to_string(), query.text.clone().into());
	metadata.insert(
		"translated_query".to_string(),
		query.translated.clone().map(Value::String).unwrap_or(Value::Null),
	);
	metadata.insert("mode_used".to_string(), query.method.as_str().into());
	metadata.insert(
		"channels".to_string(),
		to_value(&results.iter().map(|result| result.channel).collect::<Vec<_>>()),
	);

	let input = match &query.translated {
		Some(translated) => format!("{} | {translated}", query.text),
		None => query.text.clone(),
	};

	tracer.record(
		StageRecord::new(stage, input, format!("{total} candidates"))
			.latency_ms(latency_ms)
			.error((!errors.is_empty()).then(|| errors.join("; ")))
			.metadata(metadata),
	);
}

fn record_merge(tracer: &mut Tracer, retrieval: &Retrieval, pool: &MergedPool, latency_ms: u64) {
	let mut counts = Map::new();

	for channel in [Channel::Original, Channel::Translated] {
		let mut per_method = Map::new();

		for method in [Method::Vector, Method::Keyword] {
			per_method.insert(method.as_str().to_string(), retrieval.count(channel, method).into());
		}

		counts.insert(channel.as_str().to_string(), Value::Object(per_method));
	}

	let input_total: usize = retrieval.candidate_lists().iter().map(|list| list.len()).sum();
	let top: Vec<&str> =
		pool.entries().iter().take(5).map(|entry| entry.candidate.chunk_id.as_str()).collect();
	let mut metadata = Map::new();

	metadata.insert("candidate_counts".to_string(), Value::Object(counts));
	metadata.insert("input_candidates".to_string(), input_total.into());
	metadata.insert("pool_size".to_string(), pool.len().into());
	metadata.insert("multi_channel_hits".to_string(), pool.multi_hit_count().into());
	metadata.insert("top_chunk_ids".to_string(), to_value(&top));
	tracer.record(
		StageRecord::new(
			Stage::Merge,
			format!("{input_total} candidates"),
			format!("{} unique, {} multi-channel", pool.len(), pool.multi_hit_count()),
		)
		.latency_ms(latency_ms)
		.metadata(metadata),
	);
}

fn record_rerank(tracer: &mut Tracer, query: &Query, outcome: &RerankOutcome, pool_size: usize) {
	let mut metadata = Map::new();
	let order: Vec<&str> = outcome
		.candidates
		.iter()
		.map(|candidate| candidate.merged.candidate.chunk_id.as_str())
		.collect();

	metadata.insert("query".to_string(), query.rerank_text().into());
	metadata.insert("window".to_string(), outcome.window.into());
	metadata.insert("returned".to_string(), outcome.candidates.len().into());
	metadata.insert("order".to_string(), to_value(&order));
	metadata.insert("backend_ok".to_string(), outcome.error.is_none().into());
	tracer.record(
		StageRecord::new(
			Stage::Rerank,
			format!("{pool_size} candidates"),
			format!("{} candidates", outcome.candidates.len()),
		)
		.latency_ms(outcome.latency_ms)
		.error(outcome.error.as_ref().map(ToString::to_string))
		.metadata(metadata),
	);
}

fn elapsed_ms(started: Instant) -> u64 {
	started.elapsed().as_millis() as u64
}

fn to_value<T>(value: &T) -> Value
where
	T: Serialize + ?Sized,
{
	serde_json::to_value(value).unwrap_or(Value::Null)
}
