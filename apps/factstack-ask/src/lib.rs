use std::path::PathBuf;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use factstack_service::{Engine, Profile, QueryOptions, QueryOutcome, TraceSink, TranslationMode};

#[derive(Debug, Parser)]
#[command(
	version = factstack_cli::VERSION,
	rename_all = "kebab",
	styles = factstack_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, short = 'q', value_name = "TEXT")]
	pub question: String,
	/// Search the original query only.
	#[arg(long)]
	pub no_cross_lingual: bool,
	/// One of llm, rule, or off.
	#[arg(long, value_name = "MODE")]
	pub translation_mode: Option<TranslationMode>,
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	#[arg(long, value_name = "N")]
	pub limit: Option<u32>,
	/// One of base or strict.
	#[arg(long, value_name = "PROFILE")]
	pub profile: Option<Profile>,
	/// Print the whole outcome, trace included, as JSON.
	#[arg(long)]
	pub json: bool,
	/// Append trace events to this JSON Lines file instead of the log.
	#[arg(long, value_name = "FILE")]
	pub trace_out: Option<PathBuf>,
}
impl Args {
	pub fn options(&self) -> QueryOptions {
		QueryOptions {
			cross_lingual: self.no_cross_lingual.then_some(false),
			translation_mode: self.translation_mode,
			top_k: self.top_k,
			limit: self.limit,
			profile: self.profile,
		}
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = factstack_config::load(&args.config)?;

	if let Some(path) = &args.trace_out {
		config.trace.path = Some(path.display().to_string());
	}

	init_tracing(&config);

	let engine = Engine::from_config(config)?;
	let outcome = engine.run_query(&args.question, args.options()).await?;

	if !TraceSink::flush(engine.backends.trace.as_ref()) {
		warn!("Some trace events may not have been written.");
	}

	if args.json {
		println!("{}", serde_json::to_string_pretty(&outcome)?);
	} else {
		print!("{}", render(&outcome));
	}

	Ok(())
}

/// Human-readable summary: query handling, verdict, then one block per citation.
pub fn render(outcome: &QueryOutcome) -> String {
	let query = &outcome.query;
	let verdict = &outcome.bundle.verdict;
	let translated =
		query.translated.as_deref().map(|text| format!(" -> {text}")).unwrap_or_default();
	let mut out = format!(
		"Question: {}\nLanguage: {} | translation: {}{translated}\nVerdict: {} ({}): {}\n",
		query.text,
		query.language,
		query.method,
		if verdict.accepted { "accepted" } else { "refused" },
		verdict.profile,
		verdict.reason
	);

	if !outcome.bundle.usable {
		out.push_str("No usable evidence. Do not answer from these citations.\n");
	}

	for citation in &outcome.bundle.citations {
		out.push_str(&format!(
			"\n[{}] {} (score {:.3}, hits {})\n    {}\n",
			citation.label(),
			citation.source,
			citation.score,
			citation.multiplicity,
			citation.snippet
		));
	}

	out
}

fn init_tracing(config: &factstack_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
