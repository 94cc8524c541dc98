use std::{
	fmt,
	fs::{File, OpenOptions},
	io::{self, Write},
	path::{Path, PathBuf},
	sync::{
		Arc,
		mpsc::{self, Receiver, Sender},
	},
	thread,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

const SUMMARY_MAX_CHARS: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	DetectLanguage,
	Translate,
	VectorSearch,
	KeywordSearch,
	Merge,
	Rerank,
	Refusal,
	Assemble,
}
impl Stage {
	pub const ORDER: [Self; 8] = [
		Self::DetectLanguage,
		Self::Translate,
		Self::VectorSearch,
		Self::KeywordSearch,
		Self::Merge,
		Self::Rerank,
		Self::Refusal,
		Self::Assemble,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::DetectLanguage => "detect_language",
			Self::Translate => "translate",
			Self::VectorSearch => "vector_search",
			Self::KeywordSearch => "keyword_search",
			Self::Merge => "merge",
			Self::Rerank => "rerank",
			Self::Refusal => "refusal",
			Self::Assemble => "assemble",
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One record per pipeline stage per request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
	#[serde(with = "time::serde::rfc3339")]
	pub ts: OffsetDateTime,
	pub run_id: Uuid,
	pub stage: Stage,
	pub input_summary: String,
	pub output_summary: String,
	pub latency_ms: u64,
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub metadata: Map<String, Value>,
}
impl TraceEvent {
	pub fn to_json_line(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}

/// Receives trace events. Implementations must not block the pipeline or fail it.
pub trait TraceSink
where
	Self: Send + Sync,
{
	fn emit(&self, event: &TraceEvent);

	/// Waits for buffered events to reach their destination. Returns false if some may be lost.
	fn flush(&self) -> bool {
		true
	}
}

/// Appends one JSON line per event.
///
/// `emit` only serializes and queues the line. A dedicated writer thread owns the file handle, so
/// the pipeline never waits on disk I/O.
pub struct JsonlTraceSink {
	path: PathBuf,
	sender: Sender<WriterMessage>,
}
impl JsonlTraceSink {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let (sender, receiver) = mpsc::channel();
		let writer_path = path.clone();
		let spawned = thread::Builder::new()
			.name("factstack-trace-writer".to_string())
			.spawn(move || run_writer(&writer_path, receiver));

		if let Err(err) = spawned {
			warn!(error = %err, path = %path.display(), "Failed to start trace writer.");
		}

		Self { path, sender }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl TraceSink for JsonlTraceSink {
	fn emit(&self, event: &TraceEvent) {
		let line = match event.to_json_line() {
			Ok(line) => line,
			Err(err) => {
				warn!(
					error = %err,
					run_id = %event.run_id,
					stage = event.stage.as_str(),
					"Failed to serialize trace event."
				);

				return;
			},
		};
		let message = WriterMessage::Line { line, run_id: event.run_id, stage: event.stage };

		if self.sender.send(message).is_err() {
			warn!(
				path = %self.path.display(),
				run_id = %event.run_id,
				stage = event.stage.as_str(),
				"Trace writer is not running. Dropping trace event."
			);
		}
	}

	fn flush(&self) -> bool {
		let (ack, done) = mpsc::channel();

		self.sender.send(WriterMessage::Flush(ack)).is_ok() && done.recv().is_ok()
	}
}

enum WriterMessage {
	Line { line: String, run_id: Uuid, stage: Stage },
	Flush(Sender<()>),
}

/// Runs until every sender is dropped. The file is opened on first use and reopened after a
/// failed write.
fn run_writer(path: &Path, receiver: Receiver<WriterMessage>) {
	let mut file: Option<File> = None;

	for message in receiver {
		match message {
			WriterMessage::Line { line, run_id, stage } => {
				if let Err(err) = append_line(&mut file, path, &line) {
					file = None;

					warn!(
						error = %err,
						path = %path.display(),
						run_id = %run_id,
						stage = stage.as_str(),
						"Failed to write trace event."
					);
				}
			},
			WriterMessage::Flush(ack) => {
				if let Some(Err(err)) = file.as_mut().map(File::flush) {
					warn!(error = %err, path = %path.display(), "Failed to flush trace file.");
				}

				// The caller may have stopped waiting.
				ack.send(()).ok();
			},
		}
	}
}

fn append_line(file: &mut Option<File>, path: &Path, line: &str) -> io::Result<()> {
	if file.is_none() {
		*file = Some(OpenOptions::new().create(true).append(true).open(path)?);
	}
	if let Some(handle) = file.as_mut() {
		handle.write_all(format!("{line}\n").as_bytes())?;
	}

	Ok(())
}

/// Emits every event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTraceSink;
impl TraceSink for LogTraceSink {
	fn emit(&self, event: &TraceEvent) {
		info!(
			run_id = %event.run_id,
			stage = event.stage.as_str(),
			latency_ms = event.latency_ms,
			ok = event.ok,
			error = event.error.as_deref().unwrap_or(""),
			output = %event.output_summary,
			"Pipeline stage finished."
		);
	}
}

/// Per-request recorder: stamps events with the run id, forwards them to the sink, and keeps them.
pub(crate) struct Tracer {
	run_id: Uuid,
	sink: Arc<dyn TraceSink>,
	events: Vec<TraceEvent>,
}
impl Tracer {
	pub(crate) fn new(run_id: Uuid, sink: Arc<dyn TraceSink>) -> Self {
		Self { run_id, sink, events: Vec::with_capacity(Stage::ORDER.len()) }
	}

	pub(crate) fn record(&mut self, record: StageRecord) {
		let event = TraceEvent {
			ts: OffsetDateTime::now_utc(),
			run_id: self.run_id,
			stage: record.stage,
			input_summary: summarize(&record.input),
			output_summary: summarize(&record.output),
			latency_ms: record.latency_ms,
			ok: record.error.is_none(),
			error: record.error,
			metadata: record.metadata,
		};

		self.sink.emit(&event);
		self.events.push(event);
	}

	pub(crate) fn into_events(self) -> Vec<TraceEvent> {
		self.events
	}
}

pub(crate) struct StageRecord {
	pub(crate) stage: Stage,
	pub(crate) input: String,
	pub(crate) output: String,
	pub(crate) latency_ms: u64,
	pub(crate) error: Option<String>,
	pub(crate) metadata: Map<String, Value>,
}
impl StageRecord {
	pub(crate) fn new(stage: Stage, input: impl Into<String>, output: impl Into<String>) -> Self {
		Self {
			stage,
			input: input.into(),
			output: output.into(),
			latency_ms: 0,
			error: None,
			metadata: Map::new(),
		}
	}

	pub(crate) fn latency_ms(mut self, latency_ms: u64) -> Self {
		self.latency_ms = latency_ms;

		self
	}

	pub(crate) fn error(mut self, error: Option<String>) -> Self {
		self.error = error;

		self
	}

	pub(crate) fn metadata(mut self, metadata: Map<String, Value>) -> Self {
		self.metadata = metadata;

		self
	}
}

fn summarize(text: &str) -> String {
	let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");

	if flat.chars().count() <= SUMMARY_MAX_CHARS {
		return flat;
	}

	let mut out: String = flat.chars().take(SUMMARY_MAX_CHARS).collect();

	out.push_str("...");

	out
}
