use std::{env, fs, sync::Arc};

use uuid::Uuid;

use factstack_service::{QueryOptions, Stage, TraceEvent, TraceSink, trace::JsonlTraceSink};

use super::{ROLLBACK_ZH, backends, engine, engine_with, stage};

#[tokio::test]
async fn every_stage_is_recorded_once_in_order() {
	let outcome = engine().run_query(ROLLBACK_ZH, QueryOptions::default()).await.expect("Query failed.");
	let stages: Vec<Stage> = outcome.trace.iter().map(|event| event.stage).collect();

	assert_eq!(stages, Stage::ORDER.to_vec());
	assert!(outcome.trace.iter().all(|event| event.run_id == outcome.run_id));
	assert!(outcome.trace.iter().all(|event| event.ok));

	let translate = stage(&outcome, Stage::Translate);

	assert_eq!(translate.metadata["detected_language"], "zh");
	assert_eq!(translate.metadata["mode_used"], "rule");
	assert_eq!(translate.metadata["translated_query"], "how to rollback deploy deployment");

	let merge = stage(&outcome, Stage::Merge);

	assert!(merge.metadata["multi_channel_hits"].as_u64().is_some_and(|hits| hits >= 1));
	assert_eq!(merge.metadata["candidate_counts"]["original"]["keyword"], 0);

	let refusal = stage(&outcome, Stage::Refusal);

	assert_eq!(refusal.metadata["accepted"], true);
	assert_eq!(refusal.metadata["cross_lingual_active"], true);
}

#[tokio::test]
async fn detection_metadata_reflects_normalized_text() {
	// U+FB03 normalizes to "ffi", so the ratio is 1/4 and the tag is mixed.
	let outcome =
		engine().run_query("部\u{FB03}", QueryOptions::default()).await.expect("Query failed.");
	let detect = stage(&outcome, Stage::DetectLanguage);

	assert_eq!(detect.metadata["detected_language"], "mixed");
	assert_eq!(detect.metadata["cjk_ratio"], 0.25);
}

#[tokio::test]
async fn jsonl_sink_receives_one_line_per_stage() {
	let path = env::temp_dir().join(format!("factstack_acceptance_{}.jsonl", Uuid::new_v4()));
	let sink = Arc::new(JsonlTraceSink::new(&path));
	let mut backends = backends();

	backends.trace = sink.clone();

	let outcome = engine_with(factstack_testkit::test_config(), backends)
		.run_query(ROLLBACK_ZH, QueryOptions::default())
		.await
		.expect("Query failed.");

	assert!(sink.flush());

	let raw = fs::read_to_string(&path).expect("Failed to read trace file.");

	fs::remove_file(&path).expect("Failed to remove trace file.");

	let events: Vec<TraceEvent> = raw
		.lines()
		.map(|line| serde_json::from_str(line).expect("Invalid trace line."))
		.collect();

	assert_eq!(events, outcome.trace);
}
