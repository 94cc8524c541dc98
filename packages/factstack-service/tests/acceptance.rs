mod acceptance {
	mod cross_lingual;
	mod degradation;
	mod refusal_gate;
	mod trace_records;

	use std::sync::Arc;

	use factstack_config::Config;
	use factstack_service::{Backends, Engine, QueryOutcome, Stage, TraceEvent};
	use factstack_testkit::{CountingIndex, MemorySemanticIndex};

	pub const ROLLBACK_ZH: &str = "如何回滚部署？";
	pub const ROLLBACK_EN: &str = "How do I rollback a deployment to the previous version?";
	pub const UNRELATED_EN: &str = "quantum chromodynamics lattice gauge theory";

	pub fn backends() -> Backends {
		factstack_testkit::memory_backends(&factstack_testkit::sample_corpus())
	}

	pub fn engine_with(cfg: Config, backends: Backends) -> Engine {
		Engine::new(cfg, backends)
	}

	pub fn engine() -> Engine {
		engine_with(factstack_testkit::test_config(), backends())
	}

	/// Backends whose semantic index counts the queries it receives.
	pub fn counting_backends() -> (Backends, Arc<CountingIndex>) {
		let mut backends = backends();
		let counting = Arc::new(CountingIndex::new(Arc::new(MemorySemanticIndex::new(
			factstack_testkit::sample_corpus(),
		))));

		backends.semantic = counting.clone();

		(backends, counting)
	}

	pub fn stage(outcome: &QueryOutcome, stage: Stage) -> &TraceEvent {
		outcome
			.trace
			.iter()
			.find(|event| event.stage == stage)
			.unwrap_or_else(|| panic!("Missing {stage} trace event."))
	}
}
