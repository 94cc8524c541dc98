use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
	refusal::RefusalVerdict,
	rerank::RankedCandidate,
	retrieval::{Channel, Method},
};

const ELLIPSIS: &str = "...";
const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Clone, Copy, Debug)]
pub struct AssembleLimits {
	pub max_snippet_chars: usize,
	pub max_context_chars: usize,
}
impl AssembleLimits {
	pub fn from_config(cfg: &factstack_config::Assemble) -> Self {
		Self {
			max_snippet_chars: cfg.max_snippet_chars as usize,
			max_context_chars: cfg.max_context_chars as usize,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
	/// 1-based, in reranked order.
	pub number: u32,
	pub chunk_id: String,
	pub source: String,
	pub snippet: String,
	pub truncated: bool,
	pub score: f32,
	pub rerank_score: Option<f32>,
	pub multiplicity: u32,
	pub method: Method,
	pub channel: Channel,
}
impl Citation {
	pub fn label(&self) -> String {
		format!("C{}", self.number)
	}

	fn render(&self) -> String {
		format!("[{}] Source: {}\n{}", self.label(), self.source, self.snippet)
	}
}

/// Citations plus the verdict, handed to the answer-generation stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
	pub citations: Vec<Citation>,
	pub verdict: RefusalVerdict,
	/// False when the gate refused. Generation must not run on a non-usable bundle.
	pub usable: bool,
}
impl EvidenceBundle {
	pub fn render_context(&self) -> String {
		self.citations.iter().map(Citation::render).collect::<Vec<_>>().join(BLOCK_SEPARATOR)
	}

	pub fn sources(&self) -> Vec<&str> {
		let mut out: Vec<&str> = Vec::new();

		for citation in &self.citations {
			if !out.contains(&citation.source.as_str()) {
				out.push(citation.source.as_str());
			}
		}

		out
	}
}

/// Builds the bundle. A refused verdict still yields citations, flagged as non-usable.
pub fn assemble(
	ranked: &[RankedCandidate],
	verdict: RefusalVerdict,
	limits: AssembleLimits,
) -> EvidenceBundle {
	let mut citations = Vec::with_capacity(ranked.len());
	let mut rendered_chars = 0_usize;

	for entry in ranked {
		let (snippet, truncated) =
			truncate_snippet(&entry.merged.candidate.text, limits.max_snippet_chars);
		let citation = Citation {
			number: citations.len() as u32 + 1,
			chunk_id: entry.merged.candidate.chunk_id.clone(),
			source: entry.merged.candidate.source.clone(),
			snippet,
			truncated,
			score: entry.merged.score,
			rerank_score: entry.rerank_score,
			multiplicity: entry.merged.multiplicity,
			method: entry.merged.candidate.method,
			channel: entry.merged.candidate.channel,
		};
		let mut cost = citation.render().chars().count();

		if !citations.is_empty() {
			cost += BLOCK_SEPARATOR.len();
		}
		if !citations.is_empty() && rendered_chars + cost > limits.max_context_chars {
			break;
		}

		rendered_chars += cost;

		citations.push(citation);
	}

	let usable = verdict.accepted;

	EvidenceBundle { citations, verdict, usable }
}

/// Cuts `text` to at most `max_chars` characters on a word boundary, appending `...` when cut.
pub fn truncate_snippet(text: &str, max_chars: usize) -> (String, bool) {
	let text = text.trim();

	if text.chars().count() <= max_chars {
		return (text.to_string(), false);
	}

	let budget = max_chars.saturating_sub(ELLIPSIS.len());
	let mut end = 0_usize;
	let mut used = 0_usize;

	for (offset, segment) in text.split_word_bound_indices() {
		let len = segment.chars().count();

		if used + len > budget {
			break;
		}

		used += len;
		end = offset + segment.len();
	}

	// A single word longer than the budget has no boundary to cut at.
	if end == 0 {
		end = text.char_indices().nth(budget).map(|(idx, _)| idx).unwrap_or(text.len());
	}

	let mut out = text[..end].trim_end().to_string();

	out.push_str(ELLIPSIS);

	(out, true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		merge::MergedCandidate,
		refusal::{self, Profile, RefusalPolicy},
		retrieval::Candidate,
	};
	use factstack_config::RefusalThresholds;

	fn ranked(id: &str, text: &str, score: f32) -> RankedCandidate {
		RankedCandidate {
			merged: MergedCandidate {
				candidate: Candidate {
					chunk_id: id.to_string(),
					source: format!("{id}.md"),
					text: text.to_string(),
					score,
					method: Method::Keyword,
					channel: Channel::Translated,
					rank: 1,
				},
				score,
				multiplicity: 2,
				hits: vec![(Method::Keyword, Channel::Translated), (Method::Vector, Channel::Translated)],
			},
			rerank_score: Some(score),
		}
	}

	fn verdict(scores: &[f32]) -> RefusalVerdict {
		let policy = RefusalPolicy {
			profile: Profile::Base,
			thresholds: RefusalThresholds::base(),
			lenience_factor: 0.8,
			top_mean_window: 5,
		};

		refusal::decide_scores(scores, false, &policy)
	}

	fn limits() -> AssembleLimits {
		AssembleLimits { max_snippet_chars: 40, max_context_chars: 1_000 }
	}

	#[test]
	fn snippets_cut_on_word_boundaries() {
		let (snippet, truncated) =
			truncate_snippet("Roll back the deployment with the rollback script today.", 30);

		assert!(truncated);
		assert_eq!(snippet, "Roll back the deployment...");
		assert!(snippet.chars().count() <= 30);
	}

	#[test]
	fn short_text_is_kept_whole() {
		assert_eq!(truncate_snippet("  short text ", 40), ("short text".to_string(), false));
	}

	#[test]
	fn long_single_word_is_hard_cut() {
		let (snippet, truncated) = truncate_snippet("abcdefghijklmnopqrstuvwxyz", 10);

		assert!(truncated);
		assert_eq!(snippet, "abcdefg...");
	}

	#[test]
	fn cjk_text_cuts_between_characters() {
		let (snippet, _) = truncate_snippet("回滚部署需要先暂停流量再切换版本", 8);

		assert_eq!(snippet, "回滚部署需...");
	}

	#[test]
	fn citations_are_numbered_in_order() {
		let items = vec![ranked("a", "first chunk", 0.8), ranked("b", "second chunk", 0.6)];
		let bundle = assemble(&items, verdict(&[0.8, 0.6]), limits());

		assert!(bundle.usable);
		assert_eq!(bundle.citations[0].number, 1);
		assert_eq!(bundle.citations[1].label(), "C2");
		assert_eq!(bundle.citations[1].source, "b.md");
		assert_eq!(bundle.citations[0].multiplicity, 2);
		assert_eq!(
			bundle.render_context(),
			"[C1] Source: a.md\nfirst chunk\n\n---\n\n[C2] Source: b.md\nsecond chunk"
		);
	}

	#[test]
	fn refused_bundle_keeps_citations_but_is_not_usable() {
		let items = vec![ranked("a", "weak chunk", 0.05)];
		let bundle = assemble(&items, verdict(&[0.05]), limits());

		assert!(!bundle.usable);
		assert_eq!(bundle.citations.len(), 1);
		assert!(!bundle.verdict.failed.is_empty());
	}

	#[test]
	fn context_budget_keeps_first_citation() {
		let items = vec![ranked("a", "first chunk", 0.8), ranked("b", "second chunk", 0.6)];
		let limits = AssembleLimits { max_snippet_chars: 40, max_context_chars: 10 };
		let bundle = assemble(&items, verdict(&[0.8, 0.6]), limits);

		assert_eq!(bundle.citations.len(), 1);
		assert_eq!(bundle.sources(), vec!["a.md"]);
	}
}
