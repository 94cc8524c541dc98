use std::{
	cmp::Ordering,
	collections::{BTreeMap, BTreeSet},
};

use serde::{Deserialize, Serialize};

use crate::retrieval::{Candidate, Channel, Method};

/// Maps raw, method-specific scores onto a shared `[0, 1]` scale before merging.
#[derive(Clone, Copy, Debug)]
pub struct ScoreScale {
	pub vector_weight: f32,
	pub keyword_weight: f32,
	pub translated_weight: f32,
	pub keyword_half_saturation: f32,
}
impl ScoreScale {
	pub fn from_config(cfg: &factstack_config::Retrieval) -> Self {
		Self {
			vector_weight: cfg.vector_weight,
			keyword_weight: cfg.keyword_weight,
			translated_weight: cfg.translated_weight,
			keyword_half_saturation: cfg.keyword_half_saturation,
		}
	}

	pub fn scale(&self, candidate: &Candidate) -> f32 {
		if !candidate.score.is_finite() {
			return 0.0;
		}

		let (base, weight) = match candidate.method {
			Method::Vector => (candidate.score.clamp(0.0, 1.0), self.vector_weight),
			Method::Keyword => {
				let raw = candidate.score.max(0.0);

				(raw / (raw + self.keyword_half_saturation), self.keyword_weight)
			},
		};
		let channel_weight = match candidate.channel {
			Channel::Original => 1.0,
			Channel::Translated => self.translated_weight,
		};
		let scaled = base * weight * channel_weight;

		if scaled.is_finite() { scaled.clamp(0.0, 1.0) } else { 0.0 }
	}
}

impl Default for ScoreScale {
	fn default() -> Self {
		Self::from_config(&factstack_config::Retrieval::default())
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergedCandidate {
	/// The contributing candidate with the best scaled score.
	pub candidate: Candidate,
	/// Maximum scaled score over every contribution.
	pub score: f32,
	/// Number of distinct (method, channel) combinations that surfaced this chunk.
	pub multiplicity: u32,
	pub hits: Vec<(Method, Channel)>,
}

/// Deduplicated candidates ordered by score, then multiplicity, then chunk id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedPool {
	entries: Vec<MergedCandidate>,
}
impl MergedPool {
	pub fn entries(&self) -> &[MergedCandidate] {
		&self.entries
	}

	pub fn into_entries(self) -> Vec<MergedCandidate> {
		self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Entries surfaced by more than one channel/method combination.
	pub fn multi_hit_count(&self) -> usize {
		self.entries.iter().filter(|entry| entry.multiplicity >= 2).count()
	}
}

struct Group<'a> {
	best: &'a Candidate,
	best_score: f32,
	hits: BTreeSet<(Method, Channel)>,
}

pub fn merge<'a, I>(lists: I, scale: &ScoreScale) -> MergedPool
where
	I: IntoIterator<Item = &'a [Candidate]>,
{
	let mut groups: BTreeMap<&str, Group<'_>> = BTreeMap::new();

	for list in lists {
		for candidate in list {
			let score = scale.scale(candidate);

			match groups.get_mut(candidate.chunk_id.as_str()) {
				Some(group) => {
					group.hits.insert((candidate.method, candidate.channel));

					if prefer(candidate, score, group.best, group.best_score) {
						group.best = candidate;
						group.best_score = score;
					}
				},
				None => {
					groups.insert(candidate.chunk_id.as_str(), Group {
						best: candidate,
						best_score: score,
						hits: BTreeSet::from([(candidate.method, candidate.channel)]),
					});
				},
			}
		}
	}

	let mut entries: Vec<MergedCandidate> = groups
		.into_values()
		.map(|group| MergedCandidate {
			candidate: group.best.clone(),
			score: group.best_score,
			multiplicity: group.hits.len() as u32,
			hits: group.hits.into_iter().collect(),
		})
		.collect();

	entries.sort_by(|a, b| {
		cmp_f32_desc(a.score, b.score)
			.then_with(|| b.multiplicity.cmp(&a.multiplicity))
			.then_with(|| a.candidate.chunk_id.cmp(&b.candidate.chunk_id))
	});

	MergedPool { entries }
}

// Order-independent choice of the representative member of a group.
fn prefer(candidate: &Candidate, score: f32, best: &Candidate, best_score: f32) -> bool {
	cmp_f32_desc(score, best_score)
		.then_with(|| (candidate.method, candidate.channel).cmp(&(best.method, best.channel)))
		.then_with(|| candidate.rank.cmp(&best.rank))
		.then_with(|| candidate.source.cmp(&best.source))
		.then_with(|| candidate.text.cmp(&best.text))
		== Ordering::Less
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
