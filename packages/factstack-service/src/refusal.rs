//! Multi-indicator accept/refuse decision over the reranked evidence.
//!
//! Four indicators are computed over the aggregated scores of the reranked list:
//!
//! - `top_score`: the highest aggregated score.
//! - `top_mean`: the mean of the `top_mean_window` highest scores (fewer if the list is shorter).
//! - `high_quality_count`: candidates whose score exceeds `quality_threshold`.
//! - `coverage_ratio`: share of candidates whose score exceeds `relevance_threshold`.
//!
//! Evidence is accepted only when every indicator meets its minimum. When the request is
//! cross-lingual and a multi-channel hit exists, score-based thresholds are scaled by the lenience
//! factor, which can only loosen the gate.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{merge::cmp_f32_desc, rerank::RankedCandidate};
use factstack_config::RefusalThresholds;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
	Base,
	Strict,
}
impl Profile {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Base => "base",
			Self::Strict => "strict",
		}
	}
}

impl FromStr for Profile {
	type Err = String;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"base" => Ok(Self::Base),
			"strict" => Ok(Self::Strict),
			other => Err(format!("Unknown refusal profile: {other}.")),
		}
	}
}

impl fmt::Display for Profile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
	TopScore,
	TopMean,
	HighQualityCount,
	CoverageRatio,
}
impl Indicator {
	pub const ALL: [Self; 4] =
		[Self::TopScore, Self::TopMean, Self::HighQualityCount, Self::CoverageRatio];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::TopScore => "top_score",
			Self::TopMean => "top_mean",
			Self::HighQualityCount => "high_quality_count",
			Self::CoverageRatio => "coverage_ratio",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
	pub top_score: f32,
	pub top_mean: f32,
	pub high_quality_count: u32,
	pub coverage_ratio: f32,
	/// Number of candidates the indicators were computed over.
	pub evaluated: u32,
}

/// Thresholds after leniency, as actually applied.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectiveThresholds {
	pub min_top_score: f32,
	pub min_top_mean: f32,
	pub quality_threshold: f32,
	pub min_high_quality: u32,
	pub relevance_threshold: f32,
	pub min_coverage: f32,
}
impl EffectiveThresholds {
	fn new(thresholds: &RefusalThresholds, factor: f32) -> Self {
		Self {
			min_top_score: thresholds.min_top_score * factor,
			min_top_mean: thresholds.min_top_mean * factor,
			quality_threshold: thresholds.quality_threshold * factor,
			min_high_quality: thresholds.min_high_quality,
			relevance_threshold: thresholds.relevance_threshold * factor,
			min_coverage: thresholds.min_coverage * factor,
		}
	}
}

#[derive(Clone, Copy, Debug)]
pub struct RefusalPolicy {
	pub profile: Profile,
	pub thresholds: RefusalThresholds,
	pub lenience_factor: f32,
	pub top_mean_window: u32,
}
impl RefusalPolicy {
	pub fn from_config(cfg: &factstack_config::Refusal, profile: Profile) -> Self {
		let thresholds = match profile {
			Profile::Base => cfg.base,
			Profile::Strict => cfg.strict,
		};

		Self {
			profile,
			thresholds,
			lenience_factor: cfg.lenience_factor,
			top_mean_window: cfg.top_mean_window,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefusalVerdict {
	pub accepted: bool,
	pub profile: Profile,
	pub indicators: Indicators,
	pub thresholds: EffectiveThresholds,
	/// Every indicator that missed its minimum. Empty when accepted.
	pub failed: Vec<Indicator>,
	pub leniency_applied: bool,
	pub reason: String,
}

pub fn decide(
	reranked: &[RankedCandidate],
	cross_lingual_active: bool,
	policy: &RefusalPolicy,
) -> RefusalVerdict {
	let scores: Vec<f32> = reranked.iter().map(RankedCandidate::score).collect();

	decide_scores(&scores, cross_lingual_active, policy)
}

/// Decision over aggregated scores. Their order does not matter.
pub fn decide_scores(
	scores: &[f32],
	cross_lingual_active: bool,
	policy: &RefusalPolicy,
) -> RefusalVerdict {
	let factor = if cross_lingual_active { policy.lenience_factor } else { 1.0 };
	let thresholds = EffectiveThresholds::new(&policy.thresholds, factor);
	let indicators = compute_indicators(scores, &thresholds, policy.top_mean_window);
	let failed = if scores.is_empty() {
		Indicator::ALL.to_vec()
	} else {
		failed_indicators(&indicators, &thresholds)
	};
	let accepted = failed.is_empty();
	let reason = describe(&indicators, &thresholds, &failed);

	RefusalVerdict {
		accepted,
		profile: policy.profile,
		indicators,
		thresholds,
		failed,
		leniency_applied: cross_lingual_active && policy.lenience_factor < 1.0,
		reason,
	}
}

pub fn compute_indicators(
	scores: &[f32],
	thresholds: &EffectiveThresholds,
	top_mean_window: u32,
) -> Indicators {
	let mut scores: Vec<f32> =
		scores.iter().map(|score| if score.is_finite() { *score } else { 0.0 }).collect();

	if scores.is_empty() {
		return Indicators {
			top_score: 0.0,
			top_mean: 0.0,
			high_quality_count: 0,
			coverage_ratio: 0.0,
			evaluated: 0,
		};
	}

	// Reranking reorders candidates; the indicators only look at aggregated scores.
	scores.sort_by(|a, b| cmp_f32_desc(*a, *b));

	let top_score = scores[0];
	let window = (top_mean_window.max(1) as usize).min(scores.len());
	let top_mean = scores[..window].iter().sum::<f32>() / window as f32;
	let high_quality_count =
		scores.iter().filter(|score| **score > thresholds.quality_threshold).count() as u32;
	let relevant = scores.iter().filter(|score| **score > thresholds.relevance_threshold).count();

	Indicators {
		top_score,
		top_mean,
		high_quality_count,
		coverage_ratio: relevant as f32 / scores.len() as f32,
		evaluated: scores.len() as u32,
	}
}

fn failed_indicators(indicators: &Indicators, thresholds: &EffectiveThresholds) -> Vec<Indicator> {
	let mut failed = Vec::new();

	if indicators.top_score < thresholds.min_top_score {
		failed.push(Indicator::TopScore);
	}
	if indicators.top_mean < thresholds.min_top_mean {
		failed.push(Indicator::TopMean);
	}
	if indicators.high_quality_count < thresholds.min_high_quality {
		failed.push(Indicator::HighQualityCount);
	}
	if indicators.coverage_ratio < thresholds.min_coverage {
		failed.push(Indicator::CoverageRatio);
	}

	failed
}

fn describe(indicators: &Indicators, thresholds: &EffectiveThresholds, failed: &[Indicator]) -> String {
	if failed.is_empty() {
		return format!(
			"Evidence accepted: top_score {:.3}, top_mean {:.3}, high_quality_count {}, coverage_ratio {:.3}.",
			indicators.top_score,
			indicators.top_mean,
			indicators.high_quality_count,
			indicators.coverage_ratio
		);
	}
	if indicators.evaluated == 0 {
		return "Insufficient evidence: no candidates were retrieved.".to_string();
	}

	let details: Vec<String> = failed
		.iter()
		.map(|indicator| match indicator {
			Indicator::TopScore => {
				format!("top_score {:.3} < {:.3}", indicators.top_score, thresholds.min_top_score)
			},
			Indicator::TopMean => {
				format!("top_mean {:.3} < {:.3}", indicators.top_mean, thresholds.min_top_mean)
			},
			Indicator::HighQualityCount => format!(
				"high_quality_count {} < {}",
				indicators.high_quality_count, thresholds.min_high_quality
			),
			Indicator::CoverageRatio => format!(
				"coverage_ratio {:.3} < {:.3}",
				indicators.coverage_ratio, thresholds.min_coverage
			),
		})
		.collect();

	format!("Insufficient evidence: {}.", details.join("; "))
}
