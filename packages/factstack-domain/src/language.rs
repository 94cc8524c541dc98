use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_script::{Script, UnicodeScript};

/// Share of non-whitespace characters that must be CJK for a query to be tagged `zh`.
pub const CJK_RATIO_THRESHOLD: f32 = 0.30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageTag {
	En,
	Zh,
	Mixed,
	Other,
}
impl LanguageTag {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::En => "en",
			Self::Zh => "zh",
			Self::Mixed => "mixed",
			Self::Other => "other",
		}
	}
}

impl fmt::Display for LanguageTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LanguageTag {
	type Err = String;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"en" => Ok(Self::En),
			"zh" => Ok(Self::Zh),
			"mixed" => Ok(Self::Mixed),
			"other" => Ok(Self::Other),
			other => Err(format!("Unknown language tag: {other}.")),
		}
	}
}

/// Classifies the script composition of `text`. Never fails; unknown scripts map to `Other`.
pub fn detect(text: &str) -> LanguageTag {
	detect_with_ratio(text).0
}

/// Like [`detect`], also returning the CJK ratio of the NFKC-normalized text the tag was derived from.
pub fn detect_with_ratio(text: &str) -> (LanguageTag, f32) {
	let normalized: String = text.nfkc().collect();
	let ratio = cjk_ratio(normalized.as_str());

	if ratio >= CJK_RATIO_THRESHOLD {
		return (LanguageTag::Zh, ratio);
	}
	if ratio > 0.0 {
		return (LanguageTag::Mixed, ratio);
	}
	if !contains_latin_letters(normalized.as_str()) {
		return (LanguageTag::Other, ratio);
	}
	if should_apply_lid(normalized.as_str()) && is_confidently_non_english(normalized.as_str()) {
		return (LanguageTag::Other, ratio);
	}

	(LanguageTag::En, ratio)
}

/// Whether a query tagged `tag` must be translated to reach a corpus written in `target`.
pub fn needs_translation(tag: LanguageTag, target: LanguageTag) -> bool {
	match target {
		LanguageTag::En => matches!(tag, LanguageTag::Zh | LanguageTag::Mixed),
		LanguageTag::Zh => matches!(tag, LanguageTag::En | LanguageTag::Mixed),
		LanguageTag::Mixed | LanguageTag::Other => false,
	}
}

pub fn cjk_ratio(text: &str) -> f32 {
	let mut total = 0_usize;
	let mut cjk = 0_usize;

	for ch in text.chars() {
		if ch.is_whitespace() {
			continue;
		}

		total += 1;

		if is_cjk(ch) {
			cjk += 1;
		}
	}

	if total == 0 {
		return 0.0;
	}

	cjk as f32 / total as f32
}

pub fn contains_cjk(text: &str) -> bool {
	text.chars().any(is_cjk)
}

pub fn is_cjk(ch: char) -> bool {
	matches!(
		ch as u32,
		0x3000..=0x303F // symbols and punctuation
			| 0x3040..=0x309F // hiragana
			| 0x30A0..=0x30FF // katakana
			| 0x3400..=0x4DBF
			| 0x4E00..=0x9FFF
			| 0xAC00..=0xD7AF // hangul syllables
			| 0xF900..=0xFAFF
			| 0x20000..=0x2A6DF
			| 0x2A700..=0x2CEAF
			| 0x2F800..=0x2FA1F
	)
}

/// CJK characters that carry meaning, as opposed to CJK punctuation.
pub fn is_cjk_word_char(ch: char) -> bool {
	is_cjk(ch) && ch.is_alphabetic()
}

fn contains_latin_letters(text: &str) -> bool {
	text.chars().any(|ch| ch.is_alphabetic() && ch.script() == Script::Latin)
}

fn should_apply_lid(input: &str) -> bool {
	let mut letters = 0_usize;
	let mut non_space = 0_usize;
	let mut whitespace = 0_usize;

	for ch in input.chars() {
		if ch.is_whitespace() {
			whitespace += 1;

			continue;
		}

		non_space += 1;

		if ch.is_alphabetic() {
			letters += 1;
		}
	}

	// Short strings and single tokens are too noisy for language identification.
	if letters < 32 || non_space < 64 || whitespace == 0 {
		return false;
	}

	letters as f32 / non_space as f32 >= 0.60
}

fn is_confidently_non_english(input: &str) -> bool {
	let Some(info) = whatlang::detect(input) else {
		return false;
	};

	if !info.is_reliable() || info.confidence() < 0.85 {
		return false;
	}

	info.lang() != whatlang::Lang::Eng
}
