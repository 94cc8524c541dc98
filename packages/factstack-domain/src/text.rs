use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

use crate::language::is_cjk_word_char;

/// Lowercased retrieval terms in first-seen order.
///
/// ASCII words shorter than two characters are dropped. Each CJK character is its own term so that
/// unsegmented Chinese text can still be compared lexically.
pub fn tokenize_terms(text: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for term in terms(text) {
		if seen.insert(term.clone()) {
			out.push(term);
		}
	}

	out
}

/// Like [`tokenize_terms`] but keeps repeated terms, for term-frequency statistics.
pub fn terms(text: &str) -> Vec<String> {
	let normalized: String = text.nfkc().collect();
	let mut out = Vec::new();
	let mut word = String::new();

	for ch in normalized.chars() {
		if ch.is_ascii_alphanumeric() {
			word.push(ch.to_ascii_lowercase());

			continue;
		}

		push_word(&mut word, &mut out);

		if is_cjk_word_char(ch) {
			out.push(ch.to_string());
		}
	}

	push_word(&mut word, &mut out);

	out
}

/// Fraction of `query_terms` that appear in `text`.
pub fn lexical_overlap_ratio(query_terms: &[String], text: &str) -> f32 {
	if query_terms.is_empty() {
		return 0.0;
	}

	let text_terms: HashSet<String> = terms(text).into_iter().collect();
	let matched = query_terms.iter().filter(|term| text_terms.contains(term.as_str())).count();

	matched as f32 / query_terms.len() as f32
}

/// Whether the whole (normalized, lowercased) phrase occurs in `text`.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
	let phrase = squash(phrase);

	if phrase.is_empty() {
		return false;
	}

	squash(text).contains(phrase.as_str())
}

fn squash(text: &str) -> String {
	terms(text).join(" ")
}

fn push_word(word: &mut String, out: &mut Vec<String>) {
	if word.len() >= 2 {
		out.push(std::mem::take(word));
	} else {
		word.clear();
	}
}
