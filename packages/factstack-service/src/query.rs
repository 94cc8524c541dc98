use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use factstack_domain::language::LanguageTag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
	Llm,
	Rule,
	Off,
}
impl TranslationMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Llm => "llm",
			Self::Rule => "rule",
			Self::Off => "off",
		}
	}
}

impl FromStr for TranslationMode {
	type Err = String;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"llm" => Ok(Self::Llm),
			"rule" => Ok(Self::Rule),
			"off" => Ok(Self::Off),
			other => Err(format!("Unknown translation mode: {other}.")),
		}
	}
}

impl fmt::Display for TranslationMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// How the translated variant of a query was actually produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationMethod {
	#[serde(rename = "llm")]
	Llm,
	#[serde(rename = "rule")]
	Rule,
	#[serde(rename = "off")]
	Off,
	#[serde(rename = "none-needed")]
	NoneNeeded,
}
impl TranslationMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Llm => "llm",
			Self::Rule => "rule",
			Self::Off => "off",
			Self::NoneNeeded => "none-needed",
		}
	}
}

impl fmt::Display for TranslationMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A question after language detection and translation. Built once per request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
	pub text: String,
	pub language: LanguageTag,
	/// Present only when translation produced text different from `text`.
	pub translated: Option<String>,
	pub method: TranslationMethod,
}
impl Query {
	pub fn is_translated(&self) -> bool {
		self.translated.is_some()
	}

	/// Text handed to the reranker: the corpus-language variant when one exists.
	pub fn rerank_text(&self) -> &str {
		self.translated.as_deref().unwrap_or(&self.text)
	}
}
