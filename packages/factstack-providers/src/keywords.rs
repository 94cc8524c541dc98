//! Chat-completion client that turns a question into retrieval keywords in another language.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

const MAX_ATTEMPTS: usize = 2;

pub async fn generate_keywords(
	cfg: &factstack_config::LlmProviderConfig,
	text: &str,
	target_language: &str,
) -> Result<Vec<String>> {
	crate::require_api_key(&cfg.provider_id, &cfg.api_key)?;

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": build_messages(text, target_language),
	});
	let mut last_err = None;

	for attempt in 0..MAX_ATTEMPTS {
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		match parse_keywords_response(&json) {
			Ok(keywords) => return Ok(keywords),
			Err(err) => {
				warn!(attempt, error = %err, "Keyword response could not be parsed.");

				last_err = Some(err);
			},
		}
	}

	Err(last_err.unwrap_or_else(|| Error::InvalidResponse {
		message: "Keyword generation produced no response.".to_string(),
	}))
}

fn build_messages(text: &str, target_language: &str) -> Vec<Value> {
	let language = match target_language {
		"zh" => "Simplified Chinese",
		_ => "English",
	};
	let system = format!(
		"You rewrite search questions into retrieval keywords for a technical document index. \
		Respond with JSON of the form {{\"keywords\": [\"...\"]}}. Every keyword must be in \
		{language}. Do not answer the question and do not write sentences."
	);

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": text }),
	]
}

fn parse_keywords_response(json: &Value) -> Result<Vec<String>> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Keyword response is missing message content.".to_string(),
		})?;
	let parsed: Value = serde_json::from_str(strip_code_fence(content))?;
	let items = parsed.get("keywords").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Keyword content is missing keywords array.".to_string() }
	})?;
	let keywords = items
		.iter()
		.filter_map(|item| item.as_str())
		.map(str::trim)
		.filter(|keyword| !keyword.is_empty())
		.map(ToString::to_string)
		.collect();

	Ok(keywords)
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
	let rest = rest.strip_prefix("json").unwrap_or(rest);

	rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_keywords_from_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"keywords\": [\"rollback\", \" deployment \", \"\"]}" } }
			]
		});
		let keywords = parse_keywords_response(&json).expect("parse failed");

		assert_eq!(keywords, vec!["rollback", "deployment"]);
	}

	#[test]
	fn accepts_fenced_json() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "```json\n{\"keywords\": [\"restart\"]}\n```" } }
			]
		});
		let keywords = parse_keywords_response(&json).expect("parse failed");

		assert_eq!(keywords, vec!["restart"]);
	}

	#[test]
	fn rejects_prose() {
		let json = serde_json::json!({
			"choices": [{ "message": { "content": "To roll back, run the script." } }]
		});

		assert!(parse_keywords_response(&json).is_err());
	}

	#[test]
	fn prompt_names_target_language() {
		let messages = build_messages("如何回滚部署？", "en");
		let system = messages[0]["content"].as_str().expect("system prompt");

		assert!(system.contains("English"));
		assert_eq!(messages[1]["content"], "如何回滚部署？");
	}
}
