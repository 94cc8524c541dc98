pub mod embedding;
pub mod keywords;
pub mod rerank;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Fails with `Unavailable` when a provider has no credential configured.
pub fn require_api_key(provider_id: &str, api_key: &str) -> Result<()> {
	if api_key.trim().is_empty() {
		return Err(Error::Unavailable {
			message: format!("Provider {provider_id} has no api_key configured."),
		});
	}

	Ok(())
}
