use std::collections::HashMap;

use qdrant_client::qdrant::{
	Document, PointId, Query, QueryPointsBuilder, ScoredPoint, Value, point_id::PointIdOptions,
	value::Kind,
};
use tracing::debug;

use crate::{Error, Result};

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

const CHUNK_ID_KEY: &str = "chunk_id";
const SOURCE_KEYS: [&str; 2] = ["source_path", "source"];
const TEXT_KEYS: [&str; 2] = ["text", "chunk_text"];

/// One chunk returned by the collection, with the score Qdrant assigned to it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredHit {
	pub chunk_id: String,
	pub score: f32,
	pub source: String,
	pub text: String,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &factstack_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn search_dense(&self, vector: Vec<f32>, k: u32) -> Result<Vec<StoredHit>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidPayload(format!(
				"Query vector has {} dimensions, collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.with_payload(true)
			.limit(k as u64);
		let response = self.client.query(search).await?;

		Ok(hits_from_points(&response.result))
	}

	pub async fn search_bm25(&self, text: &str, k: u32) -> Result<Vec<StoredHit>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(Document::new(text.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.with_payload(true)
			.limit(k as u64);
		let response = self.client.query(search).await?;

		Ok(hits_from_points(&response.result))
	}
}

/// Converts scored points into hits, skipping points without a usable id or text.
pub fn hits_from_points(points: &[ScoredPoint]) -> Vec<StoredHit> {
	let mut out = Vec::with_capacity(points.len());

	for point in points {
		let chunk_id = payload_string(&point.payload, CHUNK_ID_KEY)
			.or_else(|| point.id.as_ref().and_then(point_id_to_string));
		let Some(chunk_id) = chunk_id else {
			debug!("Skipping point without chunk id.");

			continue;
		};
		let Some(text) = TEXT_KEYS.iter().find_map(|key| payload_string(&point.payload, key)) else {
			debug!(chunk_id = %chunk_id, "Skipping point without text payload.");

			continue;
		};
		let source = SOURCE_KEYS
			.iter()
			.find_map(|key| payload_string(&point.payload, key))
			.unwrap_or_default();

		out.push(StoredHit { chunk_id, score: point.score, source, text });
	}

	out
}

pub fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(id)) => Some(id.to_string()),
		None => None,
	}
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn string_value(text: &str) -> Value {
		Value { kind: Some(Kind::StringValue(text.to_string())) }
	}

	fn point(id: Option<PointIdOptions>, score: f32, payload: &[(&str, &str)]) -> ScoredPoint {
		ScoredPoint {
			id: id.map(|options| PointId { point_id_options: Some(options) }),
			payload: payload
				.iter()
				.map(|(key, value)| (key.to_string(), string_value(value)))
				.collect(),
			score,
			..Default::default()
		}
	}

	#[test]
	fn payload_chunk_id_wins_over_point_id() {
		let points = vec![point(
			Some(PointIdOptions::Num(7)),
			0.8,
			&[("chunk_id", "runbook#0"), ("source_path", "deployment_runbook.md"), ("text", "x")],
		)];
		let hits = hits_from_points(&points);

		assert_eq!(hits, vec![StoredHit {
			chunk_id: "runbook#0".to_string(),
			score: 0.8,
			source: "deployment_runbook.md".to_string(),
			text: "x".to_string(),
		}]);
	}

	#[test]
	fn falls_back_to_point_id_and_alternate_keys() {
		let points = vec![point(
			Some(PointIdOptions::Uuid("8d3f".to_string())),
			1.5,
			&[("source", "a.md"), ("chunk_text", "body")],
		)];
		let hits = hits_from_points(&points);

		assert_eq!(hits[0].chunk_id, "8d3f");
		assert_eq!(hits[0].source, "a.md");
		assert_eq!(hits[0].text, "body");
	}

	#[test]
	fn skips_points_without_id_or_text() {
		let points = vec![
			point(None, 0.5, &[("text", "orphan")]),
			point(Some(PointIdOptions::Num(1)), 0.5, &[("source_path", "a.md")]),
		];

		assert!(hits_from_points(&points).is_empty());
	}
}
