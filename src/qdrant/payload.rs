//! Helpers for building Qdrant point ids and payloads.

use crate::vector::FragmentMetadata;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload key carrying the caller-supplied vector id.
pub const VECTOR_ID_FIELD: &str = "vector_id";

/// Deterministic Qdrant point id for a caller-supplied vector id.
///
/// The same vector id always maps to the same UUID, which keeps upserts idempotent.
pub fn point_id_for(vector_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, vector_id.as_bytes()).to_string()
}

/// Build the payload stored with a point: fragment metadata plus the original vector id.
pub(crate) fn build_payload(vector_id: &str, metadata: &FragmentMetadata) -> Value {
    let mut payload = metadata.to_payload();
    payload.insert(
        VECTOR_ID_FIELD.into(),
        Value::String(vector_id.to_string()),
    );
    Value::Object(payload)
}

/// Split a returned payload into the caller-visible vector id and the fragment metadata.
pub(crate) fn split_payload(
    point_id: String,
    payload: Option<Map<String, Value>>,
) -> (String, Option<Map<String, Value>>) {
    match payload {
        Some(mut map) => {
            let id = match map.remove(VECTOR_ID_FIELD) {
                Some(Value::String(id)) if !id.is_empty() => id,
                _ => point_id,
            };
            let metadata = (!map.is_empty()).then_some(map);
            (id, metadata)
        }
        None => (point_id, None),
    }
}
