//! Translation of metadata filters into Qdrant filter clauses.

use serde_json::{Value, json};

use crate::vector::MetadataFilter;

/// Compose a Qdrant `must` filter from equality constraints. Returns `None` when unconstrained.
///
/// Values are matched verbatim; a blank constraint matches nothing rather than everything.
pub fn build_filter(filter: &MetadataFilter) -> Option<Value> {
    let must: Vec<Value> = filter
        .conditions()
        .into_iter()
        .map(|(key, value)| {
            json!({
                "key": key,
                "match": { "value": value }
            })
        })
        .collect();

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;

    #[test]
    fn build_filter_handles_customer_id() {
        let filter = build_filter(&MetadataFilter::for_customer("acme")).expect("filter");

        assert_eq!(
            filter,
            json!({
                "must": [
                    {
                        "key": "customer_id",
                        "match": { "value": "acme" }
                    }
                ]
            })
        );
    }

    #[test]
    fn build_filter_combines_conditions() {
        let filter = build_filter(&MetadataFilter {
            customer_id: Some("acme".into()),
            document_id: Some("doc-1".into()),
            doc_type: Some(DocumentType::MeetingMinutes),
        })
        .expect("filter");

        assert_eq!(
            filter,
            json!({
                "must": [
                    { "key": "customer_id", "match": { "value": "acme" } },
                    { "key": "document_id", "match": { "value": "doc-1" } },
                    { "key": "doc_type", "match": { "value": "meeting_minutes" } }
                ]
            })
        );
    }

    #[test]
    fn build_filter_returns_none_when_empty() {
        assert!(build_filter(&MetadataFilter::default()).is_none());
        let blank = build_filter(&MetadataFilter::for_customer("")).expect("filter");
        assert_eq!(blank["must"][0]["match"]["value"], "");
    }
}
