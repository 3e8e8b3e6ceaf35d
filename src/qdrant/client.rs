//! HTTP client wrapper implementing the vector index contract on top of Qdrant.

use crate::qdrant::{
    filters::build_filter,
    payload::{VECTOR_ID_FIELD, build_payload, point_id_for, split_payload},
    types::QueryResponse,
};
use crate::vector::{
    FIELD_CUSTOMER_ID, FIELD_DOC_TYPE, FIELD_DOCUMENT_ID, FIELD_UPLOADED_AT, IndexError,
    VectorIndex, VectorMatch, VectorQuery, VectorRecord,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantIndex {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("clarify-ingest/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Ensure the collection backing `namespace` exists with the expected vector size and
    /// payload indexes for the filterable metadata fields.
    pub async fn ensure_namespace(
        &self,
        namespace: &str,
        vector_size: usize,
    ) -> Result<(), IndexError> {
        if !self.collection_exists(namespace).await? {
            tracing::debug!(namespace, vector_size, "Creating collection");
            self.create_collection(namespace, vector_size).await?;
        }
        self.ensure_payload_indexes(namespace).await?;
        tracing::debug!(namespace, "Namespace ready");
        Ok(())
    }

    async fn create_collection(&self, namespace: &str, vector_size: usize) -> Result<(), IndexError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{namespace}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(namespace, "Collection created");
        })
        .await
    }

    async fn ensure_payload_indexes(&self, namespace: &str) -> Result<(), IndexError> {
        let fields: [(&str, &str); 5] = [
            (FIELD_CUSTOMER_ID, "keyword"),
            (FIELD_DOCUMENT_ID, "keyword"),
            (FIELD_DOC_TYPE, "keyword"),
            (FIELD_UPLOADED_AT, "datetime"),
            (VECTOR_ID_FIELD, "keyword"),
        ];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{namespace}/index"))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(namespace, field, schema, "Payload index ensured");
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(namespace, field, schema, "Payload index already exists");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::warn!(namespace, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    async fn collection_exists(&self, namespace: &str) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{namespace}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(namespace, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, namespace: &str, record: VectorRecord) -> Result<(), IndexError> {
        if record.values.is_empty() {
            return Err(IndexError::InvalidRecord(format!(
                "vector '{}' has no values",
                record.id
            )));
        }

        let point = json!({
            "id": point_id_for(&record.id),
            "vector": record.values,
            "payload": build_payload(&record.id, &record.metadata),
        });

        let response = self
            .request(Method::PUT, &format!("collections/{namespace}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": [point] }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(namespace, vector_id = %record.id, "Point upserted");
        })
        .await
    }

    async fn query(
        &self,
        namespace: &str,
        query: VectorQuery,
    ) -> Result<Vec<VectorMatch>, IndexError> {
        let with_payload = if query.include_metadata {
            Value::Bool(true)
        } else {
            json!([VECTOR_ID_FIELD])
        };

        let mut body = json!({
            "query": query.vector,
            "limit": query.top_k,
            "with_payload": with_payload,
        });
        if let Some(filter) = build_filter(&query.filter)
            && let Some(object) = body.as_object_mut()
        {
            object.insert("filter".into(), filter);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{namespace}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(namespace, error = %error, "Qdrant query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let matches = payload
            .result
            .into_points()
            .into_iter()
            .map(|point| {
                let (id, metadata) = split_payload(stringify_point_id(point.id), point.payload);
                VectorMatch {
                    id,
                    score: point.score,
                    metadata: if query.include_metadata { metadata } else { None },
                }
            })
            .collect();

        Ok(matches)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use crate::vector::{FragmentMetadata, MetadataFilter};
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn index_for(server: &MockServer) -> QdrantIndex {
        QdrantIndex {
            client: Client::builder()
                .user_agent("clarify-ingest-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: Some("secret".into()),
        }
    }

    fn metadata() -> FragmentMetadata {
        FragmentMetadata {
            customer_id: "acme".into(),
            document_id: "doc-1".into(),
            chunk_index: 2,
            doc_type: DocumentType::Requirements,
            uploaded_at: "2025-01-01T00:00:00Z".into(),
            text: "Must integrate with SAP.".into(),
        }
    }

    #[tokio::test]
    async fn upsert_sends_deterministic_point_with_payload() {
        let server = MockServer::start_async().await;
        let point_id = point_id_for("doc-1_2");

        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/clarify/points")
                    .query_param("wait", "true")
                    .header("api-key", "secret")
                    .body_contains(point_id.as_str())
                    .body_contains("\"vector_id\":\"doc-1_2\"")
                    .body_contains("\"customer_id\":\"acme\"");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": { "operation_id": 1, "status": "completed" }
                }));
            })
            .await;

        index_for(&server)
            .upsert(
                "clarify",
                VectorRecord {
                    id: "doc-1_2".into(),
                    values: vec![0.1, 0.2],
                    metadata: metadata(),
                },
            )
            .await
            .expect("upsert");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upsert_surfaces_unexpected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/clarify/points");
                then.status(503).body("overloaded");
            })
            .await;

        let error = index_for(&server)
            .upsert(
                "clarify",
                VectorRecord {
                    id: "doc-1_0".into(),
                    values: vec![0.1],
                    metadata: metadata(),
                },
            )
            .await
            .unwrap_err();

        match error {
            IndexError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_emits_customer_filter_and_maps_vector_ids() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/clarify/points/query")
                    .json_body_partial(
                        r#"{
                            "limit": 3,
                            "with_payload": true,
                            "filter": {
                                "must": [
                                    { "key": "customer_id", "match": { "value": "acme" } }
                                ]
                            }
                        }"#,
                    );
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": point_id_for("doc-1_2"),
                                "score": 0.91,
                                "payload": {
                                    "vector_id": "doc-1_2",
                                    "customer_id": "acme",
                                    "document_id": "doc-1",
                                    "chunk_index": 2,
                                    "doc_type": "requirements",
                                    "uploaded_at": "2025-01-01T00:00:00Z",
                                    "text": "Must integrate with SAP."
                                }
                            }
                        ]
                    }
                }));
            })
            .await;

        let matches = index_for(&server)
            .query(
                "clarify",
                VectorQuery {
                    vector: vec![0.1, 0.2],
                    top_k: 3,
                    filter: MetadataFilter::for_customer("acme"),
                    include_metadata: true,
                },
            )
            .await
            .expect("query");

        mock.assert_async().await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "doc-1_2");
        assert!((matches[0].score - 0.91).abs() < f32::EPSILON);
        let parsed = FragmentMetadata::from_payload(matches[0].metadata.clone().unwrap())
            .expect("valid metadata");
        assert_eq!(parsed, metadata());
    }

    #[tokio::test]
    async fn query_accepts_bare_point_list() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/clarify/points/query");
                then.status(200).json_body(json!({ "result": [] }));
            })
            .await;

        let matches = index_for(&server)
            .query(
                "clarify",
                VectorQuery {
                    vector: vec![0.1],
                    top_k: 12,
                    filter: MetadataFilter::for_customer("nobody"),
                    include_metadata: true,
                },
            )
            .await
            .expect("query");
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn ensure_namespace_creates_missing_collection() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/clarify");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/clarify")
                    .json_body_partial(r#"{ "vectors": { "size": 8, "distance": "Cosine" } }"#);
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let indexes = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/clarify/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        index_for(&server)
            .ensure_namespace("clarify", 8)
            .await
            .expect("namespace ensured");

        exists.assert_async().await;
        create.assert_async().await;
        indexes.assert_hits_async(5).await;
    }

    fn record() -> VectorRecord {
        VectorRecord {
            id: "doc-1_0".into(),
            values: vec![0.1],
            metadata: metadata(),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let index = QdrantIndex::new(&format!("http://127.0.0.1:{port}"), None).unwrap();

        let error = index.upsert("clarify", record()).await.unwrap_err();
        assert!(matches!(error, IndexError::Unavailable(_)), "{error:?}");
    }

    #[tokio::test]
    async fn timed_out_request_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/clarify/points");
                then.status(200).delay(std::time::Duration::from_millis(500));
            })
            .await;
        let index = QdrantIndex {
            client: Client::builder()
                .timeout(std::time::Duration::from_millis(50))
                .build()
                .unwrap(),
            base_url: server.base_url(),
            api_key: None,
        };

        let error = index.upsert("clarify", record()).await.unwrap_err();
        assert!(matches!(error, IndexError::Unavailable(_)), "{error:?}");
    }

    #[test]
    fn normalize_base_url_strips_trailing_slash() {
        let normalized = normalize_base_url("http://localhost:6333/").unwrap();
        assert_eq!(format_endpoint(&normalized, "/collections"), "http://localhost:6333/collections");
        assert!(QdrantIndex::new("not a url", None).is_err());
    }
}
