//! Firestore REST client for the remote document store.
//!
//! Talks to `projects/{project}/databases/(default)/documents` over the v1 REST
//! surface: paginated collection listing, per-document `GET`/`PATCH`/`DELETE`
//! and `:commit` for batch writes.

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use recordsync_core::config::SyncConfig;
use recordsync_core::errors::{Error as CoreError, Result as CoreResult};
use recordsync_core::sync::{
    ensure_record_id, CollectionRegistry, Fetched, PushPayload, PushPlan, Record,
    RemoteState, RemoteStore, SINGLETON_DOCUMENT_ID,
};

use crate::error::{FirestoreError, Result};
use crate::payload::{
    collection_payload, document_to_wire_fields, record_to_wire_fields, StoredDocument,
};
use crate::value::{decode_fields, encode_fields, field_path};

const MAX_LOG_BODY_CHARS: usize = 512;
/// Firestore rejects commits with more writes than this.
pub const MAX_WRITES_PER_COMMIT: usize = 500;
const LIST_PAGE_SIZE: usize = 300;

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: String,
}

fn truncate_body(body: &str) -> String {
    let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}

fn document_id(name: &str) -> String {
    let raw = name.rsplit('/').next().unwrap_or_default();
    urlencoding::decode(raw)
        .map(|id| id.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Client for the Firestore REST API.
#[derive(Debug, Clone)]
pub struct FirestoreClient {
    client: reqwest::Client,
    base_url: String,
    project: String,
    token: Option<String>,
}

impl FirestoreClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. "https://firestore.googleapis.com/v1"
    /// * `project` - Google Cloud project id
    /// * `token` - optional bearer token (emulators accept none)
    /// * `timeout` - per-request timeout
    pub fn new(
        base_url: &str,
        project: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if project.trim().is_empty() {
            return Err(FirestoreError::invalid_request("Firestore project is required"));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.trim().to_string(),
            token,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let project = config
            .firestore_project
            .as_deref()
            .ok_or_else(|| FirestoreError::invalid_request("Firestore project is not configured"))?;
        Self::new(
            &config.firestore_api_url,
            project,
            config.firestore_token.clone(),
            Duration::from_secs(config.remote_timeout_secs),
        )
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project)
    }

    /// Fully qualified document name used inside commit writes.
    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.database_path(), collection, id)
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.database_path(), collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(collection),
            urlencoding::encode(id)
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| FirestoreError::invalid_request("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        Ok(headers)
    }

    /// Read the body, turning non-success statuses into `Api` errors.
    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            debug!("[Firestore] Response status: {}", status);
            return Ok(body);
        }

        debug!(
            "[Firestore] Response error ({}): {}",
            status,
            truncate_body(&body)
        );
        let message = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
            Ok(envelope) => match envelope.error.status {
                Some(code) => format!("{}: {}", code, envelope.error.message),
                None => envelope.error.message,
            },
            Err(_) => format!("Request failed: {}", truncate_body(&body)),
        };
        Err(FirestoreError::api(status.as_u16(), message))
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let body = Self::read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(
                "[Firestore] Failed to deserialize response. Body: {}, Error: {}",
                truncate_body(&body),
                e
            );
            FirestoreError::from(e)
        })
    }

    fn stored_document(document: FirestoreDocument) -> Result<StoredDocument> {
        Ok(StoredDocument {
            id: document_id(&document.name),
            fields: decode_fields(&document.fields)?,
        })
    }

    /// List every document of a collection, following page tokens.
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.collection_url(collection))
                .headers(self.headers()?)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListDocumentsResponse = Self::parse_response(request.send().await?).await?;
            for document in page.documents {
                documents.push(Self::stored_document(document)?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(
            "[Firestore] Listed {} documents from '{}'",
            documents.len(),
            collection
        );
        Ok(documents)
    }

    pub async fn get_document(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let response = self
            .client
            .get(self.document_url(collection, id))
            .headers(self.headers()?)
            .send()
            .await?;

        match Self::parse_response::<FirestoreDocument>(response).await {
            Ok(document) => Ok(Some(Self::stored_document(document)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Merge-write the given wire fields; fields not listed stay untouched.
    pub async fn patch_document(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<()> {
        let mask: Vec<(&str, String)> = fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", field_path(key)))
            .collect();
        let response = self
            .client
            .patch(self.document_url(collection, id))
            .headers(self.headers()?)
            .query(&mask)
            .json(&json!({ "fields": encode_fields(fields) }))
            .send()
            .await?;
        Self::read_body(response).await?;
        Ok(())
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.document_url(collection, id))
            .headers(self.headers()?)
            .send()
            .await?;
        match Self::read_body(response).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Apply writes atomically, in commits of at most [`MAX_WRITES_PER_COMMIT`].
    pub async fn commit(&self, writes: Vec<Value>) -> Result<()> {
        let url = format!("{}/{}:commit", self.base_url, self.database_path());
        for chunk in writes.chunks(MAX_WRITES_PER_COMMIT) {
            let response = self
                .client
                .post(&url)
                .headers(self.headers()?)
                .json(&json!({ "writes": chunk }))
                .send()
                .await?;
            Self::read_body(response).await?;
        }
        Ok(())
    }

    fn update_write(&self, collection: &str, id: &str, fields: &Map<String, Value>) -> Value {
        json!({
            "update": {
                "name": self.document_name(collection, id),
                "fields": encode_fields(fields),
            }
        })
    }

    fn delete_write(&self, collection: &str, id: &str) -> Value {
        json!({ "delete": self.document_name(collection, id) })
    }

    /// Translate a push plan into commit writes. Upserts replace whole documents.
    pub fn plan_writes(&self, plan: &PushPlan) -> Vec<Value> {
        let mut writes = Vec::new();
        for push in &plan.collections {
            let collection = push.remote_name.as_str();
            match &push.payload {
                PushPayload::Records { upserts, removals } => {
                    for record in upserts {
                        if record.id.trim().is_empty() {
                            continue;
                        }
                        writes.push(self.update_write(
                            collection,
                            &record.id,
                            &record_to_wire_fields(record),
                        ));
                    }
                    for id in removals {
                        writes.push(self.delete_write(collection, id));
                    }
                }
                PushPayload::Document(Some(document)) => writes.push(self.update_write(
                    collection,
                    SINGLETON_DOCUMENT_ID,
                    &document_to_wire_fields(document),
                )),
                PushPayload::Document(None) => {}
            }
        }
        writes
    }
}

#[async_trait]
impl RemoteStore for FirestoreClient {
    async fn get_all(&self, collection: &str) -> CoreResult<Fetched<Vec<Record>>> {
        let documents = self.list_documents(collection).await?;
        let records: Vec<Record> = documents
            .iter()
            .filter_map(|doc| Record::from_json(doc.to_plain(), Some(&doc.id)))
            .collect();
        Ok(if records.is_empty() {
            Fetched::Empty
        } else {
            Fetched::Data(records)
        })
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> CoreResult<Fetched<Record>> {
        let record = self
            .get_document(collection, id)
            .await?
            .and_then(|doc| Record::from_json(doc.to_plain(), Some(&doc.id)));
        Ok(match record {
            Some(record) => Fetched::Data(record),
            None => Fetched::Empty,
        })
    }

    async fn save(&self, collection: &str, record: &Record) -> CoreResult<()> {
        ensure_record_id(record)?;
        self.patch_document(collection, &record.id, &record_to_wire_fields(record))
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> CoreResult<()> {
        if id.trim().is_empty() {
            return Err(CoreError::invalid_request("document id is required"));
        }
        self.delete_document(collection, id).await?;
        Ok(())
    }

    async fn load_all_collections(&self, registry: &CollectionRegistry) -> CoreResult<RemoteState> {
        let fetches = registry.iter().map(|descriptor| async move {
            let payload = self
                .list_documents(&descriptor.remote_name)
                .await
                .map(|documents| collection_payload(descriptor.shape, &documents))
                .map_err(CoreError::from);
            (descriptor.remote_name.clone(), payload)
        });
        let results = join_all(fetches).await;

        if !results.is_empty() && results.iter().all(|(_, payload)| payload.is_err()) {
            warn!("[Firestore] Every collection failed to load");
            if let Some((_, Err(err))) = results.into_iter().next() {
                return Err(err);
            }
            return Err(CoreError::Transport("remote load failed".to_string()));
        }

        let mut state = RemoteState::default();
        for (remote_name, payload) in results {
            if let Err(err) = &payload {
                warn!("[Firestore] Failed to load '{}': {}", remote_name, err);
            }
            state.insert(remote_name, payload);
        }
        Ok(state)
    }

    async fn save_all_collections(&self, plan: &PushPlan) -> CoreResult<()> {
        let writes = self.plan_writes(plan);
        if writes.is_empty() {
            return Ok(());
        }
        debug!(
            "[Firestore] Committing {} writes ({} upserts, {} deletes)",
            writes.len(),
            plan.upsert_count(),
            plan.removal_count()
        );
        self.commit(writes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsync_core::sync::{default_registry, CollectionDescriptor};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        target: String,
        authorization: Option<String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    fn ok(body: Value) -> MockResponse {
        MockResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    fn api_error(status: u16, code: &str, message: &str) -> MockResponse {
        MockResponse {
            status,
            body: json!({"error": {"code": status, "status": code, "message": message}})
                .to_string(),
        }
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            method,
            target,
            authorization: headers.get("authorization").cloned(),
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    /// Serves scripted responses in order; the route table answers by path
    /// prefix when present so concurrent list calls stay deterministic.
    async fn start_mock_server(
        scripted: Vec<MockResponse>,
        routes: Vec<(&'static str, MockResponse)>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(scripted)));
        let routes = Arc::new(routes);
        let captured_clone = Arc::clone(&captured);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted);
                let routes_inner = Arc::clone(&routes);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    let path = request.target.split('?').next().unwrap_or_default().to_string();
                    captured_inner.lock().await.push(request);

                    let routed = routes_inner
                        .iter()
                        .find(|(suffix, _)| path.ends_with(suffix))
                        .map(|(_, response)| response.clone());
                    let response = match routed {
                        Some(response) => response,
                        None => scripted_inner
                            .lock()
                            .await
                            .pop_front()
                            .unwrap_or_else(|| api_error(500, "INTERNAL", "unexpected request")),
                    };
                    let _ = write_http_response(&mut stream, response.status, &response.body).await;
                });
            }
        });

        (format!("http://{}/v1", addr), captured, handle)
    }

    fn client(base_url: &str) -> FirestoreClient {
        FirestoreClient::new(
            base_url,
            "demo",
            Some("token-1".to_string()),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    fn typed_doc(collection: &str, id: &str, fields: Value) -> Value {
        json!({
            "name": format!("projects/demo/databases/(default)/documents/{}/{}", collection, id),
            "fields": fields,
        })
    }

    #[tokio::test]
    async fn get_all_follows_pagination_and_decodes_dates() {
        let (base_url, captured, server) = start_mock_server(
            vec![
                ok(json!({
                    "documents": [typed_doc("tasks", "t1", json!({
                        "title": {"stringValue": "Write report"},
                        "createdAt": {"timestampValue": "2026-01-01T00:00:00Z"}
                    }))],
                    "nextPageToken": "page-2"
                })),
                ok(json!({
                    "documents": [typed_doc("tasks", "t2", json!({
                        "title": {"stringValue": "Review"},
                        "isArchived": {"booleanValue": true}
                    }))]
                })),
            ],
            Vec::new(),
        )
        .await;

        let records = client(&base_url)
            .get_all("tasks")
            .await
            .expect("get all")
            .into_option()
            .expect("records");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "t1");
        assert_eq!(
            records[0].created_at.as_deref(),
            Some("2026-01-01T00:00:00.000Z")
        );
        assert!(records[1].is_archived());

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 2);
        assert!(requests[0]
            .target
            .starts_with("/v1/projects/demo/databases/(default)/documents/tasks?"));
        assert!(requests[1].target.contains("pageToken=page-2"));
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer token-1"));
        server.abort();
    }

    #[tokio::test]
    async fn get_by_id_maps_not_found_to_empty() {
        let (base_url, _captured, server) = start_mock_server(
            vec![api_error(404, "NOT_FOUND", "Document not found")],
            Vec::new(),
        )
        .await;

        let fetched = client(&base_url)
            .get_by_id("deals", "missing")
            .await
            .expect("get by id");
        assert!(fetched.is_empty());
        server.abort();
    }

    #[tokio::test]
    async fn save_patches_with_field_mask() {
        let (base_url, captured, server) =
            start_mock_server(vec![ok(json!({"name": "x"}))], Vec::new()).await;

        let record = Record::new("c1")
            .with_field("name", "Acme")
            .with_field("signedDate", "2026-01-01");
        client(&base_url)
            .save("clients", &record)
            .await
            .expect("save");

        let requests = captured.lock().await;
        let request = &requests[0];
        assert_eq!(request.method, "PATCH");
        assert!(request.target.contains("/documents/clients/c1?"));
        assert!(request.target.contains("updateMask.fieldPaths=name"));
        assert!(request.target.contains("updateMask.fieldPaths=signedDate"));

        let body: Value = serde_json::from_str(&request.body).expect("body");
        assert_eq!(body["fields"]["name"], json!({"stringValue": "Acme"}));
        assert_eq!(
            body["fields"]["signedDate"],
            json!({"timestampValue": "2026-01-01T00:00:00Z"})
        );
        server.abort();
    }

    #[tokio::test]
    async fn save_rejects_blank_id_without_calling_remote() {
        let (base_url, captured, server) = start_mock_server(Vec::new(), Vec::new()).await;

        let err = client(&base_url)
            .save("tasks", &Record::new(""))
            .await
            .expect_err("blank id");
        assert!(matches!(err, CoreError::InvalidRequest(_)));
        assert!(captured.lock().await.is_empty());
        server.abort();
    }

    #[tokio::test]
    async fn save_all_commits_upserts_singletons_and_deletes() {
        let (base_url, captured, server) =
            start_mock_server(vec![ok(json!({"writeResults": []}))], Vec::new()).await;

        let mut plan = PushPlan::default();
        plan.push(
            "tasks",
            PushPayload::Records {
                upserts: vec![Record::new("t1").with_field("title", "A"), Record::new("")],
                removals: vec!["t9".to_string()],
            },
        );
        plan.push("financePlan", PushPayload::Document(Some(json!({"month": "2026-01"}))));
        client(&base_url)
            .save_all_collections(&plan)
            .await
            .expect("commit");

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].target.ends_with("/documents:commit"));

        let body: Value = serde_json::from_str(&requests[0].body).expect("body");
        let writes = body["writes"].as_array().expect("writes");
        assert_eq!(writes.len(), 3);
        assert_eq!(
            writes[0]["update"]["name"],
            json!("projects/demo/databases/(default)/documents/tasks/t1")
        );
        assert_eq!(
            writes[1]["delete"],
            json!("projects/demo/databases/(default)/documents/tasks/t9")
        );
        assert_eq!(
            writes[2]["update"]["name"],
            json!("projects/demo/databases/(default)/documents/financePlan/default")
        );
        server.abort();
    }

    #[tokio::test]
    async fn commit_is_chunked() {
        let (base_url, captured, server) = start_mock_server(
            vec![ok(json!({})), ok(json!({}))],
            Vec::new(),
        )
        .await;

        let upserts = (0..MAX_WRITES_PER_COMMIT + 1)
            .map(|i| Record::new(format!("r{}", i)))
            .collect();
        let mut plan = PushPlan::default();
        plan.push(
            "activity",
            PushPayload::Records {
                upserts,
                removals: Vec::new(),
            },
        );
        client(&base_url)
            .save_all_collections(&plan)
            .await
            .expect("commit");

        assert_eq!(captured.lock().await.len(), 2);
        server.abort();
    }

    #[tokio::test]
    async fn load_all_reports_per_collection_failures() {
        let registry = CollectionRegistry::new(vec![
            CollectionDescriptor::list("tasks", "cfo_tasks"),
            CollectionDescriptor::list("deals", "cfo_deals"),
            CollectionDescriptor::singleton("financePlan", "cfo_finance_plan"),
        ]);
        let (base_url, _captured, server) = start_mock_server(
            Vec::new(),
            vec![
                (
                    "/documents/tasks",
                    ok(json!({"documents": [typed_doc("tasks", "t1", json!({}))]})),
                ),
                ("/documents/deals", api_error(503, "UNAVAILABLE", "try later")),
                (
                    "/documents/financePlan",
                    ok(json!({"documents": [typed_doc("financePlan", "default", json!({
                        "month": {"stringValue": "2026-01"}
                    }))]})),
                ),
            ],
        )
        .await;

        let mut state = client(&base_url)
            .load_all_collections(&registry)
            .await
            .expect("partial state");

        assert_eq!(
            state.take("tasks").expect("tasks"),
            Some(json!([{"id": "t1"}]))
        );
        assert!(matches!(
            state.take("deals"),
            Err(CoreError::Api { status: 503, .. })
        ));
        assert_eq!(
            state.take("financePlan").expect("plan"),
            Some(json!({"month": "2026-01"}))
        );
        server.abort();
    }

    #[tokio::test]
    async fn load_all_fails_when_every_collection_fails() {
        let (base_url, _captured, server) = start_mock_server(
            Vec::new(),
            vec![("", api_error(403, "PERMISSION_DENIED", "denied"))],
        )
        .await;

        let err = client(&base_url)
            .load_all_collections(&default_registry())
            .await
            .expect_err("whole batch fails");
        assert_eq!(err.status_code(), Some(403));
        server.abort();
    }

    #[test]
    fn document_ids_are_url_decoded() {
        assert_eq!(
            document_id("projects/p/databases/(default)/documents/users/a%20b"),
            "a b"
        );
        assert!(FirestoreClient::new("http://x", " ", None, Duration::from_secs(1)).is_err());
    }
}
