use std::time::Duration;

use anyhow::Context as _;
use reqwest::StatusCode;
use serde_json::json;

use super::auth::TokenSource;
use super::value::Fields;
use crate::config::FirestoreSettings;

const PRODUCTION_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: &str = "300";

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    /// Last path segment of the resource name (the document id).
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Lost a race with a concurrent transaction; the caller may retry.
    Aborted,
}

/// Minimal Firestore REST client: documents, listing and read-write transactions.
pub struct FirestoreClient {
    http: reqwest::Client,
    base_url: String,
    database: String,
    auth: TokenSource,
}

impl FirestoreClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        project_id: &str,
        auth: TokenSource,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            database: format!("projects/{project_id}/databases/(default)"),
            auth,
        }
    }

    pub fn from_settings(settings: &FirestoreSettings) -> anyhow::Result<Self> {
        let project_id = settings
            .resolve_project_id()?
            .ok_or_else(|| anyhow::anyhow!("firestore project id is not configured (set FIRESTORE_PROJECT_ID or FIREBASE_SERVICE_ACCOUNT_BASE64)"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build http client")?;

        let (base_url, auth) = match (&settings.emulator_host, &settings.access_token) {
            (Some(host), _) => {
                tracing::info!(host = %host, project = %project_id, "using firestore emulator");
                (format!("http://{host}/v1"), TokenSource::None)
            }
            (None, Some(token)) => (
                PRODUCTION_BASE_URL.to_owned(),
                TokenSource::Static(token.clone()),
            ),
            (None, None) => (
                PRODUCTION_BASE_URL.to_owned(),
                TokenSource::metadata(http.clone()),
            ),
        };

        Ok(Self::new(http, base_url, &project_id, auth))
    }

    fn documents_root(&self) -> String {
        format!("{}/documents", self.database)
    }

    /// Full resource name of the document at `path` (e.g. `books/demo`).
    pub fn document_name(&self, path: &str) -> String {
        format!("{}/{}", self.documents_root(), path.trim_matches('/'))
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{resource}", self.base_url)
    }

    async fn request(&self, method: reqwest::Method, url: String) -> anyhow::Result<reqwest::RequestBuilder> {
        let builder = self.http.request(method, url);
        Ok(match self.auth.token().await.context("get firestore access token")? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    pub async fn get_document(&self, path: &str) -> anyhow::Result<Option<Document>> {
        self.fetch_document(path, None).await
    }

    pub async fn get_document_in(&self, path: &str, transaction: &str) -> anyhow::Result<Option<Document>> {
        self.fetch_document(path, Some(transaction)).await
    }

    async fn fetch_document(&self, path: &str, transaction: Option<&str>) -> anyhow::Result<Option<Document>> {
        let url = self.url(&self.document_name(path));
        let mut request = self.request(reqwest::Method::GET, url).await?;
        if let Some(transaction) = transaction {
            request = request.query(&[("transaction", transaction)]);
        }
        let resp = request
            .send()
            .await
            .with_context(|| format!("GET firestore document {path}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc = read_success(resp, path).await?;
        Ok(Some(doc))
    }

    /// All documents of a collection (`books`, `books/demo/chapters`), following pagination.
    pub async fn list_documents(&self, collection: &str) -> anyhow::Result<Vec<Document>> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ListResponse {
            #[serde(default)]
            documents: Vec<Document>,
            #[serde(default)]
            next_page_token: Option<String>,
        }

        let url = self.url(&self.document_name(collection));
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_owned())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let resp = self
                .request(reqwest::Method::GET, url.clone())
                .await?
                .query(&query)
                .send()
                .await
                .with_context(|| format!("list firestore collection {collection}"))?;
            if resp.status() == StatusCode::NOT_FOUND {
                break;
            }
            let page: ListResponse = read_success(resp, collection).await?;
            documents.extend(page.documents);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(documents)
    }

    /// Creates or replaces a document. With `merge`, only the given fields are touched.
    pub async fn set_document(&self, path: &str, fields: Fields, merge: bool) -> anyhow::Result<()> {
        let url = self.url(&self.document_name(path));
        let mut request = self.request(reqwest::Method::PATCH, url).await?;
        if merge {
            let mask: Vec<(&str, &str)> = fields
                .keys()
                .map(|key| ("updateMask.fieldPaths", key.as_str()))
                .collect();
            request = request.query(&mask);
        }
        let resp = request
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .with_context(|| format!("PATCH firestore document {path}"))?;
        let _: serde_json::Value = read_success(resp, path).await?;
        Ok(())
    }

    pub async fn begin_transaction(&self) -> anyhow::Result<String> {
        #[derive(serde::Deserialize)]
        struct BeginResponse {
            transaction: String,
        }

        let url = self.url(&format!("{}:beginTransaction", self.documents_root()));
        let resp = self
            .request(reqwest::Method::POST, url)
            .await?
            .json(&json!({ "options": { "readWrite": {} } }))
            .send()
            .await
            .context("begin firestore transaction")?;
        let begin: BeginResponse = read_success(resp, "beginTransaction").await?;
        Ok(begin.transaction)
    }

    /// Commits `updates` (document path, full field set) inside `transaction`.
    pub async fn commit(&self, transaction: &str, updates: Vec<(String, Fields)>) -> anyhow::Result<CommitOutcome> {
        let writes: Vec<serde_json::Value> = updates
            .into_iter()
            .map(|(path, fields)| {
                json!({ "update": { "name": self.document_name(&path), "fields": fields } })
            })
            .collect();

        let url = self.url(&format!("{}:commit", self.documents_root()));
        let resp = self
            .request(reqwest::Method::POST, url)
            .await?
            .json(&json!({ "writes": writes, "transaction": transaction }))
            .send()
            .await
            .context("commit firestore transaction")?;

        let status = resp.status();
        if status.is_success() {
            return Ok(CommitOutcome::Committed);
        }
        let raw = resp.text().await.context("read firestore commit response")?;
        if status == StatusCode::CONFLICT || error_status(&raw).as_deref() == Some("ABORTED") {
            return Ok(CommitOutcome::Aborted);
        }
        anyhow::bail!("firestore commit failed ({status}): {}", error_message(&raw))
    }

    pub async fn rollback(&self, transaction: &str) -> anyhow::Result<()> {
        let url = self.url(&format!("{}:rollback", self.documents_root()));
        let resp = self
            .request(reqwest::Method::POST, url)
            .await?
            .json(&json!({ "transaction": transaction }))
            .send()
            .await
            .context("rollback firestore transaction")?;
        let _: serde_json::Value = read_success(resp, "rollback").await?;
        Ok(())
    }
}

async fn read_success<T: serde::de::DeserializeOwned>(resp: reqwest::Response, what: &str) -> anyhow::Result<T> {
    let status = resp.status();
    let raw = resp
        .text()
        .await
        .with_context(|| format!("read firestore response: {what}"))?;
    if !status.is_success() {
        anyhow::bail!("firestore error ({status}) for {what}: {}", error_message(&raw));
    }
    if raw.trim().is_empty() {
        return serde_json::from_str("{}").with_context(|| format!("parse firestore response: {what}"));
    }
    serde_json::from_str(&raw).with_context(|| format!("parse firestore response: {what}"))
}

fn error_message(raw: &str) -> String {
    crate::provider::parse_error_message(raw).unwrap_or_else(|| raw.to_owned())
}

fn error_status(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    Some(value.get("error")?.get("status")?.as_str()?.to_owned())
}
