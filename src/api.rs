use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use reqwest::{Method, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::domain::Record;
use crate::session::Session;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("not authorized, please log in")]
    Unauthorized,
    #[error("{status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
}

/// Collection endpoints answer either with a bare array or with an
/// `{"items": [...]}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Collection<T> {
    Bare(Vec<T>),
    Enveloped {
        items: Vec<T>,
        #[serde(default)]
        total: Option<u64>,
    },
}

impl<T> Collection<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Collection::Bare(items) => items,
            Collection::Enveloped { items, .. } => items,
        }
    }

    pub fn total(&self) -> usize {
        match self {
            Collection::Bare(items) => items.len(),
            Collection::Enveloped { items, total } => {
                total.map(|t| t as usize).unwrap_or(items.len())
            }
        }
    }
}

/// Content collections managed through the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Products,
    Categories,
    News,
    Certificates,
    Partners,
    Messages,
    Content,
    AuditLogs,
}

impl Resource {
    pub fn all() -> &'static [Resource] {
        &[
            Resource::Products,
            Resource::Categories,
            Resource::News,
            Resource::Certificates,
            Resource::Partners,
            Resource::Messages,
            Resource::Content,
            Resource::AuditLogs,
        ]
    }

    pub fn path(&self) -> &'static str {
        match self {
            Resource::Products => "/api/products",
            Resource::Categories => "/api/categories",
            Resource::News => "/api/news",
            Resource::Certificates => "/api/certificates",
            Resource::Partners => "/api/partners",
            Resource::Messages => "/api/contact",
            Resource::Content => "/api/content/sections",
            Resource::AuditLogs => "/api/audit-logs",
        }
    }

    /// Admin route segment.
    pub fn slug(&self) -> &'static str {
        match self {
            Resource::Products => "products",
            Resource::Categories => "categories",
            Resource::News => "news",
            Resource::Certificates => "certificates",
            Resource::Partners => "partners",
            Resource::Messages => "messages",
            Resource::Content => "content",
            Resource::AuditLogs => "audit-logs",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resource::Products => "Products",
            Resource::Categories => "Categories",
            Resource::News => "News",
            Resource::Certificates => "Certificates",
            Resource::Partners => "Partners",
            Resource::Messages => "Messages",
            Resource::Content => "Content",
            Resource::AuditLogs => "Audit log",
        }
    }

    pub fn deletable(&self) -> bool {
        !matches!(self, Resource::Messages | Resource::AuditLogs)
    }

    pub fn editable(&self) -> bool {
        !matches!(self, Resource::AuditLogs)
    }

    pub fn creatable(&self) -> bool {
        !matches!(self, Resource::AuditLogs)
    }

    pub fn edit_route(&self, id: i64) -> String {
        format!("/admin/{}/{}/edit", self.slug(), id)
    }

    /// Query parameters sent with the list request.
    pub fn list_params(&self) -> Vec<(&'static str, String)> {
        match self {
            Resource::AuditLogs => vec![("limit", "100".to_string())],
            Resource::Products | Resource::News => vec![("limit", "100".to_string())],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadKind {
    Image,
    Pdf,
}

impl UploadKind {
    fn path(&self) -> &'static str {
        match self {
            UploadKind::Image => "/api/upload/image",
            UploadKind::Pdf => "/api/upload/pdf",
        }
    }
}

/// Resolve an uploaded file path against the api base. Absolute urls are
/// returned as they are.
pub fn media_url(base_url: &str, path: &str) -> String {
    if path.is_empty() || path.starts_with("http") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

pub fn backup_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("backup_{}.db", now.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
    file_path: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackupResponse {
    filename: Option<String>,
}

/// Blocking REST client.
///
/// The session is handed in on construction and attached to every request.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Option<Session>,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Option<Session>) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
    }

    pub fn media_url(&self, path: &str) -> String {
        media_url(&self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        trace!("{method} {url}");
        let builder = self.http.request(method, url);
        match &self.session {
            Some(session) => builder.bearer_auth(session.token()),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send()?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            info!("Server rejected credentials");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!("Request failed with {status}: {body}");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let text = self.send(builder)?.text()?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let body = json!({"username": username, "password": password});
        let token: TokenResponse =
            self.json(self.request(Method::POST, "/api/auth/login").json(&body))?;
        info!("Logged in as {username}");
        Ok(Session::new(token.access_token, Some(username.to_string())))
    }

    pub fn current_user(&self) -> Result<Record, ApiError> {
        self.json(self.request(Method::GET, "/api/auth/me"))
    }

    pub fn list(
        &self,
        resource: Resource,
        params: &[(&str, String)],
    ) -> Result<Vec<Record>, ApiError> {
        let collection: Collection<Record> =
            self.json(self.request(Method::GET, resource.path()).query(params))?;
        debug!(
            "Fetched {} {} records",
            collection.total(),
            resource.label()
        );
        Ok(collection.into_items())
    }

    pub fn get(&self, resource: Resource, id: i64) -> Result<Record, ApiError> {
        self.json(self.request(Method::GET, &format!("{}/{}", resource.path(), id)))
    }

    pub fn create(&self, resource: Resource, body: &Value) -> Result<Record, ApiError> {
        self.json(self.request(Method::POST, resource.path()).json(body))
    }

    pub fn update(&self, resource: Resource, id: i64, body: &Value) -> Result<Record, ApiError> {
        self.json(
            self.request(Method::PUT, &format!("{}/{}", resource.path(), id))
                .json(body),
        )
    }

    pub fn delete(&self, resource: Resource, id: i64) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, &format!("{}/{}", resource.path(), id)))?;
        info!("Deleted {} #{id}", resource.label());
        Ok(())
    }

    pub fn settings(&self) -> Result<Record, ApiError> {
        self.json(self.request(Method::GET, "/api/settings"))
    }

    pub fn update_settings(&self, body: &Value) -> Result<Record, ApiError> {
        self.json(self.request(Method::PUT, "/api/settings").json(body))
    }

    pub fn stats(&self) -> Result<Record, ApiError> {
        self.json(self.request(Method::GET, "/api/stats"))
    }

    /// Upload a file and return the server path it is reachable under.
    pub fn upload(&self, kind: UploadKind, file: &Path) -> Result<String, ApiError> {
        let form = multipart::Form::new().file("file", file)?;
        let response: UploadResponse = self.json(
            self.request(Method::POST, kind.path())
                .header(header::ACCEPT, "application/json")
                .multipart(form),
        )?;
        let path = response
            .url
            .or(response.file_path)
            .or(response.path)
            .ok_or(ApiError::MissingField("url"))?;
        info!("Uploaded {:?} to {path}", file);
        Ok(path)
    }

    /// Ask the server to snapshot its database. Returns the backup name.
    pub fn create_backup(&self) -> Result<Option<String>, ApiError> {
        let response: BackupResponse = self.json(self.request(Method::POST, "/api/backup/create"))?;
        Ok(response.filename)
    }

    /// Download the current database into `dir` under a timestamped name.
    pub fn download_backup(&self, dir: &Path) -> Result<PathBuf, ApiError> {
        let bytes = self
            .send(self.request(Method::GET, "/api/backup/download"))?
            .bytes()?;
        fs::create_dir_all(dir)?;
        let target = dir.join(backup_file_name(chrono::Local::now()));
        fs::write(&target, &bytes)?;
        info!("Saved backup of {} bytes to {:?}", bytes.len(), target);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn client(server: &mockito::Server, session: Option<Session>) -> ApiClient {
        ApiClient::new(&server.url(), session).unwrap()
    }

    #[test]
    fn list_accepts_bare_arrays() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/api/categories")
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 1, "name_uz": "Vitaminlar"}, {"id": 2, "name_uz": "Siroplar"}]"#)
            .create();

        let rows = client(&server, None).list(Resource::Categories, &[]).unwrap();
        m.assert();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text("name_uz").as_deref(), Some("Siroplar"));
    }

    #[test]
    fn list_accepts_item_envelopes() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/api/audit-logs")
            .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
            .with_body(r#"{"items": [{"id": 9, "action": "delete"}], "total": 40}"#)
            .create();

        let rows = client(&server, None)
            .list(Resource::AuditLogs, &Resource::AuditLogs.list_params())
            .unwrap();
        m.assert();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identifier(), Some(9));
    }

    #[test]
    fn envelope_total_prefers_server_count() {
        let c: Collection<Value> = serde_json::from_str(r#"{"items": [1, 2], "total": 7}"#).unwrap();
        assert_eq!(c.total(), 7);
        let c: Collection<Value> = serde_json::from_str(r#"[1, 2, 3]"#).unwrap();
        assert_eq!(c.total(), 3);
        assert_eq!(c.into_items().len(), 3);
    }

    #[test]
    fn session_token_is_sent_as_bearer() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/api/stats")
            .match_header("authorization", "Bearer s3cret")
            .with_body(r#"{"products": 12, "news": 3}"#)
            .create();

        let stats = client(&server, Some(Session::new("s3cret", None)))
            .stats()
            .unwrap();
        m.assert();
        assert_eq!(stats.number("products"), Some(12));
    }

    #[test]
    fn anonymous_requests_carry_no_authorization() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/api/news")
            .match_header("authorization", Matcher::Missing)
            .with_body("[]")
            .create();
        assert!(client(&server, None).list(Resource::News, &[]).unwrap().is_empty());
        m.assert();
    }

    #[test]
    fn unauthorized_is_its_own_error() {
        let mut server = mockito::Server::new();
        server
            .mock("DELETE", "/api/products/3")
            .with_status(401)
            .with_body(r#"{"detail": "Could not validate credentials"}"#)
            .create();
        let err = client(&server, Some(Session::new("old", None)))
            .delete(Resource::Products, 3)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn other_failures_keep_status_and_body() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/api/categories")
            .with_status(422)
            .with_body(r#"{"detail": "slug missing"}"#)
            .create();
        let err = client(&server, None)
            .create(Resource::Categories, &json!({"name_uz": "X"}))
            .unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 422);
                assert!(body.contains("slug missing"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn login_returns_session() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("POST", "/api/auth/login")
            .match_body(Matcher::Json(json!({"username": "admin", "password": "pw"})))
            .with_body(r#"{"access_token": "tok", "token_type": "bearer"}"#)
            .create();
        let session = client(&server, None).login("admin", "pw").unwrap();
        m.assert();
        assert_eq!(session.token(), "tok");
        assert_eq!(session.username(), Some("admin"));
    }

    #[test]
    fn update_puts_partial_body() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("PUT", "/api/partners/5")
            .match_body(Matcher::Json(json!({"status": "approved"})))
            .with_body(r#"{"id": 5, "status": "approved"}"#)
            .create();
        let rec = client(&server, None)
            .update(Resource::Partners, 5, &json!({"status": "approved"}))
            .unwrap();
        m.assert();
        assert_eq!(rec.text("status").as_deref(), Some("approved"));
    }

    #[test]
    fn upload_returns_url_or_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("leaflet.pdf");
        fs::write(&file, b"%PDF-1.4").unwrap();

        let mut server = mockito::Server::new();
        server
            .mock("POST", "/api/upload/pdf")
            .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
            .with_body(r#"{"file_path": "/uploads/pdfs/leaflet.pdf"}"#)
            .create();
        server
            .mock("POST", "/api/upload/image")
            .with_body(r#"{"filename": "a.png", "url": "/uploads/images/a.png"}"#)
            .create();

        let api = client(&server, None);
        assert_eq!(
            api.upload(UploadKind::Pdf, &file).unwrap(),
            "/uploads/pdfs/leaflet.pdf"
        );
        assert_eq!(
            api.upload(UploadKind::Image, &file).unwrap(),
            "/uploads/images/a.png"
        );
    }

    #[test]
    fn backup_download_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/backup/download")
            .with_header("content-type", "application/x-sqlite3")
            .with_body(b"SQLite format 3\0".as_slice())
            .create();
        server
            .mock("POST", "/api/backup/create")
            .with_body(r#"{"message": "ok", "filename": "backup_20250101_000000.db"}"#)
            .create();

        let api = client(&server, Some(Session::new("t", None)));
        assert_eq!(
            api.create_backup().unwrap().as_deref(),
            Some("backup_20250101_000000.db")
        );
        let path = api.download_backup(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("backup_") && name.ends_with(".db"));
        assert_eq!(fs::read(&path).unwrap(), b"SQLite format 3\0");
    }

    #[test]
    fn backup_names_follow_server_format() {
        let at = chrono::Local
            .with_ymd_and_hms(2025, 3, 9, 14, 5, 7)
            .single()
            .unwrap();
        assert_eq!(backup_file_name(at), "backup_20250309_140507.db");
    }

    #[test]
    fn media_paths_resolve_against_base() {
        assert_eq!(
            media_url("http://localhost:8000/", "/uploads/images/a.png"),
            "http://localhost:8000/uploads/images/a.png"
        );
        assert_eq!(
            media_url("http://localhost:8000", "uploads/a.png"),
            "http://localhost:8000/uploads/a.png"
        );
        assert_eq!(
            media_url("http://localhost:8000", "https://cdn.example.com/a.png"),
            "https://cdn.example.com/a.png"
        );
        assert_eq!(media_url("http://localhost:8000", ""), "");
    }

    #[test]
    fn resource_routes() {
        assert_eq!(Resource::Products.edit_route(3), "/admin/products/3/edit");
        assert!(!Resource::AuditLogs.deletable());
        assert!(Resource::Content.deletable());
        assert_eq!(Resource::all().len(), 8);
    }
}
