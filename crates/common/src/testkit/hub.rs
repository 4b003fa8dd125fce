use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use crate::hub::verify_bearer_token;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub const HUB_SERVER: &str = "https://hub.test";
pub const READ_PREFIX: &str = "https://reads.test/";
pub const CHALLENGE: &str = "[\"gaiahub\",\"0\",\"hub.test\",\"blockstack_storage_please_sign\"]";

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct StoredFile {
    content_type: String,
    body: Bytes,
}

#[derive(Debug)]
struct MemoryHubInner {
    /// `<address>/<path>` -> file
    files: BTreeMap<String, StoredFile>,
    page_size: usize,
    max_upload_megabytes: Option<f64>,
    reject_uploads_suffix: Option<String>,
    seen_tokens: HashSet<String>,
    revoked_tokens: HashSet<String>,
    routes: HashMap<String, HttpResponse>,
    requests: Vec<(Method, String)>,
}

/// In-process hub speaking the hub HTTP protocol, usable as a [`Transport`].
///
/// Serves `hub_info`, store, read, delete and list-files for any address
/// whose bearer token it accepts. Any other URL can be given a canned
/// response with [`MemoryHub::set_route`], e.g. a profile or name lookup.
#[derive(Debug, Clone)]
pub struct MemoryHub {
    inner: Arc<Mutex<MemoryHubInner>>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryHubInner {
                files: BTreeMap::new(),
                page_size: DEFAULT_PAGE_SIZE,
                max_upload_megabytes: None,
                reject_uploads_suffix: None,
                seen_tokens: HashSet::new(),
                revoked_tokens: HashSet::new(),
                routes: HashMap::new(),
                requests: Vec::new(),
            })),
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.inner.lock().page_size = page_size.max(1);
        self
    }

    pub fn with_max_upload_megabytes(self, megabytes: f64) -> Self {
        self.inner.lock().max_upload_megabytes = Some(megabytes);
        self
    }

    /// Fail every upload whose path ends in `suffix` with a 500
    pub fn reject_uploads_matching(&self, suffix: &str) {
        self.inner.lock().reject_uploads_suffix = Some(suffix.to_string());
    }

    pub fn accept_all_uploads(&self) {
        self.inner.lock().reject_uploads_suffix = None;
    }

    /// Answer 401 to every token presented so far
    pub fn expire_tokens(&self) {
        let mut inner = self.inner.lock();
        let seen: Vec<String> = inner.seen_tokens.iter().cloned().collect();
        inner.revoked_tokens.extend(seen);
    }

    pub fn set_route(&self, url: &str, response: HttpResponse) {
        self.inner.lock().routes.insert(url.to_string(), response);
    }

    pub fn file(&self, address: &str, path: &str) -> Option<Bytes> {
        self.inner
            .lock()
            .files
            .get(&format!("{}/{}", address, path))
            .map(|file| file.body.clone())
    }

    pub fn insert_file(&self, address: &str, path: &str, body: impl Into<Bytes>, content_type: &str) {
        self.inner.lock().files.insert(
            format!("{}/{}", address, path),
            StoredFile {
                content_type: content_type.to_string(),
                body: body.into(),
            },
        );
    }

    pub fn remove_file(&self, address: &str, path: &str) -> bool {
        self.inner
            .lock()
            .files
            .remove(&format!("{}/{}", address, path))
            .is_some()
    }

    /// Paths stored for `address`, in listing order
    pub fn paths(&self, address: &str) -> Vec<String> {
        let prefix = format!("{}/", address);
        self.inner
            .lock()
            .files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Requests served so far as `(method, url)`
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.inner.lock().requests.clone()
    }

    pub fn count_requests(&self, method: &Method, url_prefix: &str) -> usize {
        self.inner
            .lock()
            .requests
            .iter()
            .filter(|(m, url)| m == method && url.starts_with(url_prefix))
            .count()
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let url = request.url.to_string();
        let mut inner = self.inner.lock();
        inner.requests.push((request.method.clone(), url.clone()));

        if let Some(response) = inner.routes.get(&url) {
            return response.clone();
        }

        if url == format!("{}/hub_info", HUB_SERVER) {
            return HttpResponse::json_body(
                StatusCode::OK,
                &json!({
                    "challenge_text": CHALLENGE,
                    "read_url_prefix": READ_PREFIX,
                    "latest_auth_version": "v1",
                    "max_file_upload_size_megabytes": inner.max_upload_megabytes,
                }),
            );
        }

        if let Some(key) = url.strip_prefix(READ_PREFIX) {
            return match inner.files.get(key) {
                Some(file) if request.method == Method::GET => {
                    HttpResponse::new(StatusCode::OK, file.body.clone())
                        .with_content_type(&file.content_type)
                }
                _ => not_found(),
            };
        }

        let (action, rest) = match url
            .strip_prefix(HUB_SERVER)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.split_once('/'))
        {
            Some(parts) => parts,
            None => return not_found(),
        };
        let address = rest.split('/').next().unwrap_or_default().to_string();

        if let Err(response) = inner.authorize(request, &address) {
            return response;
        }

        match (action, &request.method) {
            ("store", &Method::POST) => inner.store(request, rest),
            ("delete", &Method::DELETE) => match inner.files.remove(rest) {
                Some(_) => HttpResponse::new(StatusCode::ACCEPTED, ""),
                None => not_found(),
            },
            ("list-files", &Method::POST) => inner.list(request, &address),
            _ => not_found(),
        }
    }
}

impl MemoryHubInner {
    fn authorize(&mut self, request: &HttpRequest, address: &str) -> Result<(), HttpResponse> {
        let unauthorized = |reason: &str| HttpResponse::new(StatusCode::UNAUTHORIZED, reason.to_string());

        let token = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("bearer "))
            .ok_or_else(|| unauthorized("missing bearer token"))?
            .to_string();

        if self.revoked_tokens.contains(&token) {
            return Err(unauthorized("token expired"));
        }
        let granted = verify_bearer_token(&token, CHALLENGE)
            .map_err(|e| unauthorized(&e.to_string()))?;
        if granted.to_string() != address {
            return Err(HttpResponse::new(
                StatusCode::FORBIDDEN,
                format!("token grants {}, not {}", granted, address),
            ));
        }

        self.seen_tokens.insert(token);
        Ok(())
    }

    fn store(&mut self, request: &HttpRequest, key: &str) -> HttpResponse {
        if let Some(suffix) = &self.reject_uploads_suffix {
            if key.ends_with(suffix.as_str()) {
                return HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "upload rejected");
            }
        }

        let content_type = request
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = request.body.clone().unwrap_or_default();
        self.files.insert(
            key.to_string(),
            StoredFile { content_type, body },
        );

        HttpResponse::json_body(
            StatusCode::ACCEPTED,
            &json!({ "publicURL": format!("{}{}", READ_PREFIX, key) }),
        )
    }

    fn list(&self, request: &HttpRequest, address: &str) -> HttpResponse {
        #[derive(Deserialize)]
        struct ListRequest {
            page: Option<String>,
        }

        let page = request
            .body
            .as_ref()
            .and_then(|body| serde_json::from_slice::<ListRequest>(body).ok())
            .and_then(|request| request.page);
        let offset = match page.as_deref().map(str::parse::<usize>) {
            None => 0,
            Some(Ok(offset)) => offset,
            Some(Err(_)) => return HttpResponse::new(StatusCode::BAD_REQUEST, "bad page token"),
        };

        let prefix = format!("{}/", address);
        let paths: Vec<String> = self
            .files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        let entries: Vec<String> = paths
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let next = offset + entries.len();
        let next_page = (next < paths.len()).then(|| next.to_string());

        HttpResponse::json_body(
            StatusCode::OK,
            &json!({ "entries": entries, "page": next_page }),
        )
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::new(StatusCode::NOT_FOUND, "not found")
}

#[async_trait]
impl Transport for MemoryHub {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Ok(self.handle(&request))
    }
}
