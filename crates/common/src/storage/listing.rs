use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};

use super::{Storage, StorageError};
use crate::hub::HubConfig;
use crate::transport::HttpRequest;

/// Page fetches allowed before a listing is considered runaway
pub const MAX_LIST_PAGES: usize = 65536;

#[derive(Debug, Serialize)]
struct ListingRequest<'a> {
    page: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ListingPage {
    entries: Option<Vec<String>>,
    #[serde(default)]
    page: Option<String>,
}

/// Lazy listing of the bucket, one page fetched at a time as entries are
/// pulled.
///
/// Pages are strictly sequential: the next page is only requested once every
/// entry of the current one has been handed out. Dropping the listing stops
/// it. A listing is not restartable; after an error it yields nothing more.
#[derive(Debug)]
pub struct FileListing {
    storage: Storage,
    hub: Option<Arc<HubConfig>>,
    buffer: VecDeque<String>,
    next_page: Option<String>,
    pages_fetched: usize,
    max_pages: usize,
    dispatched: usize,
    done: bool,
}

impl FileListing {
    fn new(storage: Storage) -> Self {
        Self {
            storage,
            hub: None,
            buffer: VecDeque::new(),
            next_page: None,
            pages_fetched: 0,
            max_pages: MAX_LIST_PAGES,
            dispatched: 0,
            done: false,
        }
    }

    #[cfg(test)]
    fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub async fn next(&mut self) -> Option<Result<String, StorageError>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                self.dispatched += 1;
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page().await {
                self.done = true;
                return Some(Err(e));
            }
        }
    }

    /// Entries handed out so far
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<String, StorageError>> + Send {
        futures::stream::unfold(self, |mut listing| async move {
            listing.next().await.map(|item| (item, listing))
        })
    }

    async fn fetch_page(&mut self) -> Result<(), StorageError> {
        if self.pages_fetched >= self.max_pages {
            return Err(StorageError::TooManyPages(self.pages_fetched));
        }

        let hub = match &self.hub {
            Some(hub) => hub.clone(),
            None => {
                let hub = self.storage.hub().await?;
                self.hub = Some(hub.clone());
                hub
            }
        };

        let request = HttpRequest::post(hub.list_url()?)
            .bearer(&hub.token)?
            .json(&ListingRequest {
                page: self.next_page.as_deref(),
            })?;

        self.pages_fetched += 1;
        tracing::debug!(
            "list_files: fetching page {} of {}",
            self.pages_fetched,
            hub.address
        );
        let response = self.storage.transport.execute(request).await?;
        if !response.is_success() {
            return Err(StorageError::List {
                status: response.status,
                dispatched: self.dispatched,
                body: response.text_lossy(),
            });
        }

        let page: ListingPage = response
            .json()
            .map_err(|e| StorageError::MalformedHubResponse(e.to_string()))?;
        let entries = page.entries.ok_or_else(|| {
            StorageError::MalformedHubResponse("listing page has no entries".to_string())
        })?;

        self.done = entries.is_empty() || page.page.is_none();
        self.next_page = page.page;
        self.buffer.extend(entries);
        Ok(())
    }
}

impl Storage {
    pub fn list(&self) -> FileListing {
        FileListing::new(self.clone())
    }

    /// Hand every file name to `callback` until it returns `Ok(false)`.
    ///
    /// Returns the number of names handed out, the one that stopped the
    /// listing included. A callback error ends the listing; names already
    /// handled stay handled.
    pub async fn list_files<F>(&self, mut callback: F) -> Result<usize, StorageError>
    where
        F: FnMut(&str) -> anyhow::Result<bool> + Send,
    {
        let mut listing = self.list();
        while let Some(entry) = listing.next().await {
            match callback(&entry?) {
                Ok(true) => {}
                Ok(false) => break,
                Err(source) => {
                    return Err(StorageError::ListCallback {
                        dispatched: listing.dispatched(),
                        source,
                    })
                }
            }
        }
        Ok(listing.dispatched())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::hub::HubConfig;
    use crate::session::{MemorySessionStore, Session};
    use crate::testkit::{AuthResponseBuilder, ScriptedTransport};
    use crate::transport::HttpResponse;
    use futures::StreamExt;
    use http::StatusCode;
    use serde_json::json;

    /// A connected storage whose transport only answers listing pages
    async fn scripted_storage() -> (Storage, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let session = Arc::new(Session::new(Arc::new(MemorySessionStore::new())));

        let identity = SecretKey::generate().unwrap();
        let app_key = SecretKey::generate().unwrap();
        let token = AuthResponseBuilder::new(&identity)
            .app_key(&app_key)
            .build()
            .unwrap();
        session
            .handle_unencrypted_sign_in(&crate::auth::AuthVerifier::new(transport.clone()), &token)
            .await
            .unwrap();
        session
            .set_hub_config(HubConfig {
                server: "https://hub.example.com".to_string(),
                address: app_key.public().address().to_string(),
                token: "v1:token".to_string(),
                url_prefix: "https://reads.example.com/".to_string(),
                max_file_upload_size_megabytes: None,
            })
            .unwrap();

        (Storage::new(session, transport.clone()), transport)
    }

    fn page(entries: &[&str], next: Option<&str>) -> HttpResponse {
        HttpResponse::json_body(StatusCode::OK, &json!({"entries": entries, "page": next}))
    }

    fn push_three_entries(transport: &ScriptedTransport) {
        transport.push_response(page(&["e1", "e2"], Some("tokenA")));
        transport.push_response(page(&["e3"], Some("tokenB")));
        transport.push_response(page(&[], None));
    }

    #[tokio::test]
    async fn test_list_all_pages() {
        let (storage, transport) = scripted_storage().await;
        push_three_entries(&transport);

        let mut seen = Vec::new();
        let count = storage
            .list_files(|name| {
                seen.push(name.to_string());
                Ok(true)
            })
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(seen, vec!["e1", "e2", "e3"]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        let bodies: Vec<serde_json::Value> = requests
            .iter()
            .map(|r| serde_json::from_slice(r.body.as_ref().unwrap()).unwrap())
            .collect();
        assert_eq!(bodies[0], json!({"page": null}));
        assert_eq!(bodies[1], json!({"page": "tokenA"}));
        assert_eq!(bodies[2], json!({"page": "tokenB"}));
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            "bearer v1:token"
        );
        assert!(requests[0].url.as_str().starts_with("https://hub.example.com/list-files/"));
    }

    #[tokio::test]
    async fn test_list_stops_early() {
        let (storage, transport) = scripted_storage().await;
        push_three_entries(&transport);

        let mut calls = 0;
        let count = storage
            .list_files(|_| {
                calls += 1;
                Ok(calls < 2)
            })
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_with_token_ends_listing() {
        let (storage, transport) = scripted_storage().await;
        transport.push_response(page(&[], Some("dangling")));

        let count = storage.list_files(|_| Ok(true)).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_entries_is_malformed() {
        let (storage, transport) = scripted_storage().await;
        transport.push_response(HttpResponse::json_body(
            StatusCode::OK,
            &json!({"page": null}),
        ));

        assert!(matches!(
            storage.list_files(|_| Ok(true)).await,
            Err(StorageError::MalformedHubResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_error_page_reports_progress() {
        let (storage, transport) = scripted_storage().await;
        transport.push_response(page(&["e1", "e2"], Some("tokenA")));
        transport.push_response(HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"));

        match storage.list_files(|_| Ok(true)).await {
            Err(StorageError::List {
                status,
                dispatched,
                body,
            }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(dispatched, 2);
                assert_eq!(body, "boom");
            }
            other => panic!("expected List error, got {:?}", other),
        }
        // no retry of the failed page
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_callback_error_propagates() {
        let (storage, transport) = scripted_storage().await;
        push_three_entries(&transport);

        let mut handled = Vec::new();
        let result = storage
            .list_files(|name| {
                if name == "e2" {
                    anyhow::bail!("cannot handle {}", name);
                }
                handled.push(name.to_string());
                Ok(true)
            })
            .await;

        match result {
            Err(StorageError::ListCallback { dispatched, source }) => {
                assert_eq!(dispatched, 2);
                assert_eq!(source.to_string(), "cannot handle e2");
            }
            other => panic!("expected ListCallback, got {:?}", other),
        }
        assert_eq!(handled, vec!["e1"]);
    }

    #[tokio::test]
    async fn test_page_ceiling() {
        let (storage, transport) = scripted_storage().await;
        for i in 0..4 {
            transport.push_response(page(&["again"], Some(format!("t{}", i).as_str())));
        }

        let mut listing = storage.list().with_max_pages(3);
        let mut result = None;
        while let Some(item) = listing.next().await {
            if let Err(e) = item {
                result = Some(e);
            }
        }

        assert!(matches!(result, Some(StorageError::TooManyPages(3))));
        assert_eq!(listing.pages_fetched(), 3);
        assert_eq!(listing.dispatched(), 3);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_listing_as_stream() {
        let (storage, transport) = scripted_storage().await;
        push_three_entries(&transport);

        let names: Vec<String> = storage
            .list()
            .into_stream()
            .take(2)
            .map(|entry| entry.unwrap())
            .collect()
            .await;
        assert_eq!(names, vec!["e1", "e2"]);
        assert_eq!(transport.requests().len(), 1);
    }
}
