use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::watch;

use super::{HttpRequest, HttpResponse, Transport, TransportError};

const USER_AGENT: &str = concat!("hubkit/", env!("CARGO_PKG_VERSION"));

/// Aborts every request in flight on the transport it was taken from.
///
/// Requests issued after [`CancelHandle::cancel`] returns are not affected.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<u64>>);

impl CancelHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self(Arc::new(tx))
    }

    pub fn cancel(&self) {
        self.0.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.0.subscribe()
    }
}

/// [`Transport`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    cancel: CancelHandle,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            cancel: CancelHandle::new(),
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut cancelled = self.cancel.subscribe();

        tracing::debug!("{} {}", request.method, request.url);
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let send = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(HttpResponse {
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            result = send => result.map_err(TransportError::from),
            _ = cancelled.changed() => Err(TransportError::Cancelled),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        // 10.255.255.1 is non-routable, the connect hangs until cancelled
        let transport = ReqwestTransport::new(None).unwrap();
        let handle = transport.cancel_handle();
        let url = Url::parse("http://10.255.255.1:81/hub_info").unwrap();

        let request = tokio::spawn({
            let transport = transport.clone();
            async move { transport.execute(HttpRequest::get(url)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let result = request.await.unwrap();
        match result {
            Err(TransportError::Cancelled) => {}
            // some sandboxes reject the connect outright
            Err(TransportError::Io(_)) => {}
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Cancelled.is_retryable());
        assert!(TransportError::Timeout.is_retryable());
        assert!(!TransportError::InvalidHeader("authorization".into()).is_retryable());
    }
}
