use crate::error::TransportError;
use crate::http::{BoxFuture, HttpClient, HttpRequest, HttpResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Scripted client: every request takes `latency` and is answered by the responder.
pub(crate) struct ScriptedClient {
    latency: Duration,
    respond: Box<Responder>,
    sent: AtomicUsize,
}

impl ScriptedClient {
    pub fn new<F>(latency: Duration, respond: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            latency,
            respond: Box::new(respond),
            sent: AtomicUsize::new(0),
        }
    }

    pub fn ok(latency: Duration) -> Self {
        Self::new(latency, |_| Ok(HttpResponse::new(200, "")))
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

impl HttpClient for ScriptedClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;
            (self.respond)(&request)
        })
    }
}
