use crate::classify::Verdict;
use crate::error::{ActionError, SessionError, TransportError};
use crate::http::{HttpClient, HttpRequest};
use crate::session::Session;
use crate::task::{TaskRequest, TaskSpec};
use horde_core::Outcome;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Failure reason prefix for responses the after hook could not process.
pub const AFTER_HOOK_REASON: &str = "after hook";

/// Turns one task invocation into an [`Outcome`].
#[derive(Clone)]
pub struct Executor {
    client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl Executor {
    pub fn new(client: Arc<dyn HttpClient>, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Runs the task's action, sends the request and classifies the response.
    ///
    /// Returns `Ok(None)` when the action skipped this cycle. Transport errors, rejected
    /// responses and after-hook errors are failed outcomes. Action errors and panics in
    /// task code are session-fatal.
    pub async fn execute(
        &self,
        task: &TaskSpec,
        session: &mut Session,
    ) -> Result<Option<Outcome>, SessionError> {
        let request = guarded(session, task.name(), |session| task.action(session))?;
        let Some(request) = request else {
            trace!("Task {} skipped by user {}", task.name(), session.id());
            return Ok(None);
        };

        let request = self.build_request(request, session);
        let start = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.client.send(request)).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::Timeout),
        };
        let latency = start.elapsed();

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return Ok(Some(Outcome::failure(task.name(), latency, err.to_string())));
            }
        };

        let verdict = guarded(session, task.name(), |_| {
            Ok(task.classifier().classify(response.status, &response.body))
        })?;

        match verdict {
            Verdict::Success => {
                if let Some(after) = task.after_hook() {
                    match guarded(session, task.name(), |session| after(session, &response)) {
                        Ok(()) => {}
                        Err(SessionError::Task { source, .. }) => {
                            warn!(
                                "After hook of {} failed for user {}: {source}",
                                task.name(),
                                session.id()
                            );
                            let reason = format!("{AFTER_HOOK_REASON}: {source}");
                            return Ok(Some(Outcome::failure(task.name(), latency, reason)));
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok(Some(Outcome::success(task.name(), latency)))
            }
            Verdict::Failure(reason) => Ok(Some(Outcome::failure(task.name(), latency, reason))),
        }
    }

    fn build_request(&self, request: TaskRequest, session: &Session) -> HttpRequest {
        let mut headers: Vec<(String, String)> = session
            .headers()
            .iter()
            .filter(|(name, _)| !request.headers.iter().any(|(n, _)| n == *name))
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();
        headers.extend(request.headers);

        HttpRequest {
            method: request.method,
            url: self.resolve(&request.path),
            headers,
            body: request.body,
            timeout: self.timeout,
        }
    }

    fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Runs task code, turning both errors and panics into [`SessionError`]s.
pub(crate) fn guarded<T>(
    session: &mut Session,
    task: &str,
    f: impl FnOnce(&mut Session) -> Result<T, ActionError>,
) -> Result<T, SessionError> {
    match catch_unwind(AssertUnwindSafe(|| f(session))) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(source)) => Err(SessionError::Task {
            user: session.id(),
            class: session.class().to_string(),
            task: task.to_string(),
            source,
        }),
        Err(payload) => Err(SessionError::Panicked {
            user: session.id(),
            class: session.class().to_string(),
            location: task.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
