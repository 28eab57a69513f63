use crate::classify::{Classifier, StatusRange, Verdict};
use crate::error::ActionError;
use crate::http::{HttpResponse, Method};
use crate::session::Session;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Builds the request for one task invocation. `Ok(None)` skips the invocation.
pub type ActionFn = dyn Fn(&mut Session) -> Result<Option<TaskRequest>, ActionError> + Send + Sync;

/// Runs after a request the classifier accepted, with the raw response.
pub type AfterFn = dyn Fn(&mut Session, &HttpResponse) -> Result<(), ActionError> + Send + Sync;

/// A named, weighted action a virtual user may perform.
///
/// # Example
/// ```
/// use horde::prelude::*;
///
/// let list = TaskSpec::get("GET /jobs", "/rest/v1/jobs?limit=20").weight(3);
///
/// let signup = TaskSpec::new("POST /auth/signup", |session| {
///     let email = format!("user_{}@loadtest.com", session.id());
///     let req = TaskRequest::post("/auth/v1/signup")
///         .json(&serde_json::json!({ "email": email, "password": "secret" }))?;
///     Ok(Some(req))
/// })
/// .classify(AcceptStatus::new(&[400, 422]));
///
/// assert_eq!(list.weight_value(), 3);
/// assert_eq!(signup.name(), "POST /auth/signup");
/// ```
#[derive(Clone)]
pub struct TaskSpec {
    name: String,
    weight: u32,
    action: Arc<ActionFn>,
    classifier: Arc<dyn Classifier>,
    after: Option<Arc<AfterFn>>,
}

impl TaskSpec {
    pub fn new<F>(name: &str, action: F) -> Self
    where
        F: Fn(&mut Session) -> Result<Option<TaskRequest>, ActionError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            weight: 1,
            action: Arc::new(action),
            classifier: Arc::new(StatusRange::default()),
            after: None,
        }
    }

    /// A task that always issues `GET path`.
    pub fn get(name: &str, path: &str) -> Self {
        let path = path.to_string();
        Self::new(name, move |_| Ok(Some(TaskRequest::get(&path))))
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn classify(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn classify_with<F>(self, f: F) -> Self
    where
        F: Fn(u16, &[u8]) -> Verdict + Send + Sync + 'static,
    {
        self.classify(f)
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Session, &HttpResponse) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight_value(&self) -> u32 {
        self.weight
    }

    pub(crate) fn action(&self, session: &mut Session) -> Result<Option<TaskRequest>, ActionError> {
        (self.action)(session)
    }

    pub(crate) fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub(crate) fn after_hook(&self) -> Option<&AfterFn> {
        self.after.as_deref()
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("after", &self.after.is_some())
            .finish_non_exhaustive()
    }
}

/// The request an action wants sent. `path` is resolved against the run's target host
/// unless it is already an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl TaskRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: vec![],
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, ActionError> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("content-type", "application/json").body(body))
    }
}
