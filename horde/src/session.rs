use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;

/// Per-user mutable state.
///
/// Owned by exactly one virtual user loop and handed to task code as `&mut Session`. Holds
/// the headers sent with every request, a scratch space for data picked up from earlier
/// responses, the user's RNG and its stop signal.
pub struct Session {
    id: u64,
    class: String,
    headers: BTreeMap<String, String>,
    scratch: HashMap<String, Box<dyn Any + Send + Sync>>,
    rng: SmallRng,
    cancel: CancellationToken,
}

impl Session {
    /// A detached session, mainly useful for exercising task code directly.
    pub fn new(id: u64, class: &str) -> Self {
        Self::spawned(
            id,
            class,
            BTreeMap::new(),
            SmallRng::from_entropy(),
            CancellationToken::new(),
        )
    }

    pub(crate) fn spawned(
        id: u64,
        class: &str,
        headers: BTreeMap<String, String>,
        rng: SmallRng,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            class: class.to_string(),
            headers,
            scratch: HashMap::new(),
            rng,
            cancel,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Header names are stored lowercased.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.scratch.insert(key.to_string(), Box::new(value));
    }

    /// Returns `None` when the key is missing or holds a different type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.scratch.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        let value = self.scratch.remove(key)?;
        match value.downcast::<T>() {
            Ok(v) => Some(*v),
            Err(value) => {
                self.scratch.insert(key.to_string(), value);
                None
            }
        }
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Whether the scheduler has asked this user to stop.
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("headers", &self.headers)
            .field("scratch_keys", &self.scratch.keys().collect::<Vec<_>>())
            .finish()
    }
}
