//! Write-through parameter store.

use crate::error::ConfigError;
use crate::params::ParameterSet;
use crate::source::ConfigSource;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Configuration store backed by a [`ConfigSource`].
///
/// The mapping is read once on [`open`](Self::open) and re-read on
/// [`load`](Self::load). Every mutation rewrites the whole document
/// immediately: no buffering, no dirty flag. A failed write leaves the
/// in-memory mapping as it was. [`update`](Self::update) is the
/// one batching path and writes once for any number of keys.
///
/// # Concurrency
///
/// Single writer. Mutation takes `&mut self`; sharing one backing document
/// between several stores (threads or processes) that mutate it is
/// unsupported and is left to the caller to avoid.
pub struct ParameterStore<S: ConfigSource> {
    source: S,
    params: ParameterSet,
}

impl<S: ConfigSource> ParameterStore<S> {
    /// Opens the store and reads its document.
    ///
    /// A missing document yields an empty mapping. A malformed one is an error.
    pub fn open(source: S) -> Result<Self, ConfigError> {
        let mut store = Self {
            source,
            params: ParameterSet::new(),
        };
        store.load()?;
        Ok(store)
    }

    /// Re-reads the document, replacing the in-memory mapping.
    pub fn load(&mut self) -> Result<&ParameterSet, ConfigError> {
        self.params = match self.source.read()? {
            Some(params) => {
                debug!("Loaded {} parameters from {}", params.len(), self.source.describe());
                params
            }
            None => {
                debug!("No configuration at {}, starting empty", self.source.describe());
                ParameterSet::new()
            }
        };
        Ok(&self.params)
    }

    /// Returns the value for `key`, or `default` when absent. Never fails.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.params.get(key, default)
    }

    /// Returns the raw value for `key`.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.params.get_value(key)
    }

    /// Sets one key and persists the whole mapping.
    ///
    /// The in-memory mapping only changes once the write succeeded.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), ConfigError> {
        let key = key.into();
        debug!("Setting '{}' in {}", key, self.source.describe());
        let mut next = self.params.clone();
        next.insert(key, value);
        self.commit(next)
    }

    /// Merges every key of `updates` and persists once.
    pub fn update(&mut self, updates: impl IntoIterator<Item = (String, Value)>) -> Result<(), ConfigError> {
        let updates: ParameterSet = updates.into_iter().collect();
        debug!("Updating {} keys in {}", updates.len(), self.source.describe());
        let mut next = self.params.clone();
        next.merge(updates);
        self.commit(next)
    }

    /// Removes a key, persisting only when it was present.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, ConfigError> {
        let mut next = self.params.clone();
        let removed = next.remove(key);
        if removed.is_some() {
            self.commit(next)?;
        }
        Ok(removed)
    }

    /// Current in-memory mapping.
    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    /// Owned copy of the mapping, for handing to a kernel.
    pub fn snapshot(&self) -> ParameterSet {
        self.params.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn commit(&mut self, next: ParameterSet) -> Result<(), ConfigError> {
        self.source.write(&next)?;
        self.params = next;
        Ok(())
    }
}
