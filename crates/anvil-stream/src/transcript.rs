//! Shared, append-only transcript buffer.

use std::sync::Arc;

use parking_lot::RwLock;

/// Append-only text shared between a bridge and its readers.
///
/// Clones share the same buffer, so a supervisor can read the in-flight
/// transcript while a bridge is still writing to it.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    inner: Arc<RwLock<String>>,
}

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text.
    pub fn push_str(&self, text: &str) {
        self.inner.write().push_str(text);
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> String {
        self.inner.read().clone()
    }

    /// Copy of the contents from byte offset `start`.
    pub fn snapshot_from(&self, start: usize) -> String {
        self.inner.read().get(start..).unwrap_or_default().to_owned()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
