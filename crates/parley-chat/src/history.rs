//! Message history used to replay a thread from its `parent_message_id`.
//!
//! Entries are keyed by ids this crate generates, never by ids a backend
//! returns, so a parent chain always points strictly backwards in time.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use parley_core::ParleyError;
use serde::{Deserialize, Serialize};

/// Role in the chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
    Assistant,
}

/// One message of a stored thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredMessage {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    pub conversation_id: String,
    /// Id the backend gave the completion, kept for tracing only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_id: Option<String>,
}

/// Bounded message store with least-recently-used eviction.
pub(crate) struct MessageStore {
    cache: LruCache<String, StoredMessage>,
}

impl MessageStore {
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(10_000) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// Create an empty store; a zero `capacity` falls back to the default.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(Self::DEFAULT_CAPACITY);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Load a store written from [`MessageStore::to_json`]. A missing file yields an
    /// empty store.
    pub fn load(path: &Path, capacity: usize) -> Result<Self, ParleyError> {
        let mut store = Self::new(capacity);
        if !path.exists() {
            return Ok(store);
        }
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<(String, StoredMessage)> = serde_json::from_str(&content)?;
        for (id, message) in entries {
            store.cache.put(id, message);
        }
        Ok(store)
    }

    /// Serialize the store, least recently used first, so loading it back
    /// restores the same eviction order.
    pub fn to_json(&self) -> Result<String, ParleyError> {
        let mut entries: Vec<(&String, &StoredMessage)> = self.cache.iter().collect();
        entries.reverse();
        Ok(serde_json::to_string(&entries)?)
    }

    pub fn insert(&mut self, id: String, message: StoredMessage) {
        self.cache.put(id, message);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains(id)
    }

    /// Walk the parent chain from `id`, newest first.
    ///
    /// Stops at the first unknown id, and at any id already visited so a
    /// corrupted file cannot make the walk loop. The chain is then promoted
    /// oldest first, leaving its newest message the most recently used.
    pub fn ancestors(&mut self, id: Option<&str>) -> Vec<StoredMessage> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = id.map(str::to_string);
        while let Some(id) = cursor {
            if !visited.insert(id.clone()) {
                break;
            }
            let Some(stored) = self.cache.peek(&id) else {
                break;
            };
            cursor = stored.parent_message_id.clone();
            chain.push((id, stored.clone()));
        }
        for (id, _) in chain.iter().rev() {
            self.cache.promote(id);
        }
        chain.into_iter().map(|(_, message)| message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: Role, text: &str, parent: Option<&str>) -> StoredMessage {
        StoredMessage {
            role,
            text: text.into(),
            parent_message_id: parent.map(str::to_string),
            conversation_id: "conv".into(),
            completion_id: None,
        }
    }

    #[test]
    fn ancestors_walk_newest_first() {
        let mut store = MessageStore::new(10);
        store.insert("u1".into(), message(Role::User, "question", None));
        store.insert("a1".into(), message(Role::Assistant, "answer", Some("u1")));
        store.insert("u2".into(), message(Role::User, "follow up", Some("a1")));

        let texts: Vec<String> = store
            .ancestors(Some("u2"))
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["follow up", "answer", "question"]);
        assert!(store.ancestors(None).is_empty());
        assert!(store.ancestors(Some("missing")).is_empty());
    }

    #[test]
    fn cyclic_chain_terminates() {
        let mut store = MessageStore::new(10);
        store.insert("a".into(), message(Role::User, "first", Some("b")));
        store.insert("b".into(), message(Role::Assistant, "second", Some("a")));

        let chain = store.ancestors(Some("a"));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn store_never_exceeds_capacity() {
        let mut store = MessageStore::new(3);
        for i in 0..10 {
            store.insert(format!("m{i}"), message(Role::User, "x", None));
            assert!(store.len() <= 3);
        }
        assert_eq!(store.len(), 3);
        assert!(!store.contains("m0"));
        assert!(store.contains("m9"));
    }

    #[test]
    fn eviction_spares_the_newest_turns_of_a_walked_thread() {
        let mut store = MessageStore::new(4);
        store.insert("u0".into(), message(Role::User, "q0", None));
        store.insert("a0".into(), message(Role::Assistant, "r0", Some("u0")));
        store.insert("u1".into(), message(Role::User, "q1", Some("a0")));
        store.insert("a1".into(), message(Role::Assistant, "r1", Some("u1")));

        assert_eq!(store.ancestors(Some("a1")).len(), 4);
        store.insert("u2".into(), message(Role::User, "q2", Some("a1")));

        assert!(!store.contains("u0"));
        let texts: Vec<String> = store
            .ancestors(Some("u2"))
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["q2", "r1", "q1", "r0"]);
    }

    #[test]
    fn zero_capacity_uses_default() {
        let store = MessageStore::new(0);
        assert_eq!(store.cache.cap(), MessageStore::DEFAULT_CAPACITY);
    }

    #[test]
    fn saved_store_loads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = MessageStore::new(2);
        store.insert("u1".into(), message(Role::User, "old", None));
        store.insert("a1".into(), message(Role::Assistant, "new", Some("u1")));
        std::fs::write(&path, store.to_json().unwrap()).unwrap();

        let mut loaded = MessageStore::load(&path, 2).unwrap();
        assert_eq!(loaded.len(), 2);
        loaded.insert("u2".into(), message(Role::User, "newest", Some("a1")));
        assert!(!loaded.contains("u1"));
        assert_eq!(loaded.ancestors(Some("u2")).len(), 2);
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = MessageStore::load(Path::new("/nonexistent/history.json"), 5).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            MessageStore::load(&path, 5),
            Err(ParleyError::Serialization(_))
        ));
    }
}
