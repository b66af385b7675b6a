//! Conversation id persistence.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::StorageError;

/// Key-value storage scoped to the bridge.
pub trait ConversationStore: Send + Sync {
    /// Value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store fails.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store fails.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Remove `key`; removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store fails.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage key holding the backend conversation id for `user_id`.
#[must_use]
pub fn conversation_key(user_id: &str) -> String {
    format!("wechat_conv_{user_id}")
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryConversationStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = InMemoryConversationStore::new();
        let key = conversation_key("o_user");
        assert_eq!(key, "wechat_conv_o_user");

        store.set(&key, b"conv-1".to_vec()).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some(&b"conv-1"[..]));

        store.delete(&key).unwrap();
        assert!(store.get(&key).unwrap().is_none());
        store.delete(&key).unwrap();
        assert!(store.is_empty());
    }
}
