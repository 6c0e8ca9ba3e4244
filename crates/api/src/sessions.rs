use fadvisor_core::llm::ChatMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_USER_ID: &str = "user";
pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    /// Missing or blank ids fall back to the shared defaults.
    pub fn new(user_id: Option<&str>, session_id: Option<&str>) -> Self {
        let pick = |v: Option<&str>, default: &str| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            user_id: pick(user_id, DEFAULT_USER_ID),
            session_id: pick(session_id, DEFAULT_SESSION_ID),
        }
    }
}

/// In-memory conversation history per (user, session).
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionKey, Vec<ChatMessage>>>>,
}

impl SessionStore {
    /// History for `key`, creating an empty session on first use.
    pub async fn get_or_create(&self, key: &SessionKey) -> Vec<ChatMessage> {
        if let Some(history) = self.inner.read().await.get(key) {
            return history.clone();
        }
        self.inner
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Vec<ChatMessage>> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn append(&self, key: &SessionKey, messages: impl IntoIterator<Item = ChatMessage>) {
        self.inner
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .extend(messages);
    }

    pub async fn delete(&self, key: &SessionKey) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_use_defaults() {
        let key = SessionKey::new(None, Some("  "));
        assert_eq!(key.user_id, "user");
        assert_eq!(key.session_id, "default");

        let key = SessionKey::new(Some("alice"), Some("s1"));
        assert_eq!(key.user_id, "alice");
        assert_eq!(key.session_id, "s1");
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_deletable() {
        let store = SessionStore::default();
        let a = SessionKey::new(Some("alice"), None);
        let b = SessionKey::new(Some("bob"), None);

        assert!(store.get_or_create(&a).await.is_empty());
        assert_eq!(store.len().await, 1);

        store
            .append(&a, [ChatMessage::user("hi"), ChatMessage::assistant("hello")])
            .await;
        assert_eq!(store.get(&a).await.unwrap().len(), 2);
        assert_eq!(store.get(&b).await, None);

        assert!(store.delete(&a).await);
        assert!(!store.delete(&a).await);
        assert_eq!(store.len().await, 0);
    }
}
