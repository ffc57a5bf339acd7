//! LLM response cache
//!
//! Identical requests (same model, system prompt and history) replay the
//! stored reply instead of calling the provider again. The cache can be
//! persisted as JSON so repeated runs of the same conversation are free.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::providers::{ChatMessage, ChatResponse};

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    response: ChatResponse,
}

pub struct ResponseCache {
    entries: Mutex<LruCache<String, ChatResponse>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("len", &self.len())
            .field("path", &self.path)
            .finish()
    }
}

impl ResponseCache {
    /// In-memory cache holding at most `capacity` replies
    pub fn in_memory(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            path: None,
        }
    }

    /// Load a persisted cache, starting empty if the file does not exist yet
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let mut cache = Self::in_memory(capacity);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read cache at {}", path.display()))?;
            let stored: Vec<CacheEntry> = match serde_json::from_str(&content) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Ignoring unreadable cache at {}: {}", path.display(), e);
                    Vec::new()
                }
            };
            if let Ok(entries) = cache.entries.get_mut() {
                // stored least-recent first, so replaying keeps recency order
                for entry in stored {
                    entries.put(entry.key, entry.response);
                }
            }
            info!("Loaded {} cached responses from {}", cache.len(), path.display());
        }

        cache.path = Some(path);
        Ok(cache)
    }

    /// Stable key for a request
    pub fn key(model: &str, system: &str, messages: &[ChatMessage]) -> String {
        let mut hasher = DefaultHasher::new();
        model.hash(&mut hasher);
        system.hash(&mut hasher);
        messages.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    pub fn get(&self, key: &str) -> Option<ChatResponse> {
        let hit = self.entries.lock().ok()?.get(key).cloned();
        debug!("Cache {} for {}", if hit.is_some() { "hit" } else { "miss" }, key);
        hit
    }

    pub fn put(&self, key: String, response: ChatResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, response);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the cache back to its file, if it has one
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let stored: Vec<CacheEntry> = match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .rev()
                .map(|(key, response)| CacheEntry {
                    key: key.clone(),
                    response: response.clone(),
                })
                .collect(),
            Err(_) => return Ok(()),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }

        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&stored).context("Failed to serialize cache")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move cache into {}", path.display()))?;

        debug!("Saved {} cached responses to {}", stored.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatUsage, StopReason};

    fn reply(text: &str) -> ChatResponse {
        ChatResponse {
            text: text.to_string(),
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage {
                input_tokens: 3,
                output_tokens: 1,
            },
        }
    }

    #[test]
    fn test_key_depends_on_every_part() {
        let msgs = vec![ChatMessage::user("hi")];
        let base = ResponseCache::key("gpt-4", "sys", &msgs);
        assert_eq!(base, ResponseCache::key("gpt-4", "sys", &msgs));
        assert_ne!(base, ResponseCache::key("gpt-4o", "sys", &msgs));
        assert_ne!(base, ResponseCache::key("gpt-4", "other", &msgs));
        assert_ne!(base, ResponseCache::key("gpt-4", "sys", &[ChatMessage::user("hey")]));
    }

    #[test]
    fn test_get_put() {
        let cache = ResponseCache::in_memory(4);
        assert!(cache.get("k").is_none());
        cache.put("k".to_string(), reply("v"));
        assert_eq!(cache.get("k").unwrap().text, "v");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recent() {
        let cache = ResponseCache::in_memory(2);
        cache.put("a".to_string(), reply("1"));
        cache.put("b".to_string(), reply("2"));
        cache.get("a");
        cache.put("c".to_string(), reply("3"));
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_zero_capacity_still_holds_one() {
        let cache = ResponseCache::in_memory(0);
        cache.put("a".to_string(), reply("1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let cache = ResponseCache::load(&path, 8).unwrap();
        assert!(cache.is_empty());
        cache.put("a".to_string(), reply("1"));
        cache.put("b".to_string(), reply("2"));
        cache.save().unwrap();

        let reloaded = ResponseCache::load(&path, 8).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("b").unwrap(), reply("2"));
        assert_eq!(reloaded.path(), Some(path.as_path()));
    }

    #[test]
    fn test_reload_keeps_recency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = ResponseCache::load(&path, 2).unwrap();
        cache.put("old".to_string(), reply("1"));
        cache.put("new".to_string(), reply("2"));
        cache.save().unwrap();

        let reloaded = ResponseCache::load(&path, 2).unwrap();
        reloaded.put("newer".to_string(), reply("3"));
        assert!(reloaded.get("old").is_none());
        assert!(reloaded.get("new").is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        let cache = ResponseCache::load(&path, 4).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let cache = ResponseCache::in_memory(4);
        cache.put("a".to_string(), reply("1"));
        assert!(cache.save().is_ok());
    }
}
