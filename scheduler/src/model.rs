//! The remote model client contract and a reference, disk-caching
//! implementation.
//!
//! Declared out of scope for the core scheduler (section 1: "the
//! remote model client and its response cache" is an external
//! collaborator), but the specification's external-interfaces section
//! pins down the cache's on-disk contract precisely enough that a
//! reference implementation belongs in the ambient stack: agent
//! programs need *something* behind `LlmClient` to run end to end, and
//! the content-addressed cache is what makes test fixtures and
//! scenario replay deterministic, grounded on `original_source`'s
//! `llmmodel.LLMModel._lookup_cache`/`_write_cache`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::SchedulerError;
use crate::msgseq::ChatMessage;
use crate::tools::ToolList;

/// A model's reply to a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The assistant's message content.
    pub content: String,
    /// Tool calls the model requested, as `(tool name, arguments)`.
    pub tool_calls: Vec<(String, serde_json::Value)>,
}

/// The contract an LLM agent task dispatches through.
///
/// `send_data` is async because it may cross the network; the
/// scheduler's event loop awaits it directly rather than handing it to
/// the synchronous thread pool (section 5).
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a chat request, optionally offering `tools`, and returns
    /// the model's reply.
    async fn send_data(
        &self,
        messages: &[ChatMessage],
        tools: Option<&ToolList>,
    ) -> Result<ModelResponse, SchedulerError>;
}

#[derive(Serialize)]
struct CacheKey<'a> {
    messages: &'a [ChatMessage],
    tool_names: Vec<&'a str>,
}

/// Wraps an [`LlmClient`] with a content-addressed, on-disk response
/// cache.
///
/// Cache layout mirrors `original_source` exactly: the request is
/// canonically serialized, SHA-1 hashed, and the response is written
/// to `debug_path/xx/yy/<hash>-<seq>.{entry,val}` where `xx`/`yy` are
/// the first four hex digits of the hash split into two directory
/// levels. `.entry` holds the canonical request (for collision
/// detection and debugging), `.val` holds the response; both are
/// written to a temporary path and atomically renamed into place so a
/// crash mid-write can never leave a corrupt cache entry visible.
pub struct CachingModelClient<C> {
    inner: C,
    debug_path: Option<PathBuf>,
    sequence_numbers: Mutex<HashMap<String, u64>>,
    next_disambiguator: AtomicU64,
}

impl<C: LlmClient> CachingModelClient<C> {
    /// Wraps `inner`, caching under `debug_path` if given.
    pub fn new(inner: C, debug_path: Option<PathBuf>) -> Self {
        CachingModelClient {
            inner,
            debug_path,
            sequence_numbers: Mutex::new(HashMap::new()),
            next_disambiguator: AtomicU64::new(0),
        }
    }

    fn hash_key(messages: &[ChatMessage], tools: Option<&ToolList>) -> Result<String, SchedulerError> {
        let tool_names = tools.map(|t| t.tools().iter().map(|tool| tool.name.as_str()).collect()).unwrap_or_default();
        let key = CacheKey { messages, tool_names };
        let canonical = serde_json::to_vec(&key).map_err(|e| SchedulerError::ModelClient(e.to_string()))?;
        let mut hasher = Sha1::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }

    fn cache_paths(root: &Path, hash: &str, seq: u64) -> (PathBuf, PathBuf) {
        let dir = root.join(&hash[0..2]).join(&hash[2..4]);
        let stem = dir.join(format!("{hash}-{seq}"));
        (stem.with_extension("entry"), stem.with_extension("val"))
    }

    fn lookup_cache(&self, hash: &str, canonical_entry: &[u8]) -> Result<Option<ModelResponse>, SchedulerError> {
        let Some(root) = &self.debug_path else { return Ok(None) };
        let next_seq = *self.sequence_numbers.lock().unwrap().get(hash).unwrap_or(&0);
        for seq in 0..next_seq {
            let (entry_path, val_path) = Self::cache_paths(root, hash, seq);
            let Ok(entry_bytes) = std::fs::read(&entry_path) else { continue };
            if entry_bytes != canonical_entry {
                continue;
            }
            let bytes = std::fs::read(&val_path)?;
            return Ok(Some(serde_json::from_slice(&bytes).map_err(|e| SchedulerError::ModelClient(e.to_string()))?));
        }
        Ok(None)
    }

    fn write_cache(
        &self,
        hash: &str,
        canonical_entry: &[u8],
        response: &ModelResponse,
    ) -> Result<(), SchedulerError> {
        let Some(root) = &self.debug_path else { return Ok(()) };
        let seq = {
            let mut seqs = self.sequence_numbers.lock().unwrap();
            let entry = seqs.entry(hash.to_string()).or_insert(0);
            let current = *entry;
            *entry += 1;
            current
        };
        let (entry_path, val_path) = Self::cache_paths(root, hash, seq);
        std::fs::create_dir_all(entry_path.parent().unwrap())?;

        let disambiguator = self.next_disambiguator.fetch_add(1, Ordering::Relaxed);
        let tmp_entry = entry_path.with_extension(format!("entry.tmp{disambiguator}"));
        let tmp_val = val_path.with_extension(format!("val.tmp{disambiguator}"));

        std::fs::write(&tmp_entry, canonical_entry)?;
        std::fs::write(&tmp_val, serde_json::to_vec(response).map_err(|e| SchedulerError::ModelClient(e.to_string()))?)?;
        std::fs::rename(&tmp_entry, &entry_path)?;
        std::fs::rename(&tmp_val, &val_path)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<C: LlmClient> LlmClient for CachingModelClient<C> {
    async fn send_data(
        &self,
        messages: &[ChatMessage],
        tools: Option<&ToolList>,
    ) -> Result<ModelResponse, SchedulerError> {
        let hash = Self::hash_key(messages, tools)?;
        let tool_names = tools.map(|t| t.tools().iter().map(|tool| tool.name.as_str()).collect()).unwrap_or_default();
        let canonical = serde_json::to_vec(&CacheKey { messages, tool_names })
            .map_err(|e| SchedulerError::ModelClient(e.to_string()))?;

        if let Some(cached) = self.lookup_cache(&hash, &canonical)? {
            return Ok(cached);
        }
        let response = self.inner.send_data(messages, tools).await?;
        self.write_cache(&hash, &canonical, &response)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingClient {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl LlmClient for CountingClient {
        async fn send_data(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<&ToolList>,
        ) -> Result<ModelResponse, SchedulerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ModelResponse { content: "hi".to_string(), tool_calls: vec![] })
        }
    }

    #[tokio::test]
    async fn identical_requests_hit_the_disk_cache() {
        let dir = std::env::temp_dir().join(format!("agentflow-model-cache-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CachingModelClient::new(CountingClient { calls: calls.clone() }, Some(dir.clone()));

        let messages = vec![ChatMessage::new("user", "hello")];
        client.send_data(&messages, None).await.unwrap();
        client.send_data(&messages, None).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
