//! Per-clip render cache for multi-clip exports.
//!
//! An unchanged clip from a prior render is reused rather than re-encoded.
//! The key is the clip's version plus a digest of its full transform
//! parameters, so either a persisted edit (version bump) or a parameter
//! difference (e.g. another target fps) misses the cache.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::RwLock;

use matchcut_core::composer::ExportableClip;
use matchcut_core::hashing::sha256_hex;
use matchcut_core::types::DbId;

/// Cache key: clip version + transform parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    clip_id: DbId,
    version: i32,
    params_digest: String,
}

impl CacheKey {
    /// Derive the key for one resolved clip at a given target fps.
    pub fn for_clip(clip: &ExportableClip, target_fps: f64, include_audio: bool) -> Self {
        let params = serde_json::to_vec(&(clip, target_fps, include_audio))
            .expect("ExportableClip serializes");
        Self {
            clip_id: clip.clip_id,
            version: clip.version,
            params_digest: sha256_hex(&params),
        }
    }
}

/// Maps cache keys to finished per-clip render outputs on disk.
pub struct RenderCache {
    entries: RwLock<HashMap<CacheKey, PathBuf>>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A cached render output, if the file still exists.
    pub async fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.entries.read().await.get(key).cloned()?;
        if path.exists() {
            Some(path)
        } else {
            // Spool cleanup can race us; drop the stale entry.
            self.entries.write().await.remove(key);
            None
        }
    }

    pub async fn insert(&self, key: CacheKey, path: PathBuf) {
        self.entries.write().await.insert(key, path);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}
