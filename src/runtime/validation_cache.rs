//! Content-addressed validation cache (C8).
//!
//! Grounded on `tools/memory.rs`'s `Arc<Mutex<HashMap>>` + TTL-expiry
//! pattern, widened with an LRU eviction bound and file-fingerprint
//! invalidation since this cache keys on source file state rather than a
//! caller-supplied string.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Validation outcome stored per cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub severity: ValidationSeverity,
    pub message: String,
    /// Parallel to `files`: the fingerprint each file had at insertion time.
    pub fingerprints: Vec<String>,
    pub files: Vec<PathBuf>,
    /// The probe/validation kind that produced this entry (e.g. `"node"`,
    /// `"python"`), used by [`ValidationCache::invalidate_by_type`].
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Fingerprints a file by mtime + size; cheap and avoids re-hashing file
/// contents on every check.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let meta = fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    Ok(format!("{}:{}", mtime, meta.len()))
}

/// Cache key = MD5 over `type + sorted(file paths) + sorted(deps)`.
pub fn cache_key(kind: &str, file_paths: &[PathBuf], deps: &[String]) -> String {
    let mut paths: Vec<String> = file_paths
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    paths.sort();
    let mut deps = deps.to_vec();
    deps.sort();
    let digest = format!("{}|{}|{}", kind, paths.join(","), deps.join(","));
    format!("{:x}", md5::compute(digest))
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    ttl_secs: i64,
    max_entries: usize,
}

/// TTL+LRU content-addressed cache of build/lint validation results.
pub struct ValidationCache {
    inner: Mutex<Inner>,
    persist_path: Option<PathBuf>,
}

impl ValidationCache {
    pub fn new(ttl_secs: i64, max_entries: usize, persist_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                ttl_secs,
                max_entries,
            }),
            persist_path: persist_dir.map(|d| d.join("validation_cache.json")),
        }
    }

    /// Returns the cached entry if present, not expired, and every file's
    /// fingerprint still matches what was recorded at insertion time.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let expired = match inner.entries.get(key) {
            Some(entry) => (now - entry.created_at).num_seconds() > inner.ttl_secs,
            None => return None,
        };
        if expired {
            inner.entries.remove(key);
            return None;
        }
        let stale = {
            let entry = inner.entries.get(key).unwrap();
            entry.files.iter().zip(entry.fingerprints.iter()).any(|(f, recorded)| {
                fingerprint_file(f)
                    .map(|fp| fp != *recorded)
                    .unwrap_or(true)
            })
        };
        if stale {
            inner.entries.remove(key);
            return None;
        }
        let entry = inner.entries.get_mut(key).unwrap();
        entry.last_accessed = now;
        Some(entry.clone())
    }

    pub fn insert(
        &self,
        key: String,
        kind: String,
        severity: ValidationSeverity,
        message: String,
        files: Vec<PathBuf>,
    ) {
        let fingerprints = files
            .iter()
            .map(|f| fingerprint_file(f).unwrap_or_default())
            .collect::<Vec<_>>();
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let max_entries = inner.max_entries;
        inner.entries.insert(
            key,
            CacheEntry {
                severity,
                message,
                fingerprints,
                files,
                kind,
                created_at: now,
                last_accessed: now,
            },
        );
        evict_lru(&mut inner.entries, max_entries);
    }

    /// Drop every cached entry touching `path` (used when a file is
    /// written/edited, per §4.6 invalidation-by-file).
    pub fn invalidate_file(&self, path: &Path) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.retain(|_, e| !e.files.iter().any(|f| f == path));
    }

    /// Drop every cached entry produced by probe `kind` (e.g. invalidating
    /// only `"python"` results after a `requirements.txt` change, leaving
    /// other probe kinds' cached results intact).
    pub fn invalidate_by_type(&self, kind: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.retain(|_, e| e.kind != kind);
    }

    /// Drop every cached entry (used when a tool explicitly requests a
    /// full re-validation).
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
    }

    pub fn persist(&self) -> std::io::Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let inner = self.inner.lock().unwrap();
        let serializable: HashMap<&String, PersistedEntry> = inner
            .entries
            .iter()
            .map(|(k, v)| (k, PersistedEntry::from(v)))
            .collect();
        let json = serde_json::to_string_pretty(&serializable)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(serde::Serialize)]
struct PersistedEntry {
    message: String,
    created_at: DateTime<Utc>,
}

impl From<&CacheEntry> for PersistedEntry {
    fn from(e: &CacheEntry) -> Self {
        Self {
            message: e.message.clone(),
            created_at: e.created_at,
        }
    }
}

fn evict_lru(entries: &mut HashMap<String, CacheEntry>, max_entries: usize) {
    while entries.len() > max_entries {
        let Some(oldest_key) = entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone())
        else {
            break;
        };
        entries.remove(&oldest_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cache_key_is_order_independent() {
        let a = cache_key(
            "lint",
            &[PathBuf::from("b.rs"), PathBuf::from("a.rs")],
            &[],
        );
        let b = cache_key(
            "lint",
            &[PathBuf::from("a.rs"), PathBuf::from("b.rs")],
            &[],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn main() {}").unwrap();
        let cache = ValidationCache::new(3600, 10, None);
        let key = cache_key("build", &[file.clone()], &[]);
        cache.insert(
            key.clone(),
            "node".to_string(),
            ValidationSeverity::Info,
            "ok".to_string(),
            vec![file.clone()],
        );
        let entry = cache.get(&key).expect("entry should be present");
        assert_eq!(entry.message, "ok");
    }

    #[test]
    fn stale_fingerprint_invalidates_entry() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn main() {}").unwrap();
        let cache = ValidationCache::new(3600, 10, None);
        let key = cache_key("build", &[file.clone()], &[]);
        cache.insert(
            key.clone(),
            "node".to_string(),
            ValidationSeverity::Info,
            "ok".to_string(),
            vec![file.clone()],
        );
        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(&file, "fn main() { /* changed */ }").unwrap();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn lru_eviction_respects_max_entries() {
        let cache = ValidationCache::new(3600, 2, None);
        cache.insert("k1".into(), "node".into(), ValidationSeverity::Info, "a".into(), vec![]);
        cache.insert("k2".into(), "node".into(), ValidationSeverity::Info, "b".into(), vec![]);
        cache.insert("k3".into(), "node".into(), ValidationSeverity::Info, "c".into(), vec![]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_file_drops_matching_entries() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "fn main() {}").unwrap();
        let cache = ValidationCache::new(3600, 10, None);
        let key = cache_key("build", &[file.clone()], &[]);
        cache.insert(key.clone(), "node".into(), ValidationSeverity::Info, "ok".into(), vec![file.clone()]);
        cache.invalidate_file(&file);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn invalidate_by_type_drops_only_matching_kind() {
        let cache = ValidationCache::new(3600, 10, None);
        cache.insert("k1".into(), "node".into(), ValidationSeverity::Info, "a".into(), vec![]);
        cache.insert("k2".into(), "python".into(), ValidationSeverity::Info, "b".into(), vec![]);
        cache.invalidate_by_type("node");
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k2").is_some());
    }
}
