//! Channel catalog and its on-disk cache.
//!
//! The cache file is a pretty-printed JSON array of `{id, title}` objects.
//! Older files keyed by channel id (`{"12": {"id": 12, "title": ...}}`) are
//! still accepted on load. A cache is always replaced wholesale: `save`
//! writes to a sibling temp file and renames it into place.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub title: String,
    /// Channel group, for stations that organise channels in a tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Channel id → entry, always iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<u64, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CatalogEntry) {
        self.entries.insert(entry.id, entry);
    }

    pub fn get(&self, id: u64) -> Option<&CatalogEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// `id - title` lines sorted by id, for the channel prompt.
    pub fn listing(&self) -> String {
        self.iter()
            .map(|e| match &e.group {
                Some(group) => format!("{} - {} / {}", e.id, group, e.title),
                None => format!("{} - {}", e.id, e.title),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for entry in iter {
            catalog.insert(entry);
        }
        catalog
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<CatalogEntry>),
    Map(BTreeMap<String, CatalogEntry>),
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match CatalogFile::deserialize(deserializer)? {
            CatalogFile::List(list) => list.into_iter().collect(),
            CatalogFile::Map(map) => map.into_values().collect(),
        })
    }
}

// ── cache file ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog cache is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load(path: &Path) -> Result<Catalog, CatalogError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save(path: &Path, catalog: &Catalog) -> Result<(), CatalogError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(catalog)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Age of the file from its modification time. `None` when it can't be stat'd.
pub fn file_age(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    // A timestamp in the future counts as brand new.
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

/// Missing or unreadable files are infinitely old.
pub fn is_stale(path: &Path, max_age: Duration) -> bool {
    match file_age(path) {
        Some(age) => age > max_age,
        None => true,
    }
}

/// Where a catalog handed out by [`load_or_refresh`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOrigin {
    Cache,
    Remote,
}

/// Use the cache when it is fresh, otherwise call `fetch` and overwrite it.
///
/// `force` skips the cache entirely (`--no-cache`). A cache that fails to
/// parse is treated like an expired one. Failing to write the new cache is
/// logged and otherwise ignored; the fetched catalog is still returned.
pub async fn load_or_refresh<F, Fut, E>(
    path: &Path,
    max_age: Duration,
    force: bool,
    fetch: F,
) -> Result<(Catalog, CatalogOrigin), E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Catalog, E>>,
{
    debug!("Looking for channels in cache {}", path.display());
    if !force && !is_stale(path, max_age) {
        match load(path) {
            Ok(catalog) => {
                debug!("Loaded {} channels from cache", catalog.len());
                return Ok((catalog, CatalogOrigin::Cache));
            }
            Err(e) => warn!("Cache reading problem, regenerating: {}", e),
        }
    } else {
        debug!("Cache is missing, expired or bypassed, regenerating it");
    }

    let catalog = fetch().await?;
    info!("Retrieved {} channels from the station", catalog.len());
    match save(path, &catalog) {
        Ok(()) => debug!("Channels list saved in cache file {}", path.display()),
        Err(e) => warn!("Writing cache error: {}", e),
    }
    Ok((catalog, CatalogOrigin::Remote))
}
