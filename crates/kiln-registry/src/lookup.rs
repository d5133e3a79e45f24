//! Static lookup tables.
//!
//! A table document lives at `{root}/{table}.json` and has two views:
//!
//! ```json
//! {
//!   "byName": { "idle": 0, "walk": 1, "run": 14 },
//!   "byPath": { "Basic/Idle": 0, "Basic/Walking": 1 }
//! }
//! ```
//!
//! A plain object without either key is read as the `byName` view.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tokio::fs;
use tracing::{debug, warn};

/// One name -> value table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupTable {
  #[serde(default)]
  by_name: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  by_path: BTreeMap<String, serde_json::Value>,
}

impl LookupTable {
  pub fn new(
    by_name: impl IntoIterator<Item = (String, serde_json::Value)>,
    by_path: impl IntoIterator<Item = (String, serde_json::Value)>,
  ) -> Self {
    Self {
      by_name: by_name.into_iter().collect(),
      by_path: by_path.into_iter().collect(),
    }
  }

  /// Look a key up by name (exact, then ASCII case-insensitive), then by qualified path.
  ///
  /// When several names differ only in case, the case-insensitive match is the
  /// one that sorts first.
  pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
    self
      .by_name
      .get(key)
      .or_else(|| {
        self
          .by_name
          .iter()
          .find(|(name, _)| name.eq_ignore_ascii_case(key))
          .map(|(_, value)| value)
      })
      .or_else(|| self.by_path.get(key))
  }

  pub fn is_empty(&self) -> bool {
    self.by_name.is_empty() && self.by_path.is_empty()
  }

  fn from_document(doc: serde_json::Value) -> Option<Self> {
    let is_structured = doc.get("byName").is_some() || doc.get("byPath").is_some();
    if is_structured {
      return serde_json::from_value(doc).ok();
    }

    match doc {
      serde_json::Value::Object(map) => Some(Self {
        by_name: map.into_iter().collect(),
        by_path: BTreeMap::new(),
      }),
      _ => None,
    }
  }
}

/// Lookup tables, each read from disk at most once.
pub struct LookupTables {
  root: Option<PathBuf>,
  cache: RwLock<HashMap<String, Arc<LookupTable>>>,
}

impl LookupTables {
  /// Tables backed by a directory, loaded lazily.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: Some(root.into()),
      cache: RwLock::new(HashMap::new()),
    }
  }

  /// Tables already in memory. Unknown table names resolve to empty tables.
  pub fn from_tables(tables: impl IntoIterator<Item = (String, LookupTable)>) -> Self {
    let cache = tables
      .into_iter()
      .map(|(name, table)| (name, Arc::new(table)))
      .collect();
    Self {
      root: None,
      cache: RwLock::new(cache),
    }
  }

  /// Get a table, loading it on first access.
  ///
  /// A missing or unreadable document yields an empty table and a warning.
  pub fn table(&self, name: &str) -> Arc<LookupTable> {
    {
      let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
      if let Some(table) = cache.get(name) {
        return table.clone();
      }
    }

    let table = Arc::new(self.read_table(name));

    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    cache
      .entry(name.to_string())
      .or_insert_with(|| table.clone())
      .clone()
  }

  /// Look a key up in a table.
  pub fn get(&self, table: &str, key: &str) -> Option<serde_json::Value> {
    self.table(table).get(key).cloned()
  }

  /// Read every `*.json` table in the backing directory into the cache.
  ///
  /// Tables already cached are kept. A missing directory leaves the cache as it is.
  pub async fn preload(&self) -> std::io::Result<usize> {
    let Some(root) = &self.root else {
      return Ok(0);
    };

    let mut entries = match fs::read_dir(root).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        warn!(path = %root.display(), "lookup directory not found");
        return Ok(0);
      }
      Err(e) => return Err(e),
    };

    let mut loaded = 0;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
        continue;
      };

      let content = fs::read_to_string(&path).await;
      let table = Arc::new(parse_table(&name, &path, content));
      debug!(table = %name, "loaded lookup table");

      {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.entry(name).or_insert(table);
      }
      loaded += 1;
    }

    Ok(loaded)
  }

  // Fallback for tables that were not preloaded. Blocks the calling thread.
  fn read_table(&self, name: &str) -> LookupTable {
    let Some(root) = &self.root else {
      warn!(table = %name, "lookup table not found, using empty table");
      return LookupTable::default();
    };

    let path = root.join(format!("{}.json", name));
    parse_table(name, &path, std::fs::read_to_string(&path))
  }
}

fn parse_table(name: &str, path: &Path, content: std::io::Result<String>) -> LookupTable {
  let content = match content {
    Ok(content) => content,
    Err(e) => {
      warn!(table = %name, path = %path.display(), error = %e, "lookup table not readable, using empty table");
      return LookupTable::default();
    }
  };

  let table = serde_json::from_str(&content)
    .ok()
    .and_then(LookupTable::from_document);
  match table {
    Some(table) => table,
    None => {
      warn!(table = %name, path = %path.display(), "lookup table is malformed, using empty table");
      LookupTable::default()
    }
  }
}
