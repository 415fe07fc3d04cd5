use crate::error::ConfigError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A source of raw-name → canonical-name pairs, in a stable order.
pub trait CarrierStore: Send + Sync {
    fn name(&self) -> &str;

    fn load_mappings(&self) -> Result<Vec<(String, String)>, ConfigError>;
}

/// Static mapping file: a JSON object of `"raw name": "Canonical Name"`.
#[derive(Debug, Clone)]
pub struct JsonCarrierFile {
    path: PathBuf,
}

impl JsonCarrierFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CarrierStore for JsonCarrierFile {
    fn name(&self) -> &str {
        "json-file"
    }

    fn load_mappings(&self) -> Result<Vec<(String, String)>, ConfigError> {
        let display = self.path.display().to_string();
        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: display.clone(),
            source,
        })?;

        let Value::Object(entries) = value else {
            return Err(ConfigError::Source(format!(
                "{display} must hold a json object of carrier names"
            )));
        };

        Ok(entries
            .into_iter()
            .filter_map(|(raw, canonical)| canonical.as_str().map(|name| (raw, name.to_string())))
            .collect())
    }
}

/// Key-value mapping held in memory, e.g. rows read from the `carriers_map`
/// table by the caller.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrierStore {
    entries: Vec<(String, String)>,
}

impl InMemoryCarrierStore {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(raw, canonical)| (raw.into(), canonical.into()))
                .collect(),
        }
    }
}

impl CarrierStore for InMemoryCarrierStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn load_mappings(&self) -> Result<Vec<(String, String)>, ConfigError> {
        Ok(self.entries.clone())
    }
}

#[derive(Debug, Default)]
struct CarrierTable {
    entries: Vec<(String, String)>,
    exact: HashMap<String, usize>,
}

impl CarrierTable {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut table = CarrierTable::default();
        for (raw, canonical) in pairs {
            let key = raw.trim().to_lowercase();
            if key.is_empty() || table.exact.contains_key(&key) {
                continue;
            }
            table.exact.insert(key.clone(), table.entries.len());
            table.entries.push((key, canonical));
        }
        table
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        if let Some(&position) = self.exact.get(key) {
            return Some(self.entries[position].1.as_str());
        }

        self.entries
            .iter()
            .find(|(raw, _)| key.contains(raw.as_str()) || raw.contains(key))
            .map(|(_, canonical)| canonical.as_str())
    }
}

/// Maps raw carrier strings to canonical names. The table is loaded on first
/// use from the primary store, or from the fallback store when the primary is
/// empty or unavailable, and is then fixed for the lifetime of the normalizer.
pub struct CarrierNormalizer {
    primary: Box<dyn CarrierStore>,
    fallback: Option<Box<dyn CarrierStore>>,
    table: OnceLock<CarrierTable>,
}

impl CarrierNormalizer {
    pub fn new(primary: Box<dyn CarrierStore>, fallback: Option<Box<dyn CarrierStore>>) -> Self {
        Self {
            primary,
            fallback,
            table: OnceLock::new(),
        }
    }

    pub fn from_pairs<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(Box::new(InMemoryCarrierStore::new(entries)), None)
    }

    /// Returns the canonical name, or `raw` unchanged when nothing matches.
    pub fn normalize(&self, raw: &str) -> String {
        let key = raw.trim().to_lowercase();
        if key.is_empty() {
            return raw.to_string();
        }

        match self.table().lookup(&key) {
            Some(canonical) => canonical.to_string(),
            None => raw.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.table().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> &CarrierTable {
        self.table.get_or_init(|| {
            let mut pairs = load_from(self.primary.as_ref());
            if pairs.is_empty() {
                if let Some(fallback) = &self.fallback {
                    pairs = load_from(fallback.as_ref());
                }
            }
            let table = CarrierTable::from_pairs(pairs);
            debug!(entries = table.entries.len(), "carrier table loaded");
            table
        })
    }
}

fn load_from(store: &dyn CarrierStore) -> Vec<(String, String)> {
    match store.load_mappings() {
        Ok(pairs) => pairs,
        Err(error) => {
            warn!(store = store.name(), %error, "carrier mapping source unavailable");
            Vec::new()
        }
    }
}
