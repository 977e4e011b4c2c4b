use crate::error::DtsError;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, remove_file, write},
    path::{Path, PathBuf},
};
use url::Url;

/// Work-state reason recorded for URIs still on the frontier when a crawl ends.
pub const NOT_YET_ANALYSED: &str = "Document has not yet been analysed";

/// Behavior switches for a [crate::codec::DiscoveryCrawler].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Follow `xsi:schemaLocation` hints as well as links and imports
    pub use_schema_locations: bool,
    /// Materialize relationships for newly discovered documents after the crawl
    pub persist_relationships: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        CrawlConfig {
            use_schema_locations: false,
            persist_relationships: true,
        }
    }
}

/// Configuration file read by the `dts` binary.
///
/// ```toml
/// seeds = ["https://www.example.com/taxonomy/entry.xsd"]
/// work_state = "dts-work.toml"
/// snapshot = "dts-store.json"
/// mirror = "cache"
///
/// [crawl]
/// use_schema_locations = true
/// persist_relationships = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtsConfig {
    pub seeds: Vec<String>,
    pub work_state: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
    /// Directory holding local copies of remote documents, laid out as `<host>/<path>`
    pub mirror: Option<PathBuf>,
    pub crawl: CrawlConfig,
}

impl DtsConfig {
    pub fn from_toml_str(content: &str) -> Result<DtsConfig, DtsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<DtsConfig, DtsError> {
        tracing::debug!("Reading config from {:?}", path.as_ref());
        DtsConfig::from_toml_str(&read_to_string(path)?)
    }
}

/// Persistence of the pending-work map (URI to reason) between runs.
pub trait WorkStateProvider: Send + Sync {
    fn load(&self) -> Result<BTreeMap<Url, String>, DtsError>;
    fn save(&self, pending: &BTreeMap<Url, String>) -> Result<(), DtsError>;
    fn clear(&self) -> Result<(), DtsError>;
}

/// Keeps the work state in a TOML file under a `pending` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkStateFile {
    path: PathBuf,
}

impl WorkStateFile {
    pub fn new(path: PathBuf) -> Self {
        WorkStateFile { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkStateProvider for WorkStateFile {
    fn load(&self) -> Result<BTreeMap<Url, String>, DtsError> {
        tracing::debug!("Attempting to read work state from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Work state file not found, nothing to resume.");
            return Ok(BTreeMap::new());
        }
        let content = read_to_string(&self.path)?;
        let file: BTreeMap<String, BTreeMap<String, String>> = toml::from_str(&content)?;
        let Some(pending) = file.get("pending") else {
            return Ok(BTreeMap::new());
        };
        let mut work = BTreeMap::new();
        for (uri, reason) in pending.iter() {
            work.insert(Url::parse(uri)?, reason.clone());
        }
        Ok(work)
    }

    fn save(&self, pending: &BTreeMap<Url, String>) -> Result<(), DtsError> {
        tracing::debug!("Attempting to write work state to: {:?}", &self.path);
        let mut file = BTreeMap::new();
        file.insert(
            "pending".to_string(),
            pending
                .iter()
                .map(|(uri, reason)| (uri.to_string(), reason.clone()))
                .collect::<BTreeMap<String, String>>(),
        );
        write(&self.path, toml::to_string(&file)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), DtsError> {
        if self.path.exists() {
            remove_file(&self.path)?;
        }
        Ok(())
    }
}
