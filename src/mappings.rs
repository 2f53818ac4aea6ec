use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mapping file i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mapping file parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// In-memory projection of the channel mapping set. `reverse` is the exact
/// functional inverse of `forward` at all times.
#[derive(Debug, Clone, Default)]
pub struct ChannelIndexes {
    pub forward: HashMap<String, String>,
    pub reverse: HashMap<String, String>,
}

impl ChannelIndexes {
    /// Builds both indexes from (discord id, stoat id) pairs. A stoat id
    /// appearing twice keeps only the later pair, so hand-edited files
    /// converge to the same 1:1 invariant `add` enforces.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut indexes = Self::default();
        for (discord_id, stoat_id) in pairs {
            indexes.insert(discord_id, stoat_id);
        }
        indexes
    }

    fn insert(&mut self, discord_id: String, stoat_id: String) {
        if let Some(previous_discord) = self.reverse.get(&stoat_id).cloned() {
            self.forward.remove(&previous_discord);
        }
        if let Some(previous_stoat) = self.forward.insert(discord_id.clone(), stoat_id.clone()) {
            self.reverse.remove(&previous_stoat);
        }
        self.reverse.insert(stoat_id, discord_id);
    }

    pub fn stoat_for_discord(&self, discord_id: &str) -> Option<&str> {
        self.forward.get(discord_id).map(String::as_str)
    }

    pub fn discord_for_stoat(&self, stoat_id: &str) -> Option<&str> {
        self.reverse.get(stoat_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Channel mapping store backed by a flat YAML file of
/// `discord channel id: stoat channel id` pairs. Every mutation rebuilds the
/// in-memory indexes and rewrites the file before returning.
pub struct ChannelMappingStore {
    path: PathBuf,
    indexes: RwLock<ChannelIndexes>,
}

impl ChannelMappingStore {
    /// Loads the store from `path`. A missing file is not an error: it is
    /// created empty so later mutations have somewhere to land.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let pairs = read_mapping_file(&path)?;
        let indexes = ChannelIndexes::from_pairs(pairs);
        debug!(
            "loaded {} channel mappings from {}",
            indexes.len(),
            path.display()
        );
        Ok(Self {
            path,
            indexes: RwLock::new(indexes),
        })
    }

    /// Re-reads the backing file, replacing the in-memory indexes.
    pub fn reload(&self) -> Result<(), StoreError> {
        let pairs = read_mapping_file(&self.path)?;
        *self.indexes.write() = ChannelIndexes::from_pairs(pairs);
        Ok(())
    }

    /// Adds or updates a mapping. Any existing mapping that already owns
    /// `stoat_id` is removed first, keeping the set 1:1 in both directions.
    pub fn add(&self, discord_id: &str, stoat_id: &str) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write();
        indexes.insert(discord_id.to_string(), stoat_id.to_string());
        write_mapping_file(&self.path, &indexes.forward)
    }

    /// Removes the mapping for `discord_id`, returning the stoat id it
    /// pointed at, if any.
    pub fn remove(&self, discord_id: &str) -> Result<Option<String>, StoreError> {
        let mut indexes = self.indexes.write();
        let Some(stoat_id) = indexes.forward.remove(discord_id) else {
            return Ok(None);
        };
        indexes.reverse.remove(&stoat_id);
        write_mapping_file(&self.path, &indexes.forward)?;
        Ok(Some(stoat_id))
    }

    pub fn stoat_for_discord(&self, discord_id: &str) -> Option<String> {
        self.indexes.read().forward.get(discord_id).cloned()
    }

    pub fn discord_for_stoat(&self, stoat_id: &str) -> Option<String> {
        self.indexes.read().reverse.get(stoat_id).cloned()
    }

    /// A point-in-time copy of both indexes, safe to use across await points.
    pub fn snapshot(&self) -> ChannelIndexes {
        self.indexes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }
}

fn read_mapping_file(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
    if !path.exists() {
        fs::write(path, "")?;
        return Ok(BTreeMap::new());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_yaml::from_str(&contents)?)
}

fn write_mapping_file(path: &Path, forward: &HashMap<String, String>) -> Result<(), StoreError> {
    // Sorted output keeps the file diffable under version control.
    let ordered: BTreeMap<&String, &String> = forward.iter().collect();
    let contents = serde_yaml::to_string(&ordered)?;
    fs::write(path, contents)?;
    Ok(())
}
