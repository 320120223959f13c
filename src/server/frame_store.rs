use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tracing::info;

use crate::{common::StoreError, configs::CatalogEntry, protocol::ResolutionTier};

pub type TierFrames = HashMap<ResolutionTier, Vec<Bytes>>;

/// Every title's frames at every tier, fully loaded before the listener starts.
///
/// Immutable once built; handlers share it behind an `Arc` and read without locking.
#[derive(Debug, Default)]
pub struct FrameStore {
    titles: HashMap<String, TierFrames>,
}

impl FrameStore {
    /// Loads each catalog entry's four tiers from their frame directories.
    pub fn load(catalog: &[CatalogEntry]) -> Result<Self, StoreError> {
        if catalog.is_empty() {
            return Err(StoreError::EmptyCatalog);
        }

        let mut titles = HashMap::with_capacity(catalog.len());
        for entry in catalog {
            let mut tiers = TierFrames::with_capacity(ResolutionTier::ALL.len());
            for tier in ResolutionTier::ALL {
                let dir = entry
                    .tiers
                    .get(tier.as_str())
                    .ok_or_else(|| StoreError::MissingTier {
                        title: entry.title.clone(),
                        tier,
                    })?;
                let frames = read_frame_dir(dir)?;
                if frames.is_empty() {
                    return Err(StoreError::Empty {
                        title: entry.title.clone(),
                        tier,
                        path: dir.clone(),
                    });
                }
                info!(
                    "loaded {} frames for {} at {} from {}",
                    frames.len(),
                    entry.title,
                    tier,
                    dir.display()
                );
                tiers.insert(tier, frames);
            }
            titles.insert(entry.title.clone(), tiers);
        }

        Ok(Self { titles })
    }

    /// Builds a store from frames already in memory.
    pub fn from_frames(titles: impl IntoIterator<Item = (String, TierFrames)>) -> Self {
        Self {
            titles: titles.into_iter().collect(),
        }
    }

    /// The blob at `index`, or `None` for an unknown title/tier or an index past the end.
    pub fn frame(&self, title: &str, tier: ResolutionTier, index: u64) -> Option<Bytes> {
        let index = usize::try_from(index).ok()?;
        self.titles.get(title)?.get(&tier)?.get(index).cloned()
    }

    pub fn frame_count(&self, title: &str, tier: ResolutionTier) -> Option<usize> {
        self.titles.get(title)?.get(&tier).map(Vec::len)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.titles.keys().map(String::as_str)
    }

    pub fn total_bytes(&self) -> usize {
        self.titles
            .values()
            .flat_map(|tiers| tiers.values())
            .flatten()
            .map(Bytes::len)
            .sum()
    }
}

/// Reads every visible regular file in `dir`, ordered by file name.
fn read_frame_dir(dir: &Path) -> Result<Vec<Bytes>, StoreError> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| StoreError::io(entry.path(), e))?;
        if file_type.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    paths
        .into_iter()
        .map(|path| {
            std::fs::read(&path)
                .map(Bytes::from)
                .map_err(|e| StoreError::io(path, e))
        })
        .collect()
}
