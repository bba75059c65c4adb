mod directory;
mod http;

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use stickerpicker_core::{Pack, PackIndex, StickerContent};
use tracing::{info, warn};

pub use directory::DirectorySource;
pub use http::HttpSource;

pub const INDEX_FILE: &str = "index.json";

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Raw bytes at `location` (relative to the base, or an absolute URL),
    /// `None` when it does not exist.
    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>>;

    fn describe(&self) -> String;
}

pub fn source_for(base: &str) -> Result<Box<dyn CatalogSource>> {
    if is_http_url(base) {
        Ok(Box::new(HttpSource::new(base)?))
    } else {
        Ok(Box::new(DirectorySource::new(base)))
    }
}

pub(crate) fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub homeserver_url: String,
    pub packs: Vec<Pack>,
}

impl Catalog {
    pub fn empty(homeserver_url: impl Into<String>) -> Self {
        Self {
            homeserver_url: homeserver_url.into(),
            packs: Vec::new(),
        }
    }

    pub fn sticker_ids(&self) -> HashSet<String> {
        self.packs
            .iter()
            .flat_map(|pack| pack.sticker_ids())
            .map(str::to_string)
            .collect()
    }

    pub fn sticker_count(&self) -> usize {
        self.packs.iter().map(|pack| pack.stickers.len()).sum()
    }

    pub fn find(&self, id: &str) -> Option<&StickerContent> {
        self.packs
            .iter()
            .flat_map(|pack| pack.stickers.iter())
            .find(|sticker| sticker.id.as_deref() == Some(id))
    }

    /// Stickers whose caption contains `query`, ignoring case, in pack order.
    pub fn search(&self, query: &str) -> Vec<StickerContent> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.packs
            .iter()
            .flat_map(|pack| pack.stickers.iter())
            .filter(|sticker| sticker.body.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// 128px scaled thumbnail of an `mxc://` URL on the catalog's homeserver.
    pub fn thumbnail_url(&self, mxc: &str) -> Option<String> {
        let media = mxc.strip_prefix("mxc://")?;
        Some(format!(
            "{}/_matrix/media/r0/thumbnail/{media}?height=128&width=128&method=scale",
            self.homeserver_url.trim_end_matches('/')
        ))
    }
}

pub async fn load_catalog(source: &dyn CatalogSource, default_homeserver: &str) -> Result<Catalog> {
    let Some(raw_index) = source
        .fetch(INDEX_FILE)
        .await
        .with_context(|| format!("failed to fetch {INDEX_FILE} from {}", source.describe()))?
    else {
        info!(source = %source.describe(), "no pack index found");
        return Ok(Catalog::empty(default_homeserver));
    };
    let index: PackIndex = serde_json::from_slice(&raw_index)
        .with_context(|| format!("failed to parse {INDEX_FILE} from {}", source.describe()))?;

    let mut catalog = Catalog::empty(
        index
            .homeserver_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| default_homeserver.to_string()),
    );
    for location in &index.packs {
        match load_pack(source, location).await {
            Ok(Some(pack)) => catalog.packs.push(pack),
            Ok(None) => warn!(pack = %location, "pack listed in index is missing"),
            Err(error) => warn!(pack = %location, "skipping pack: {error:#}"),
        }
    }
    info!(
        source = %source.describe(),
        packs = catalog.packs.len(),
        stickers = catalog.sticker_count(),
        "loaded sticker catalog"
    );
    Ok(catalog)
}

async fn load_pack(source: &dyn CatalogSource, location: &str) -> Result<Option<Pack>> {
    let Some(raw) = source.fetch(location).await? else {
        return Ok(None);
    };
    let pack = serde_json::from_slice(&raw).context("invalid pack JSON")?;
    Ok(Some(pack))
}
