use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::sticker::{Pack, StickerContent};
use crate::storage::KeyValueStorage;

pub const STICKER_CACHE_KEY: &str = "mauFrequentlyUsedStickerCache";

pub struct StickerCache {
    by_id: HashMap<String, StickerContent>,
    storage: Arc<dyn KeyValueStorage>,
}

impl StickerCache {
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let mut by_id = HashMap::new();
        match storage.get(STICKER_CACHE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<(String, StickerContent)>>(&raw) {
                Ok(pairs) => by_id.extend(pairs),
                Err(error) => warn!("discarding unreadable sticker cache: {error}"),
            },
            Ok(None) => {}
            Err(error) => warn!("failed to read sticker cache: {error:#}"),
        }
        Self { by_id, storage }
    }

    pub fn insert(&mut self, sticker: StickerContent) {
        if let Some(id) = sticker.id.clone() {
            self.by_id.insert(id, sticker);
        }
    }

    pub fn insert_pack(&mut self, pack: &Pack) {
        for sticker in &pack.stickers {
            self.insert(sticker.clone());
        }
    }

    pub fn retain(&mut self, ids: &HashSet<String>) {
        self.by_id.retain(|id, _| ids.contains(id));
    }

    pub fn get(&self, id: &str) -> Option<&StickerContent> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Stickers for `ids` in the given order; unknown ids are skipped.
    pub fn resolve(&self, ids: &[String]) -> Vec<StickerContent> {
        ids.iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    pub fn persist(&self, ids: &[String]) {
        let pairs: Vec<(&String, &StickerContent)> = ids
            .iter()
            .filter_map(|id| self.by_id.get_key_value(id))
            .collect();
        let payload = match serde_json::to_string(&pairs) {
            Ok(payload) => payload,
            Err(error) => {
                warn!("failed to encode sticker cache: {error}");
                return;
            }
        };
        if let Err(error) = self.storage.set(STICKER_CACHE_KEY, &payload) {
            warn!("failed to persist sticker cache: {error:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::Map;

    fn pack() -> Pack {
        Pack {
            id: "cats".to_string(),
            title: "Cats".to_string(),
            stickers: vec![
                StickerContent::new("c1", "happy cat", "mxc://example.com/c1"),
                StickerContent::new("c2", "sad cat", "mxc://example.com/c2"),
                StickerContent::new("c3", "cat loaf", "mxc://example.com/c3"),
            ],
            extra: Map::new(),
        }
    }

    #[test]
    fn persists_only_requested_ids() {
        let storage = Arc::new(MemoryStorage::new());
        let mut cache = StickerCache::load(storage.clone());
        cache.insert_pack(&pack());
        assert_eq!(cache.len(), 3);

        cache.persist(&["c3".to_string(), "missing".to_string(), "c1".to_string()]);

        let reloaded = StickerCache::load(storage);
        assert_eq!(reloaded.len(), 2);
        let resolved = reloaded.resolve(&["c1".to_string(), "c2".to_string(), "c3".to_string()]);
        let bodies: Vec<&str> = resolved.iter().map(|s| s.body.as_str()).collect();
        assert_eq!(bodies, vec!["happy cat", "cat loaf"]);
    }

    #[test]
    fn stored_as_id_sticker_pairs() {
        let storage = Arc::new(MemoryStorage::new());
        let mut cache = StickerCache::load(storage.clone());
        cache.insert(StickerContent::new("c1", "cat", "mxc://x/1"));
        cache.persist(&["c1".to_string()]);

        let raw = storage.get(STICKER_CACHE_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0][0], "c1");
        assert_eq!(value[0][1]["body"], "cat");
        assert_eq!(value[0][1]["url"], "mxc://x/1");
    }

    #[test]
    fn retain_drops_unlisted_stickers() {
        let mut cache = StickerCache::load(Arc::new(MemoryStorage::new()));
        cache.insert_pack(&pack());

        let keep: HashSet<String> = ["c2".to_string(), "gone".to_string()].into_iter().collect();
        cache.retain(&keep);

        assert_eq!(cache.len(), 1);
        assert!(cache.get("c1").is_none());
        assert_eq!(cache.get("c2").map(|s| s.body.as_str()), Some("sad cat"));
    }

    #[test]
    fn ignores_stickers_without_id() {
        let mut cache = StickerCache::load(Arc::new(MemoryStorage::new()));
        let mut sticker = StickerContent::new("x", "anon", "mxc://x/2");
        sticker.id = None;
        cache.insert(sticker);
        assert!(cache.is_empty());
    }
}
