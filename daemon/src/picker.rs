use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use stickerpicker_core::{
    Clock, FrequencyStore, HostChannel, KeyValueStorage, StickerCache, StickerContent, WidgetRelay,
};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::control::{PackSummary, PacksResponse, StatusResponse, StickerView};

pub struct Picker<C> {
    frequency: FrequencyStore,
    stickers: StickerCache,
    catalog: Catalog,
    relay: WidgetRelay<C>,
    frequently_used_limit: usize,
}

impl<C: HostChannel> Picker<C> {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        relay: WidgetRelay<C>,
        homeserver_url: &str,
        frequently_used_limit: usize,
    ) -> Self {
        Self {
            frequency: FrequencyStore::load(storage.clone(), clock),
            stickers: StickerCache::load(storage),
            catalog: Catalog::empty(homeserver_url),
            relay,
            frequently_used_limit,
        }
    }

    pub fn apply_catalog(&mut self, catalog: Catalog) {
        for pack in &catalog.packs {
            self.stickers.insert_pack(pack);
        }
        // An empty catalog usually means the packs are unreachable, not that
        // every sticker was deleted.
        if catalog.packs.is_empty() {
            debug!("catalog is empty, keeping frequently used stickers");
        } else {
            let known = catalog.sticker_ids();
            let kept = self.frequency.reconcile_with_catalog(&known);
            debug!(kept = kept.len(), "reconciled frequently used stickers");
            // Kept ids are a subset of the catalog.
            self.stickers.retain(&known);
        }
        self.catalog = catalog;
        self.refresh_sticker_cache();
    }

    pub fn sticker(&self, id: &str) -> Option<StickerContent> {
        self.catalog
            .find(id)
            .or_else(|| self.stickers.get(id))
            .cloned()
    }

    pub fn send_sticker(&mut self, sticker: &StickerContent) -> Result<String> {
        if let Some(id) = sticker.id.as_deref() {
            self.frequency.record_use(id);
            self.stickers.insert(sticker.clone());
            self.refresh_sticker_cache();
        }
        let request_id = self.relay.send_sticker(sticker)?;
        info!(sticker = ?sticker.id, %request_id, "sent sticker");
        Ok(request_id)
    }

    pub fn send_image(&mut self, content: &StickerContent) -> Result<String> {
        let request_id = self.relay.send_image(content)?;
        info!(%request_id, "sent image");
        Ok(request_id)
    }

    pub fn frequently_used(&self, limit: Option<usize>) -> Vec<StickerView> {
        let ids = self
            .frequency
            .top_used(limit.unwrap_or(self.frequently_used_limit));
        self.stickers
            .resolve(&ids)
            .into_iter()
            .map(|sticker| self.view(sticker))
            .collect()
    }

    pub fn packs(&self) -> PacksResponse {
        PacksResponse {
            homeserver_url: self.catalog.homeserver_url.clone(),
            packs: self
                .catalog
                .packs
                .iter()
                .map(|pack| PackSummary {
                    id: pack.id.clone(),
                    title: pack.title.clone(),
                    stickers: pack
                        .stickers
                        .iter()
                        .cloned()
                        .map(|sticker| self.view(sticker))
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn search(&self, query: &str) -> Vec<StickerView> {
        self.catalog
            .search(query)
            .into_iter()
            .map(|sticker| self.view(sticker))
            .collect()
    }

    pub fn forget(&mut self, ids: &[String]) {
        self.frequency.remove_many(ids);
        self.refresh_sticker_cache();
    }

    pub fn forget_all(&mut self) {
        self.frequency.remove_all();
        self.refresh_sticker_cache();
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            widget_id: self.relay.widget_id().map(str::to_string),
            capabilities: self.relay.capabilities().to_vec(),
            homeserver_url: self.catalog.homeserver_url.clone(),
            packs: self.catalog.packs.len(),
            stickers: self.catalog.sticker_count(),
            frequently_used: self.frequency.len(),
        }
    }

    pub fn handle_host_message(&mut self, message: &Value) -> Option<Value> {
        self.relay.handle_message(message)
    }

    fn refresh_sticker_cache(&self) {
        let ids = self.frequency.top_used(self.frequently_used_limit);
        self.stickers.persist(&ids);
    }

    fn view(&self, sticker: StickerContent) -> StickerView {
        StickerView {
            thumbnail_url: self.catalog.thumbnail_url(&sticker.url),
            sticker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::sync::Mutex;
    use stickerpicker_core::{ManualClock, MemoryStorage, Pack};

    #[derive(Default, Clone)]
    struct RecordingChannel {
        posted: Arc<Mutex<Vec<Value>>>,
    }

    impl HostChannel for RecordingChannel {
        fn post(&self, message: Value) {
            self.posted.lock().unwrap().push(message);
        }
    }

    fn catalog(ids: &[&str]) -> Catalog {
        Catalog {
            homeserver_url: "https://hs.example.com".to_string(),
            packs: vec![Pack {
                id: "pack".to_string(),
                title: "Pack".to_string(),
                stickers: ids
                    .iter()
                    .map(|id| {
                        StickerContent::new(*id, format!("sticker {id}"), format!("mxc://hs.example.com/{id}"))
                    })
                    .collect(),
                extra: Map::new(),
            }],
        }
    }

    fn picker(
        storage: Arc<MemoryStorage>,
        clock: Arc<ManualClock>,
    ) -> (Picker<RecordingChannel>, RecordingChannel) {
        let channel = RecordingChannel::default();
        let relay = WidgetRelay::new(channel.clone(), clock.clone());
        let picker = Picker::new(storage, clock, relay, "https://matrix-client.matrix.org", 16);
        (picker, channel)
    }

    #[test]
    fn sending_records_use_and_notifies_host() {
        let clock = Arc::new(ManualClock::new(100));
        let (mut picker, channel) = picker(Arc::new(MemoryStorage::new()), clock.clone());
        picker.apply_catalog(catalog(&["a", "b"]));

        let sticker = picker.sticker("b").unwrap();
        let request_id = picker.send_sticker(&sticker).unwrap();
        assert_eq!(request_id, "sticker-100");

        let posted = channel.posted.lock().unwrap().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["data"]["name"], "sticker b");
        assert!(posted[0]["data"]["content"].get("id").is_none());

        let frequent = picker.frequently_used(None);
        assert_eq!(frequent.len(), 1);
        assert_eq!(frequent[0].sticker.id.as_deref(), Some("b"));
        assert_eq!(
            frequent[0].thumbnail_url.as_deref(),
            Some("https://hs.example.com/_matrix/media/r0/thumbnail/hs.example.com/b?height=128&width=128&method=scale")
        );
    }

    #[test]
    fn frequently_used_survives_restart_without_catalog() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(0));
        {
            let (mut picker, _) = picker(storage.clone(), clock.clone());
            picker.apply_catalog(catalog(&["a", "b"]));
            for id in ["a", "b", "b"] {
                clock.advance(1);
                let sticker = picker.sticker(id).unwrap();
                picker.send_sticker(&sticker).unwrap();
            }
        }

        let (restarted, _) = picker(storage, clock);
        let ids: Vec<String> = restarted
            .frequently_used(None)
            .into_iter()
            .filter_map(|view| view.sticker.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(restarted.sticker("a").is_some());
    }

    #[test]
    fn catalog_reload_prunes_removed_stickers() {
        let clock = Arc::new(ManualClock::new(0));
        let (mut picker, _) = picker(Arc::new(MemoryStorage::new()), clock);
        picker.apply_catalog(catalog(&["a", "b", "c"]));
        for id in ["a", "b", "c"] {
            let sticker = picker.sticker(id).unwrap();
            picker.send_sticker(&sticker).unwrap();
        }

        picker.apply_catalog(catalog(&["a", "c"]));
        assert_eq!(picker.status().frequently_used, 2);

        picker.apply_catalog(Catalog::empty("https://hs.example.com"));
        assert_eq!(picker.status().frequently_used, 2);
    }

    #[test]
    fn removed_sticker_is_not_sendable_after_reload() {
        let clock = Arc::new(ManualClock::new(0));
        let (mut picker, _) = picker(Arc::new(MemoryStorage::new()), clock);
        picker.apply_catalog(catalog(&["a", "b"]));
        let sticker = picker.sticker("b").unwrap();
        picker.send_sticker(&sticker).unwrap();

        picker.apply_catalog(catalog(&["a"]));

        assert!(picker.sticker("b").is_none());
        assert!(picker.sticker("a").is_some());
        assert!(picker.frequently_used(None).is_empty());
    }

    #[test]
    fn forget_clears_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let (mut picker, _) = picker(Arc::new(MemoryStorage::new()), clock);
        picker.apply_catalog(catalog(&["a", "b"]));
        for id in ["a", "b"] {
            let sticker = picker.sticker(id).unwrap();
            picker.send_sticker(&sticker).unwrap();
        }

        picker.forget(&["a".to_string()]);
        assert_eq!(picker.frequently_used(None).len(), 1);
        picker.forget_all();
        assert!(picker.frequently_used(None).is_empty());
    }

    #[test]
    fn host_messages_reach_relay() {
        let clock = Arc::new(ManualClock::new(0));
        let (mut picker, _) = picker(Arc::new(MemoryStorage::new()), clock);
        let reply = picker
            .handle_host_message(&json!({
                "api": "toWidget",
                "requestId": "1",
                "widgetId": "W1",
                "action": "capabilities"
            }))
            .unwrap();
        assert_eq!(reply["response"]["capabilities"], json!(["m.sticker"]));
        assert_eq!(picker.status().widget_id.as_deref(), Some("W1"));
    }
}
