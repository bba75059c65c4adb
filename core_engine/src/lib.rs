pub mod clock;
pub mod frequency;
pub mod relay;
pub mod sticker;
pub mod sticker_cache;
pub mod storage;
pub mod widget_api;

pub use clock::{Clock, ManualClock, SystemClock};
pub use frequency::{FrequencyStore, UsageRecord, DEFAULT_TOP_LIMIT};
pub use relay::{Binding, HostChannel, WidgetRelay};
pub use sticker::{Pack, PackIndex, StickerContent};
pub use sticker_cache::StickerCache;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
