use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TELEGRAM_STICKER_FIELD: &str = "net.maunium.telegram.sticker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StickerContent {
    pub fn new(id: impl Into<String>, body: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            body: body.into(),
            url: url.into(),
            info: None,
            extra: Map::new(),
        }
    }

    /// Id of the upstream telegram sticker, for packs imported from telegram.
    pub fn telegram_id(&self) -> Option<String> {
        match self.extra.get(TELEGRAM_STICKER_FIELD)?.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn explicit_filename(&self) -> Option<&str> {
        self.extra
            .get("filename")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pack {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub stickers: Vec<StickerContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pack {
    pub fn sticker_ids(&self) -> impl Iterator<Item = &str> {
        self.stickers.iter().filter_map(|sticker| sticker.id.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homeserver_url: Option<String>,
    #[serde(default)]
    pub packs: Vec<String>,
}
