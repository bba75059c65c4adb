use serde::{Deserialize, Serialize};
use stickerpicker_core::StickerContent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    Ping,
    Status,
    Packs,
    FrequentlyUsed {
        #[serde(default)]
        limit: Option<usize>,
    },
    Search {
        query: String,
    },
    SendSticker {
        sticker_id: String,
    },
    SendImage {
        content: StickerContent,
    },
    Forget {
        sticker_ids: Vec<String>,
    },
    ForgetAll,
    ReloadPacks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    Pong,
    Status(StatusResponse),
    Packs(PacksResponse),
    Stickers(StickersResponse),
    Sent(SentResponse),
    Ok,
    Error(ErrorResponse),
}

impl ResponseBody {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    UnknownSticker,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub widget_id: Option<String>,
    pub capabilities: Vec<String>,
    pub homeserver_url: String,
    pub packs: usize,
    pub stickers: usize,
    pub frequently_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacksResponse {
    pub homeserver_url: String,
    pub packs: Vec<PackSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackSummary {
    pub id: String,
    pub title: String,
    pub stickers: Vec<StickerView>,
}

/// A sticker plus the thumbnail URL the UI should render it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickerView {
    #[serde(flatten)]
    pub sticker: StickerContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickersResponse {
    pub stickers: Vec<StickerView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentResponse {
    pub request_id: String,
}
