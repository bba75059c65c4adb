use serde::Serialize;
use serde_json::{Map, Value};

use crate::sticker::{StickerContent, TELEGRAM_STICKER_FIELD};

pub const TO_WIDGET: &str = "toWidget";
pub const FROM_WIDGET: &str = "fromWidget";

pub const ACTION_VISIBILITY: &str = "visibility";
pub const ACTION_CAPABILITIES: &str = "capabilities";
pub const ACTION_STICKER: &str = "m.sticker";
pub const ACTION_ROOM_MESSAGE: &str = "m.room.message";

pub const CAPABILITY_STICKER: &str = "m.sticker";
pub const CAPABILITY_UPLOAD_FILE: &str = "org.matrix.msc4039.upload_file";

pub const UNSUPPORTED_ACTION_MESSAGE: &str = "Action not supported";

#[derive(Debug, Clone, PartialEq)]
pub struct ToWidgetRequest {
    pub request_id: String,
    pub widget_id: String,
    pub action: String,
    raw: Map<String, Value>,
}

impl ToWidgetRequest {
    pub fn parse(message: &Value) -> Option<Self> {
        let object = message.as_object()?;
        if object.get("api").and_then(Value::as_str) != Some(TO_WIDGET) {
            return None;
        }
        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            request_id: field("requestId")?,
            widget_id: field("widgetId")?,
            action: field("action")?,
            raw: object.clone(),
        })
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WidgetResponse {
    Capabilities { capabilities: Vec<String> },
    Error { error: ResponseError },
    Empty {},
}

impl WidgetResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: ResponseError {
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    pub message: String,
}

/// The request object with a `response` field added.
pub fn build_response(request: &ToWidgetRequest, result: &WidgetResponse) -> Value {
    let mut reply = request.raw.clone();
    let response = serde_json::to_value(result).unwrap_or_else(|_| Value::Object(Map::new()));
    reply.insert("response".to_string(), response);
    Value::Object(reply)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePayload {
    pub content: Map<String, Value>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msgtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IosWidgetData {
    #[serde(flatten)]
    pub payload: MessagePayload,
    pub description: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FromWidgetNotification {
    pub api: &'static str,
    pub action: &'static str,
    pub request_id: String,
    pub widget_id: Option<String>,
    pub data: MessagePayload,
    pub widget_data: IosWidgetData,
}

impl FromWidgetNotification {
    pub fn sticker(
        content: &StickerContent,
        request_id: String,
        widget_id: Option<String>,
    ) -> serde_json::Result<Self> {
        Self::build(ACTION_STICKER, None, content, request_id, widget_id)
    }

    pub fn image(
        content: &StickerContent,
        request_id: String,
        widget_id: Option<String>,
    ) -> serde_json::Result<Self> {
        Self::build(
            ACTION_ROOM_MESSAGE,
            Some("m.image".to_string()),
            content,
            request_id,
            widget_id,
        )
    }

    fn build(
        action: &'static str,
        msgtype: Option<String>,
        content: &StickerContent,
        request_id: String,
        widget_id: Option<String>,
    ) -> serde_json::Result<Self> {
        let mut wire_content = match serde_json::to_value(content)? {
            Value::Object(object) => object,
            _ => Map::new(),
        };
        // The id is local bookkeeping and never goes over the wire.
        wire_content.remove("id");

        let data = MessagePayload {
            content: wire_content,
            name: content.body.clone(),
            msgtype,
        };
        let mut ios_payload = data.clone();
        ios_payload.content.remove(TELEGRAM_STICKER_FIELD);

        Ok(Self {
            api: FROM_WIDGET,
            action,
            request_id,
            widget_id,
            data,
            widget_data: IosWidgetData {
                payload: ios_payload,
                description: content.body.clone(),
                file: file_name(content),
            },
        })
    }
}

fn file_name(content: &StickerContent) -> String {
    if let Some(name) = content.explicit_filename() {
        return name.to_string();
    }
    let stem = content
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| content.telegram_id())
        .unwrap_or_else(|| "sticker".to_string());
    format!("{stem}.png")
}
