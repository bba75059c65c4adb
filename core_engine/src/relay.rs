use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::sticker::StickerContent;
use crate::widget_api::{
    build_response, FromWidgetNotification, ToWidgetRequest, WidgetResponse, ACTION_CAPABILITIES,
    ACTION_VISIBILITY, CAPABILITY_STICKER, CAPABILITY_UPLOAD_FILE, UNSUPPORTED_ACTION_MESSAGE,
};

/// Outbound side of the embedding frame. Posting never reports delivery.
pub trait HostChannel: Send {
    fn post(&self, message: Value);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Bound(String),
}

pub struct WidgetRelay<C> {
    binding: Binding,
    capabilities: Vec<String>,
    channel: C,
    clock: Arc<dyn Clock>,
}

impl<C: HostChannel> WidgetRelay<C> {
    pub fn new(channel: C, clock: Arc<dyn Clock>) -> Self {
        Self {
            binding: Binding::Unbound,
            capabilities: vec![CAPABILITY_STICKER.to_string()],
            channel,
            clock,
        }
    }

    /// Starts bound, for hosts that pass the widget id out of band.
    pub fn bound_to(mut self, widget_id: impl Into<String>) -> Self {
        self.binding = Binding::Bound(widget_id.into());
        self
    }

    pub fn with_upload_capability(mut self, enabled: bool) -> Self {
        let has = self.capabilities.iter().any(|c| c == CAPABILITY_UPLOAD_FILE);
        if enabled && !has {
            self.capabilities.push(CAPABILITY_UPLOAD_FILE.to_string());
        } else if !enabled && has {
            self.capabilities.retain(|c| c != CAPABILITY_UPLOAD_FILE);
        }
        self
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn widget_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Bound(id) => Some(id),
            Binding::Unbound => None,
        }
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// `None` when the message is not a request for this widget.
    pub fn handle_message(&mut self, message: &Value) -> Option<Value> {
        let Some(request) = ToWidgetRequest::parse(message) else {
            debug!("ignoring message that is not a toWidget request");
            return None;
        };

        if let Binding::Bound(widget_id) = &self.binding {
            if *widget_id != request.widget_id {
                debug!(
                    bound = %widget_id,
                    received = %request.widget_id,
                    "ignoring request for another widget"
                );
                return None;
            }
        } else {
            info!(widget_id = %request.widget_id, "bound widget session");
            self.binding = Binding::Bound(request.widget_id.clone());
        }

        let result = match request.action.as_str() {
            ACTION_VISIBILITY => WidgetResponse::Empty {},
            ACTION_CAPABILITIES => WidgetResponse::Capabilities {
                capabilities: self.capabilities.clone(),
            },
            other => {
                debug!(action = other, "unsupported widget action");
                WidgetResponse::error(UNSUPPORTED_ACTION_MESSAGE)
            }
        };
        Some(build_response(&request, &result))
    }

    /// Posts an `m.sticker` notification and returns its request id.
    pub fn send_sticker(&self, content: &StickerContent) -> Result<String> {
        let request_id = format!("sticker-{}", self.clock.now_ms());
        let notification = FromWidgetNotification::sticker(
            content,
            request_id.clone(),
            self.widget_id().map(str::to_string),
        )
        .context("failed to build sticker payload")?;
        self.post(&notification)?;
        Ok(request_id)
    }

    pub fn send_image(&self, content: &StickerContent) -> Result<String> {
        let request_id = format!("gif-{}", self.clock.now_ms());
        let notification = FromWidgetNotification::image(
            content,
            request_id.clone(),
            self.widget_id().map(str::to_string),
        )
        .context("failed to build image payload")?;
        self.post(&notification)?;
        Ok(request_id)
    }

    fn post(&self, notification: &FromWidgetNotification) -> Result<()> {
        let message =
            serde_json::to_value(notification).context("failed to encode widget notification")?;
        debug!(
            action = notification.action,
            request_id = %notification.request_id,
            "posting notification to host"
        );
        self.channel.post(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    struct RecordingChannel {
        posted: Arc<Mutex<Vec<Value>>>,
    }

    impl RecordingChannel {
        fn posted(&self) -> Vec<Value> {
            self.posted.lock().unwrap().clone()
        }
    }

    impl HostChannel for RecordingChannel {
        fn post(&self, message: Value) {
            self.posted.lock().unwrap().push(message);
        }
    }

    fn relay() -> WidgetRelay<RecordingChannel> {
        WidgetRelay::new(RecordingChannel::default(), Arc::new(ManualClock::new(1_700_000_000_000)))
    }

    fn request(widget_id: &str, action: &str) -> Value {
        json!({
            "api": "toWidget",
            "requestId": format!("req-{action}"),
            "widgetId": widget_id,
            "action": action,
            "data": {}
        })
    }

    #[test]
    fn malformed_messages_get_no_reply() {
        let mut relay = relay();
        let complete = request("W1", "capabilities");
        for field in ["requestId", "widgetId", "action", "api"] {
            let mut message = complete.clone();
            message.as_object_mut().unwrap().remove(field);
            assert!(relay.handle_message(&message).is_none(), "missing {field}");
        }
        assert!(relay.handle_message(&json!(null)).is_none());
        assert_eq!(relay.binding(), &Binding::Unbound);
    }

    #[test]
    fn binds_to_first_widget_and_ignores_others() {
        let mut relay = relay();
        assert!(relay.handle_message(&request("W1", "visibility")).is_some());
        assert_eq!(relay.binding(), &Binding::Bound("W1".to_string()));

        assert!(relay.handle_message(&request("W2", "capabilities")).is_none());
        assert_eq!(relay.widget_id(), Some("W1"));
        assert!(relay.handle_message(&request("W1", "capabilities")).is_some());
    }

    #[test]
    fn preset_binding_rejects_other_widgets() {
        let mut relay = relay().bound_to("W9");
        assert!(relay.handle_message(&request("W1", "visibility")).is_none());
        assert!(relay.handle_message(&request("W9", "visibility")).is_some());
    }

    #[test]
    fn answers_known_actions() {
        let mut relay = relay();

        let visibility = relay.handle_message(&request("W1", "visibility")).unwrap();
        assert_eq!(visibility["response"], json!({}));
        assert_eq!(visibility["requestId"], "req-visibility");

        let capabilities = relay.handle_message(&request("W1", "capabilities")).unwrap();
        let declared = capabilities["response"]["capabilities"].as_array().unwrap();
        assert!(declared.contains(&json!("m.sticker")));
        assert!(!declared.contains(&json!(CAPABILITY_UPLOAD_FILE)));
    }

    #[test]
    fn upload_capability_is_optional() {
        let mut relay = relay().with_upload_capability(true);
        let reply = relay.handle_message(&request("W1", "capabilities")).unwrap();
        assert_eq!(
            reply["response"]["capabilities"],
            json!(["m.sticker", "org.matrix.msc4039.upload_file"])
        );
    }

    #[test]
    fn unknown_action_is_an_error_response() {
        let mut relay = relay();
        let reply = relay.handle_message(&request("W1", "frobnicate")).unwrap();
        let message = reply["response"]["error"]["message"].as_str().unwrap();
        assert!(!message.is_empty());
        assert_eq!(reply["action"], "frobnicate");
    }

    #[test]
    fn send_sticker_strips_id_and_sets_name() {
        let mut relay = relay();
        relay.handle_message(&request("W1", "visibility"));

        let sticker: StickerContent =
            serde_json::from_value(json!({"id": "abc", "body": "cat", "url": "mxc://x"})).unwrap();
        let request_id = relay.send_sticker(&sticker).unwrap();
        assert_eq!(request_id, "sticker-1700000000000");

        let posted = relay.channel().posted();
        assert_eq!(posted.len(), 1);
        let message = &posted[0];
        assert_eq!(message["api"], "fromWidget");
        assert_eq!(message["action"], "m.sticker");
        assert_eq!(message["requestId"], "sticker-1700000000000");
        assert_eq!(message["widgetId"], "W1");
        assert!(message["data"]["content"].get("id").is_none());
        assert_eq!(message["data"]["content"]["url"], "mxc://x");
        assert_eq!(message["data"]["name"], "cat");
        assert_eq!(message["widgetData"]["file"], "abc.png");
    }

    #[test]
    fn send_image_uses_room_message() {
        let relay = relay();
        let gif = StickerContent::new("g1", "dancing", "mxc://giphy/g1");
        let request_id = relay.send_image(&gif).unwrap();
        assert!(request_id.starts_with("gif-"));

        let message = &relay.channel().posted()[0];
        assert_eq!(message["action"], "m.room.message");
        assert_eq!(message["data"]["msgtype"], "m.image");
        assert_eq!(message["widgetId"], Value::Null);
    }
}
