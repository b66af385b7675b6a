//! Inbound message model.

/// A message pushed to the webhook by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WechatMessage {
    /// Sender open id
    pub from_user: String,
    /// Official account id
    pub to_user: String,
    /// Platform timestamp (seconds)
    pub create_time: i64,
    /// Platform message id; events carry none
    pub msg_id: Option<String>,
    /// Type-specific payload
    pub body: MessageBody,
}

/// Type-specific message payload, keyed on `MsgType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// `text`
    Text {
        /// User text
        content: String,
    },
    /// `image`
    Image {
        /// Picture URL on the platform CDN
        pic_url: String,
        /// Media id
        media_id: String,
    },
    /// `voice`
    Voice {
        /// Media id
        media_id: String,
        /// Audio format, e.g. `amr`
        format: Option<String>,
        /// Speech recognition result, when enabled on the account
        recognition: Option<String>,
    },
    /// `video` and `shortvideo`
    Video {
        /// Media id
        media_id: String,
        /// Thumbnail media id
        thumb_media_id: String,
        /// Whether this was a `shortvideo`
        short: bool,
    },
    /// `location`
    Location {
        /// Latitude
        location_x: String,
        /// Longitude
        location_y: String,
        /// Map zoom
        scale: String,
        /// Place label
        label: String,
    },
    /// `link`
    Link {
        /// Link title
        title: String,
        /// Link description
        description: String,
        /// Target URL
        url: String,
    },
    /// `event`
    Event {
        /// Event name, e.g. `subscribe`
        event: String,
        /// Event key, if any
        event_key: Option<String>,
    },
    /// Any type this bridge does not model
    Unknown {
        /// Raw `MsgType`
        msg_type: String,
    },
}

impl WechatMessage {
    /// The wire `MsgType` of this message.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        match &self.body {
            MessageBody::Text { .. } => "text",
            MessageBody::Image { .. } => "image",
            MessageBody::Voice { .. } => "voice",
            MessageBody::Video { short: false, .. } => "video",
            MessageBody::Video { short: true, .. } => "shortvideo",
            MessageBody::Location { .. } => "location",
            MessageBody::Link { .. } => "link",
            MessageBody::Event { .. } => "event",
            MessageBody::Unknown { msg_type } => msg_type,
        }
    }

    /// Correlation key used by the retry machinery. Empty when the platform sent none.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        self.msg_id.as_deref().unwrap_or("")
    }

    /// Text content for text messages, `event:{name}:{key}` for events.
    #[must_use]
    pub fn content(&self) -> Option<String> {
        match &self.body {
            MessageBody::Text { content } => Some(content.clone()),
            MessageBody::Event { event, event_key } => Some(format!(
                "event:{event}:{}",
                event_key.as_deref().unwrap_or("")
            )),
            _ => None,
        }
    }

    /// Whether this is a plain text message whose content equals `command`.
    #[must_use]
    pub fn is_text_command(&self, command: &str) -> bool {
        matches!(&self.body, MessageBody::Text { content } if content == command)
    }
}
