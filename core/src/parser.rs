//! XML message parsing.
//!
//! Platform payloads are flat `<xml>` documents with one element per field,
//! values either plain text or wrapped in a CDATA section. That shape is
//! narrow enough that a tag scanner is all this needs.

use crate::error::ParseError;
use crate::message::{MessageBody, WechatMessage};

/// Parse a plaintext message document.
///
/// # Errors
///
/// Returns [`ParseError`] if the body is empty, a required element is
/// missing, or `CreateTime` is not numeric.
pub fn parse_xml(raw: &str) -> Result<WechatMessage, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let msg_type = required(raw, "MsgType")?;
    let from_user = required(raw, "FromUserName")?;
    let to_user = required(raw, "ToUserName")?;
    let create_time_raw = required(raw, "CreateTime")?;
    let create_time = create_time_raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidNumber {
            element: "CreateTime",
            value: create_time_raw.clone(),
        })?;
    let msg_id = element_text(raw, "MsgId").filter(|id| !id.is_empty());

    let body = match msg_type.as_str() {
        "text" => MessageBody::Text {
            content: required(raw, "Content")?,
        },
        "image" => MessageBody::Image {
            pic_url: required(raw, "PicUrl")?,
            media_id: required(raw, "MediaId")?,
        },
        "voice" => MessageBody::Voice {
            media_id: required(raw, "MediaId")?,
            format: element_text(raw, "Format"),
            recognition: element_text(raw, "Recognition").filter(|r| !r.is_empty()),
        },
        "video" | "shortvideo" => MessageBody::Video {
            media_id: required(raw, "MediaId")?,
            thumb_media_id: required(raw, "ThumbMediaId")?,
            short: msg_type == "shortvideo",
        },
        "location" => MessageBody::Location {
            location_x: required(raw, "Location_X")?,
            location_y: required(raw, "Location_Y")?,
            scale: required(raw, "Scale")?,
            label: required(raw, "Label")?,
        },
        "link" => MessageBody::Link {
            title: required(raw, "Title")?,
            description: required(raw, "Description")?,
            url: required(raw, "Url")?,
        },
        "event" => {
            // Events never carry a MsgId, even if a proxy injects one.
            return Ok(WechatMessage {
                from_user,
                to_user,
                create_time,
                msg_id: None,
                body: MessageBody::Event {
                    event: required(raw, "Event")?,
                    event_key: element_text(raw, "EventKey"),
                },
            });
        }
        other => {
            tracing::warn!(msg_type = %other, "Unknown message type");
            MessageBody::Unknown {
                msg_type: other.to_string(),
            }
        }
    };

    Ok(WechatMessage {
        from_user,
        to_user,
        create_time,
        msg_id,
        body,
    })
}

/// Text of the first `<tag>` element in `xml`, with CDATA unwrapped and
/// entities decoded. `None` if the element is absent.
#[must_use]
pub fn element_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let rest = &xml[start..];

    if let Some(cdata) = rest.trim_start().strip_prefix("<![CDATA[") {
        let end = cdata.find("]]>")?;
        let after = cdata[end + 3..].trim_start();
        return after.starts_with(&close).then(|| cdata[..end].to_string());
    }

    let end = rest.find(&close)?;
    Some(unescape(rest[..end].trim()))
}

fn required(xml: &str, tag: &'static str) -> Result<String, ParseError> {
    element_text(xml, tag).ok_or(ParseError::MissingElement(tag))
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
