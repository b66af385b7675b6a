//! Passive reply rendering.

use chrono::{DateTime, Utc};

use crate::message::WechatMessage;

/// Render a passive text reply to `message`.
///
/// Sender and recipient are swapped relative to the inbound message.
#[must_use]
pub fn format_reply(message: &WechatMessage, content: &str, now: DateTime<Utc>) -> String {
    format_text_reply(&message.from_user, &message.to_user, content, now)
}

/// Render a passive text reply addressed to `to_user` from `from_account`.
#[must_use]
pub fn format_text_reply(
    to_user: &str,
    from_account: &str,
    content: &str,
    now: DateTime<Utc>,
) -> String {
    format!(
        "<xml>\n\
         <ToUserName>{}</ToUserName>\n\
         <FromUserName>{}</FromUserName>\n\
         <CreateTime>{}</CreateTime>\n\
         <MsgType><![CDATA[text]]></MsgType>\n\
         <Content>{}</Content>\n\
         </xml>",
        cdata(to_user),
        cdata(from_account),
        now.timestamp(),
        cdata(content),
    )
}

/// Wrap `text` in a CDATA section. A literal `]]>` is split across two sections.
#[must_use]
pub fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::MessageBody;
    use crate::parser::element_text;

    fn inbound() -> WechatMessage {
        WechatMessage {
            from_user: "o_user".into(),
            to_user: "gh_account".into(),
            create_time: 1,
            msg_id: Some("1".into()),
            body: MessageBody::Text {
                content: "hi".into(),
            },
        }
    }

    #[test]
    fn reply_swaps_addresses() {
        let now = DateTime::from_timestamp(1_700_000_123, 0).unwrap();
        let xml = format_reply(&inbound(), "hello", now);

        assert_eq!(element_text(&xml, "ToUserName").as_deref(), Some("o_user"));
        assert_eq!(element_text(&xml, "FromUserName").as_deref(), Some("gh_account"));
        assert_eq!(element_text(&xml, "CreateTime").as_deref(), Some("1700000123"));
        assert_eq!(element_text(&xml, "MsgType").as_deref(), Some("text"));
        assert_eq!(element_text(&xml, "Content").as_deref(), Some("hello"));
    }

    #[test]
    fn cdata_terminator_is_split() {
        assert_eq!(cdata("a]]>b"), "<![CDATA[a]]]]><![CDATA[>b]]>");
    }
}
