// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update routing, authorization filtering, and content extraction.
//!
//! Decides whether a Telegram message or button press should reach the
//! conversation engine and converts it into a channel-agnostic
//! [`InboundMessage`].

use carbwise_core::error::CarbwiseError;
use carbwise_core::types::{ChatId, ExternalUserId, InboundMessage, MessageContent, UserProfile};
use teloxide::prelude::*;
use teloxide::types::{Chat, ChatKind, User};
use tracing::debug;

use crate::media;

/// Checks whether a Telegram user may talk to the bot.
///
/// Entries match the numeric user id or the username, with or without a
/// leading `@` and ignoring case. An empty list allows everyone.
pub fn is_authorized(user: &User, allowed_users: &[String]) -> bool {
    if allowed_users.is_empty() {
        return true;
    }

    let user_id = user.id.0.to_string();
    allowed_users.iter().any(|allowed| {
        *allowed == user_id
            || user.username.as_deref().is_some_and(|username| {
                username.eq_ignore_ascii_case(allowed.strip_prefix('@').unwrap_or(allowed))
            })
    })
}

/// Only private chats are served.
pub fn is_dm(chat: &Chat) -> bool {
    matches!(chat.kind, ChatKind::Private(_))
}

/// Splits `/name@bot rest` into `("name", "rest")`.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix('/')?;
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_lowercase(), args.trim().to_string()))
}

/// Extracts content from a Telegram message.
///
/// Handles commands, text and photos. Returns `None` for anything else
/// (stickers, voice, documents, locations).
pub async fn extract_content(
    bot: &Bot,
    msg: &Message,
) -> Result<Option<MessageContent>, CarbwiseError> {
    if let Some(text) = msg.text() {
        let content = match parse_command(text) {
            Some((name, args)) => MessageContent::Command { name, args },
            None => MessageContent::Text(text.to_string()),
        };
        return Ok(Some(content));
    }

    if let Some(photos) = msg.photo() {
        let content = media::extract_photo_content(bot, photos, msg.caption()).await?;
        return Ok(Some(content));
    }

    debug!(msg_id = msg.id.0, "ignoring unsupported message type");
    Ok(None)
}

fn profile(user: &User) -> UserProfile {
    UserProfile {
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|n| !n.is_empty()),
        last_name: user.last_name.clone(),
    }
}

/// Converts a Telegram message and its extracted content into an [`InboundMessage`].
///
/// Messages without a sender (channel posts) yield `None`.
pub fn to_inbound_message(msg: &Message, content: MessageContent) -> Option<InboundMessage> {
    let user = msg.from.as_ref()?;
    Some(InboundMessage {
        id: msg.id.0.to_string(),
        channel: "telegram".to_string(),
        sender: ExternalUserId(user.id.0 as i64),
        chat_id: ChatId(msg.chat.id.0),
        profile: profile(user),
        content,
        timestamp: msg.date.to_rfc3339(),
    })
}

/// Converts an inline-keyboard press into an [`InboundMessage`].
///
/// Presses on messages the bot can no longer see, or without payload, yield `None`.
pub fn callback_to_inbound(query: &CallbackQuery) -> Option<InboundMessage> {
    let data = query.data.clone()?;
    let message = query.message.as_ref()?;
    Some(InboundMessage {
        id: query.id.to_string(),
        channel: "telegram".to_string(),
        sender: ExternalUserId(query.from.id.0 as i64),
        chat_id: ChatId(message.chat().id.0),
        profile: profile(&query.from),
        content: MessageContent::Callback { data },
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_json(user_id: u64, username: Option<&str>) -> serde_json::Value {
        let mut user = serde_json::json!({
            "id": user_id,
            "is_bot": false,
            "first_name": "Test",
        });
        if let Some(name) = username {
            user["username"] = name.into();
        }
        user
    }

    fn make_private_message(user_id: u64, username: Option<&str>, text: &str) -> Message {
        let json = serde_json::json!({
            "message_id": 1,
            "date": 1700000000i64,
            "chat": { "id": user_id as i64, "type": "private", "first_name": "Test" },
            "from": user_json(user_id, username),
            "text": text,
        });
        serde_json::from_value(json).expect("failed to deserialize mock message")
    }

    fn make_group_message(user_id: u64, text: &str) -> Message {
        let json = serde_json::json!({
            "message_id": 1,
            "date": 1700000000i64,
            "chat": { "id": -100123i64, "type": "supergroup", "title": "Test Group" },
            "from": user_json(user_id, None),
            "text": text,
        });
        serde_json::from_value(json).expect("failed to deserialize mock group message")
    }

    fn make_callback(user_id: u64, data: Option<&str>) -> CallbackQuery {
        let mut json = serde_json::json!({
            "id": "cb-1",
            "from": user_json(user_id, None),
            "chat_instance": "ci",
            "message": {
                "message_id": 7,
                "date": 1700000000i64,
                "chat": { "id": user_id as i64, "type": "private", "first_name": "Test" },
                "text": "menu",
            },
        });
        if let Some(data) = data {
            json["data"] = data.into();
        }
        serde_json::from_value(json).expect("failed to deserialize mock callback")
    }

    fn sender(msg: &Message) -> &User {
        msg.from.as_ref().unwrap()
    }

    #[test]
    fn authorized_by_user_id_or_username() {
        let msg = make_private_message(12345, Some("TestUser"), "hi");
        assert!(is_authorized(sender(&msg), &["12345".into()]));
        assert!(is_authorized(sender(&msg), &["testuser".into()]));
        assert!(is_authorized(sender(&msg), &["@testuser".into()]));
        assert!(!is_authorized(sender(&msg), &["99999".into()]));
    }

    #[test]
    fn empty_allow_list_admits_everyone() {
        let msg = make_private_message(12345, None, "hi");
        assert!(is_authorized(sender(&msg), &[]));
    }

    #[test]
    fn only_private_chats_count_as_dm() {
        assert!(is_dm(&make_private_message(1, None, "hi").chat));
        assert!(!is_dm(&make_group_message(1, "hi").chat));
    }

    #[test]
    fn commands_are_split_from_arguments() {
        assert_eq!(parse_command("/start"), Some(("start".into(), String::new())));
        assert_eq!(
            parse_command("/correct@carbwise_bot 45 180"),
            Some(("correct".into(), "45 180".into()))
        );
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("150"), None);
    }

    #[test]
    fn to_inbound_message_maps_fields() {
        let msg = make_private_message(12345, Some("testuser"), "hello");
        let inbound = to_inbound_message(&msg, MessageContent::Text("hello".into())).unwrap();

        assert_eq!(inbound.id, "1");
        assert_eq!(inbound.channel, "telegram");
        assert_eq!(inbound.sender, ExternalUserId(12345));
        assert_eq!(inbound.chat_id, ChatId(12345));
        assert_eq!(inbound.profile.username.as_deref(), Some("testuser"));
        assert_eq!(inbound.profile.first_name.as_deref(), Some("Test"));
    }

    #[test]
    fn callback_carries_payload_and_chat() {
        let inbound = callback_to_inbound(&make_callback(555, Some("edit_ratio_3"))).unwrap();
        assert_eq!(inbound.sender, ExternalUserId(555));
        assert_eq!(inbound.chat_id, ChatId(555));
        assert_eq!(
            inbound.content,
            MessageContent::Callback {
                data: "edit_ratio_3".into()
            }
        );
        assert!(callback_to_inbound(&make_callback(555, None)).is_none());
    }

    #[tokio::test]
    async fn extract_command_and_text_content() {
        let bot = Bot::new("test:token");
        let command = make_private_message(1, None, "/history");
        assert_eq!(
            extract_content(&bot, &command).await.unwrap(),
            Some(MessageContent::Command {
                name: "history".into(),
                args: String::new()
            })
        );
        let text = make_private_message(1, None, "5,6");
        assert_eq!(
            extract_content(&bot, &text).await.unwrap(),
            Some(MessageContent::Text("5,6".into()))
        );
    }
}
