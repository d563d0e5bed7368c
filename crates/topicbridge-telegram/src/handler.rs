// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update filtering and conversion into bridge events.
//!
//! Only messages posted inside a topic of the configured forum by an
//! authorized human member are turned into [`SecondaryMessage`]s.

use teloxide::types::{CallbackQuery as TgCallbackQuery, Message};
use topicbridge_core::types::{CallbackQuery, SecondaryMessage};

use crate::media;

/// Checks whether the message sender is authorized.
///
/// Authorization passes if the sender's user ID (as string) or username
/// matches any entry in `allowed_users`. An empty list admits every member
/// of the forum. Messages without a sender and messages from bots are
/// always rejected.
pub fn is_authorized(msg: &Message, allowed_users: &[String]) -> bool {
    let user = match msg.from.as_ref() {
        Some(u) if !u.is_bot => u,
        _ => return false,
    };

    if allowed_users.is_empty() {
        return true;
    }

    let user_id_str = user.id.0.to_string();
    allowed_users.iter().any(|allowed| {
        if *allowed == user_id_str {
            return true;
        }
        // Match by username (with or without @ prefix)
        let allowed_clean = allowed.strip_prefix('@').unwrap_or(allowed);
        user.username
            .as_deref()
            .is_some_and(|username| username.eq_ignore_ascii_case(allowed_clean))
    })
}

/// Checks whether the message was posted inside a topic of the bridged forum.
pub fn is_forum_topic_message(msg: &Message, forum_chat_id: i64) -> bool {
    msg.chat.id.0 == forum_chat_id && msg.is_topic_message && msg.thread_id.is_some()
}

/// Converts a Telegram message into a [`SecondaryMessage`].
///
/// Returns `None` for service messages and unsupported content (locations,
/// polls, contacts).
pub fn to_secondary_message(msg: &Message) -> Option<SecondaryMessage> {
    let body = media::extract_body(msg)?;
    let thread_id = msg.thread_id.map(|t| i64::from(t.0.0));

    // Inside a topic, a message that is not an explicit reply still points
    // at the topic's root message.
    let reply_to_message_id = msg
        .reply_to_message()
        .map(|r| i64::from(r.id.0))
        .filter(|id| Some(*id) != thread_id);

    let (sender_id, sender_name) = match msg.from.as_ref() {
        Some(user) => (user.id.0 as i64, user.full_name()),
        None => (0, "unknown".to_string()),
    };

    Some(SecondaryMessage {
        chat_id: msg.chat.id.0,
        thread_id,
        message_id: i64::from(msg.id.0),
        sender_id,
        sender_name,
        timestamp: msg.date,
        body,
        reply_to_message_id,
    })
}

/// Converts an inline-button press into a [`CallbackQuery`].
pub fn to_callback(query: &TgCallbackQuery) -> CallbackQuery {
    CallbackQuery {
        id: query.id.to_string(),
        chat_id: query.message.as_ref().map(|m| m.chat().id.0),
        sender_id: query.from.id.0 as i64,
        data: query.data.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topicbridge_core::types::{MediaKind, MessageBody};

    const FORUM: i64 = -1001234;

    fn user(user_id: u64, username: Option<&str>, is_bot: bool) -> serde_json::Value {
        let mut from = serde_json::json!({
            "id": user_id,
            "is_bot": is_bot,
            "first_name": "Test",
            "last_name": "User",
        });
        if let Some(uname) = username {
            from["username"] = uname.into();
        }
        from
    }

    /// Build a forum topic message from JSON, matching Telegram Bot API structure.
    fn forum_message(extra: serde_json::Value) -> Message {
        let mut json = serde_json::json!({
            "message_id": 57,
            "message_thread_id": 100,
            "is_topic_message": true,
            "date": 1700000000i64,
            "chat": {
                "id": FORUM,
                "type": "supergroup",
                "title": "Bridge",
                "is_forum": true,
            },
            "from": user(12345, Some("testuser"), false),
            "reply_to_message": {
                "message_id": 100,
                "message_thread_id": 100,
                "date": 1699990000i64,
                "chat": {
                    "id": FORUM,
                    "type": "supergroup",
                    "title": "Bridge",
                    "is_forum": true,
                },
                "forum_topic_created": {
                    "name": "Alice",
                    "icon_color": 7322096,
                },
            },
        });
        if let (Some(target), Some(extra)) = (json.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(json).expect("failed to deserialize mock message")
    }

    fn text_message(text: &str) -> Message {
        forum_message(serde_json::json!({ "text": text }))
    }

    #[test]
    fn authorized_by_user_id() {
        let msg = text_message("hello");
        assert!(is_authorized(&msg, &["12345".into()]));
    }

    #[test]
    fn authorized_by_username_with_at() {
        let msg = text_message("hello");
        assert!(is_authorized(&msg, &["@TestUser".into()]));
    }

    #[test]
    fn empty_list_admits_every_member() {
        let msg = text_message("hello");
        assert!(is_authorized(&msg, &[]));
    }

    #[test]
    fn not_authorized_wrong_user() {
        let msg = text_message("hello");
        assert!(!is_authorized(&msg, &["99999".into()]));
    }

    #[test]
    fn bots_are_never_authorized() {
        let msg = forum_message(serde_json::json!({
            "text": "echo",
            "from": user(777, Some("bridgebot"), true),
        }));
        assert!(!is_authorized(&msg, &[]));
    }

    #[test]
    fn topic_messages_in_the_forum_pass() {
        let msg = text_message("hello");
        assert!(is_forum_topic_message(&msg, FORUM));
        assert!(!is_forum_topic_message(&msg, -1009999));
    }

    #[test]
    fn general_topic_messages_are_filtered() {
        let msg = forum_message(serde_json::json!({
            "text": "general",
            "message_thread_id": null,
            "is_topic_message": false,
            "reply_to_message": null,
        }));
        assert!(!is_forum_topic_message(&msg, FORUM));
    }

    #[test]
    fn text_message_maps_fields() {
        let msg = text_message("hello");
        let converted = to_secondary_message(&msg).unwrap();

        assert_eq!(converted.chat_id, FORUM);
        assert_eq!(converted.thread_id, Some(100));
        assert_eq!(converted.message_id, 57);
        assert_eq!(converted.sender_id, 12345);
        assert_eq!(converted.sender_name, "Test User");
        assert_eq!(converted.body, MessageBody::Text { text: "hello".into() });
        // The topic root is not an explicit reply.
        assert_eq!(converted.reply_to_message_id, None);
    }

    #[test]
    fn explicit_replies_are_kept() {
        let msg = forum_message(serde_json::json!({
            "text": "agreed",
            "reply_to_message": {
                "message_id": 55,
                "message_thread_id": 100,
                "is_topic_message": true,
                "date": 1699999999i64,
                "chat": {
                    "id": FORUM,
                    "type": "supergroup",
                    "title": "Bridge",
                    "is_forum": true,
                },
                "text": "earlier",
            },
        }));
        assert_eq!(to_secondary_message(&msg).unwrap().reply_to_message_id, Some(55));
    }

    #[test]
    fn photo_message_becomes_image_descriptor() {
        let msg = forum_message(serde_json::json!({
            "caption": "look",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90, "file_size": 100 },
                { "file_id": "large", "file_unique_id": "l", "width": 800, "height": 800, "file_size": 9000 },
            ],
        }));
        let converted = to_secondary_message(&msg).unwrap();
        let MessageBody::Media {
            descriptor,
            caption,
        } = converted.body
        else {
            panic!("expected media body");
        };
        assert_eq!(descriptor.kind, MediaKind::Image);
        assert_eq!(descriptor.source_id, "large");
        assert_eq!(caption.as_deref(), Some("look"));
    }
}
