// Wire frames and naming conventions for the club realtime backend

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Topic carrying messages addressed to the connected user
pub const USER_QUEUE_TOPIC: &str = "/user/queue/messages";

/// Prefix shared by all room topics
pub const ROOM_TOPIC_PREFIX: &str = "/topic/room/";

/// Header carrying the sender identity
pub const USER_ID_HEADER: &str = "user-id";

/// Header carrying the client-side send timestamp (RFC 3339)
pub const SENT_AT_HEADER: &str = "sent-at";

/// Topic for inbound messages of a room
pub fn room_topic(room_id: &str) -> String {
    format!("{}{}", ROOM_TOPIC_PREFIX, room_id)
}

/// Backend destination handling sends into a room
pub fn room_destination(room_id: &str) -> String {
    format!("/app/room/{}/send", room_id)
}

/// True for topics created by the room naming convention
pub fn is_room_topic(topic: &str) -> bool {
    topic.starts_with(ROOM_TOPIC_PREFIX)
}

/// Client → Server frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "subscribe")]
    Subscribe { id: String, topic: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { id: String },
    #[serde(rename = "send")]
    Send {
        destination: String,
        headers: HashMap<String, String>,
        body: String,
    },
}

/// Server → Client frames
///
/// The body is the raw JSON text of the application payload; parsing is
/// left to the subscription dispatch so a malformed payload can be dropped
/// without tearing down the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "message")]
    Message { topic: String, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_naming_convention() {
        assert_eq!(room_topic("7"), "/topic/room/7");
        assert_eq!(room_destination("7"), "/app/room/7/send");
        assert!(is_room_topic("/topic/room/7"));
        assert!(!is_room_topic(USER_QUEUE_TOPIC));
    }

    #[test]
    fn test_client_frame_tagged_encoding() {
        let frame = ClientFrame::Subscribe {
            id: "sub-1".to_string(),
            topic: "/topic/room/7".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"subscribe""#));
        assert!(json.contains(r#""topic":"/topic/room/7""#));
    }

    #[test]
    fn test_server_frame_decoding() {
        let json = r#"{"type":"message","topic":"/user/queue/messages","body":"{\"a\":1}"}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        let ServerFrame::Message { topic, body } = frame;
        assert_eq!(topic, USER_QUEUE_TOPIC);
        assert_eq!(body, r#"{"a":1}"#);
    }
}
