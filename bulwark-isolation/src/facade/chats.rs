//! Chat rooms and their messages.
//!
//! Rooms are shared resources. Every message operation validates room
//! membership before the `messages` sub-collection is touched.

use super::{decode_all, new_id, timestamp};
use crate::IsolationLayer;
use bulwark_core::document::Document;
use bulwark_core::error::Result;
use bulwark_core::principal::Uid;
use bulwark_core::query::Query;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Chat room collection.
pub const CHAT_ROOMS_COLLECTION: &str = "chat_rooms";

/// Message sub-collection under each room.
pub const MESSAGES_COLLECTION: &str = "messages";

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    /// Document id.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Principals allowed into the room.
    pub participants: Vec<String>,
    /// Principal that opened the room.
    #[serde(default)]
    pub created_by: String,
    /// Creation time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A message posted to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Document id.
    #[serde(default)]
    pub id: String,
    /// Principal that posted the message.
    pub sender_id: String,
    /// Message body.
    pub text: String,
    /// Post time, RFC 3339.
    pub created_at: String,
}

/// Chat operations for one layer.
#[derive(Debug, Clone, Copy)]
pub struct Chats<'a> {
    pub(super) layer: &'a IsolationLayer,
}

impl Chats<'_> {
    /// Creates a room. The creator is always a participant.
    #[instrument(skip(self, uid, others), fields(uid = %uid))]
    pub async fn create_room(
        &self,
        uid: &Uid,
        name: Option<&str>,
        others: &[Uid],
    ) -> Result<ChatRoom> {
        let room = ChatRoom {
            id: new_id(),
            name: name.map(str::to_string),
            participants: others.iter().map(Uid::to_string).collect(),
            created_by: uid.to_string(),
            created_at: None,
        };
        let room: ChatRoom = self
            .layer
            .create_shared_document(
                CHAT_ROOMS_COLLECTION,
                &room.id,
                uid,
                Document::encode(&room)?,
                None,
            )
            .await?
            .decode()?;
        info!(room_id = %room.id, participants = room.participants.len(), "Chat room created");
        Ok(room)
    }

    /// Lists the rooms `uid` participates in.
    pub async fn list_rooms(&self, uid: &Uid) -> Result<Vec<ChatRoom>> {
        let documents = self
            .layer
            .list_participant_documents(CHAT_ROOMS_COLLECTION, uid, None)
            .await?;
        decode_all(&documents)
    }

    /// Fetches a room `uid` participates in.
    pub async fn get_room(&self, room_id: &str, uid: &Uid) -> Result<ChatRoom> {
        self.layer
            .validate_chat_access(room_id, uid)
            .await?
            .decode()
    }

    /// Posts a message to a room after validating membership.
    #[instrument(skip(self, uid, text), fields(uid = %uid))]
    pub async fn send_message(&self, room_id: &str, uid: &Uid, text: &str) -> Result<Message> {
        let room = self.layer.validate_chat_access(room_id, uid).await?;
        let messages = room.path().child_collection(MESSAGES_COLLECTION)?;

        let mut message = Message {
            id: String::new(),
            sender_id: uid.to_string(),
            text: text.to_string(),
            created_at: timestamp(),
        };
        message.id = self
            .layer
            .store()
            .add(&messages, Document::encode(&message)?)
            .await?;
        debug!(room_id, message_id = %message.id, "Message sent");
        Ok(message)
    }

    /// Returns a room's messages, oldest first, after validating membership.
    pub async fn get_messages(&self, room_id: &str, uid: &Uid) -> Result<Vec<Message>> {
        let room = self.layer.validate_chat_access(room_id, uid).await?;
        let messages = room.path().child_collection(MESSAGES_COLLECTION)?;
        let documents = self.layer.store().query(&Query::collection(messages)).await?;
        let mut messages: Vec<Message> = decode_all(&documents)?;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::error::ErrorKind;
    use bulwark_core::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn uid(raw: &str) -> Uid {
        Uid::parse(Some(raw)).unwrap()
    }

    fn fixture() -> (Arc<MemoryStore>, IsolationLayer) {
        let store = Arc::new(
            MemoryStore::from_fixture(&json!({
                "chat_rooms/room1": { "participants": ["alice", "bob"], "createdBy": "alice" },
                "chat_rooms/room2": { "participants": ["bob", "carol"], "createdBy": "bob" },
                "chat_rooms/room1/messages/m1": {
                    "senderId": "bob", "text": "second", "createdAt": "2024-01-02T00:00:00.000Z"
                },
                "chat_rooms/room1/messages/m0": {
                    "senderId": "alice", "text": "first", "createdAt": "2024-01-01T00:00:00.000Z"
                },
            }))
            .unwrap(),
        );
        (store.clone(), IsolationLayer::with_defaults(store))
    }

    #[tokio::test]
    async fn test_create_room_includes_creator() {
        let (_, layer) = fixture();
        let room = layer
            .chats()
            .create_room(&uid("alice"), Some("deal desk"), &[uid("bob")])
            .await
            .unwrap();
        assert_eq!(room.participants, ["alice", "bob"]);
        assert!(room.created_at.is_some());

        let fetched = layer.chats().get_room(&room.id, &uid("bob")).await.unwrap();
        assert_eq!(fetched.name.as_deref(), Some("deal desk"));
        assert_eq!(fetched.created_by, "alice");
    }

    #[tokio::test]
    async fn test_list_rooms() {
        let (_, layer) = fixture();
        let rooms = layer.chats().list_rooms(&uid("alice")).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "room1");
        assert_eq!(layer.chats().list_rooms(&uid("bob")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_messages_require_membership() {
        let (store, layer) = fixture();
        let messages = layer.chats().get_messages("room1", &uid("alice")).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);

        let err = layer
            .chats()
            .get_messages("room1", &uid("carol"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotParticipant);

        let err = layer
            .chats()
            .send_message("room1", &uid("carol"), "let me in")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotParticipant);
        assert_eq!(store.collection_len("chat_rooms/room1/messages"), 2);
        assert_eq!(store.collection_len("security_logs"), 2);
    }

    #[tokio::test]
    async fn test_send_message() {
        let (store, layer) = fixture();
        let message = layer
            .chats()
            .send_message("room1", &uid("bob"), "hello")
            .await
            .unwrap();
        assert_eq!(message.sender_id, "bob");
        assert!(!message.id.is_empty());
        assert_eq!(store.collection_len("chat_rooms/room1/messages"), 3);
    }
}
