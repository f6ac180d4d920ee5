//! Wire protocol frames.
//!
//! Every WebSocket message is a JSON object of the form
//! `{ "event": "<name>", "data": { ... } }`. Inbound frames deserialize into
//! [`ClientFrame`], outbound events serialize from [`ServerEvent`]; the
//! `event`/`data` envelope is expressed with serde's adjacent tagging so the
//! enum variant names never leak onto the wire.
//!
//! Event names use `scope:action` form (`dm:send`, `room:message:send`,
//! `call:ice-candidate`). Outbound names mirror inbound ones with `:new`,
//! `:deleted`, `:online`, `:offline`, `:incoming`, `:accepted`, `:rejected`
//! and `:ended` suffixes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::Identity;
use super::messaging::{DirectMessage, MediaAttachment};
use super::rooms::{GroupMembership, GroupMessage};

/// A frame sent by a client to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    /// First frame on every connection: authenticate with a session token.
    #[serde(rename = "connect")]
    Connect { token: String },

    /// Send a direct message into an existing conversation.
    #[serde(rename = "dm:send")]
    DmSend {
        conversation_id: Uuid,
        content: String,
        #[serde(default)]
        media: Vec<MediaAttachment>,
    },

    #[serde(rename = "dm:typing:start")]
    DmTypingStart { conversation_id: Uuid },

    #[serde(rename = "dm:typing:stop")]
    DmTypingStop { conversation_id: Uuid },

    /// Mark every unread message from the other participant as read.
    #[serde(rename = "dm:read")]
    DmRead { conversation_id: Uuid },

    /// Delete one of the caller's own messages.
    #[serde(rename = "dm:delete")]
    DmDelete { message_id: Uuid },

    /// Join a group room's live channel.
    #[serde(rename = "room:join")]
    RoomJoin { group_id: Uuid },

    #[serde(rename = "room:leave")]
    RoomLeave { group_id: Uuid },

    #[serde(rename = "room:message:send")]
    RoomMessageSend { group_id: Uuid, content: String },

    #[serde(rename = "room:typing:start")]
    RoomTypingStart { group_id: Uuid },

    #[serde(rename = "room:typing:stop")]
    RoomTypingStop { group_id: Uuid },

    #[serde(rename = "room:message:delete")]
    RoomMessageDelete { group_id: Uuid, message_id: Uuid },

    /// Fetch a page of persisted room history (newest page when no cursor).
    #[serde(rename = "room:history")]
    RoomHistory {
        group_id: Uuid,
        before: Option<Uuid>,
        limit: Option<u32>,
    },

    /// Ring another user. Fails with `target_offline` when the callee has
    /// no live connection.
    #[serde(rename = "call:initiate")]
    CallInitiate { to: Uuid },

    #[serde(rename = "call:accept")]
    CallAccept { to: Uuid },

    #[serde(rename = "call:reject")]
    CallReject { to: Uuid, reason: Option<String> },

    #[serde(rename = "call:end")]
    CallEnd { to: Uuid },

    /// WebRTC SDP offer, relayed verbatim to the peer.
    #[serde(rename = "call:offer")]
    CallOffer { to: Uuid, sdp: String },

    /// WebRTC SDP answer, relayed verbatim to the peer.
    #[serde(rename = "call:answer")]
    CallAnswer { to: Uuid, sdp: String },

    /// ICE candidate, relayed verbatim to the peer.
    #[serde(rename = "call:ice-candidate")]
    CallIceCandidate { to: Uuid, candidate: serde_json::Value },

    /// Ask for the set of currently online users.
    #[serde(rename = "presence:list")]
    PresenceList,
}

impl ClientFrame {
    /// The wire name of this frame, used in error replies and logs.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientFrame::Connect { .. } => "connect",
            ClientFrame::DmSend { .. } => "dm:send",
            ClientFrame::DmTypingStart { .. } => "dm:typing:start",
            ClientFrame::DmTypingStop { .. } => "dm:typing:stop",
            ClientFrame::DmRead { .. } => "dm:read",
            ClientFrame::DmDelete { .. } => "dm:delete",
            ClientFrame::RoomJoin { .. } => "room:join",
            ClientFrame::RoomLeave { .. } => "room:leave",
            ClientFrame::RoomMessageSend { .. } => "room:message:send",
            ClientFrame::RoomTypingStart { .. } => "room:typing:start",
            ClientFrame::RoomTypingStop { .. } => "room:typing:stop",
            ClientFrame::RoomMessageDelete { .. } => "room:message:delete",
            ClientFrame::RoomHistory { .. } => "room:history",
            ClientFrame::CallInitiate { .. } => "call:initiate",
            ClientFrame::CallAccept { .. } => "call:accept",
            ClientFrame::CallReject { .. } => "call:reject",
            ClientFrame::CallEnd { .. } => "call:end",
            ClientFrame::CallOffer { .. } => "call:offer",
            ClientFrame::CallAnswer { .. } => "call:answer",
            ClientFrame::CallIceCandidate { .. } => "call:ice-candidate",
            ClientFrame::PresenceList => "presence:list",
        }
    }
}

/// An event pushed from the gateway to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Authentication succeeded; carries the caller's identity and the
    /// current presence snapshot.
    #[serde(rename = "connect:ok")]
    ConnectOk {
        identity: Identity,
        online: Vec<Identity>,
    },

    /// Structured error result for a failed action. Sent only to the
    /// originating connection; other participants never observe it.
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },

    #[serde(rename = "identity:online")]
    IdentityOnline { identity: Identity },

    #[serde(rename = "identity:offline")]
    IdentityOffline { user_id: Uuid },

    #[serde(rename = "presence:list")]
    PresenceSnapshot { online: Vec<Identity> },

    #[serde(rename = "dm:message:new")]
    DmMessageNew { message: DirectMessage },

    #[serde(rename = "dm:message:deleted")]
    DmMessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    /// The other participant read the caller's messages.
    #[serde(rename = "dm:read")]
    DmRead {
        conversation_id: Uuid,
        reader_id: Uuid,
    },

    #[serde(rename = "dm:typing")]
    DmTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        typing: bool,
    },

    /// Reply to `room:join`: the live roster at the moment of joining.
    #[serde(rename = "room:joined")]
    RoomJoined {
        group_id: Uuid,
        roster: Vec<Identity>,
    },

    #[serde(rename = "room:user:online")]
    RoomUserOnline { group_id: Uuid, identity: Identity },

    #[serde(rename = "room:user:offline")]
    RoomUserOffline { group_id: Uuid, user_id: Uuid },

    #[serde(rename = "room:message:new")]
    RoomMessageNew { message: GroupMessage },

    #[serde(rename = "room:message:deleted")]
    RoomMessageDeleted {
        group_id: Uuid,
        message_id: Uuid,
    },

    #[serde(rename = "room:typing")]
    RoomTyping {
        group_id: Uuid,
        user_id: Uuid,
        typing: bool,
    },

    #[serde(rename = "room:history")]
    RoomHistory {
        group_id: Uuid,
        messages: Vec<GroupMessage>,
    },

    /// Membership changed through the platform's HTTP layer.
    #[serde(rename = "room:member:joined")]
    RoomMemberJoined {
        group_id: Uuid,
        member: GroupMembership,
    },

    #[serde(rename = "room:member:left")]
    RoomMemberLeft { group_id: Uuid, user_id: Uuid },

    #[serde(rename = "call:incoming")]
    CallIncoming { from: Identity },

    #[serde(rename = "call:accepted")]
    CallAccepted { from: Uuid },

    #[serde(rename = "call:rejected")]
    CallRejected {
        from: Uuid,
        reason: Option<String>,
    },

    #[serde(rename = "call:ended")]
    CallEnded { from: Uuid },

    #[serde(rename = "call:offer")]
    CallOffer { from: Uuid, sdp: String },

    #[serde(rename = "call:answer")]
    CallAnswer { from: Uuid, sdp: String },

    #[serde(rename = "call:ice-candidate")]
    CallIceCandidate {
        from: Uuid,
        candidate: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn client_frame_uses_event_data_envelope() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"event":"dm:typing:start","data":{"conversation_id":"7f7c0d66-3a88-4cb5-9c5e-6a8b4c6c0a11"}}"#,
        )
        .unwrap();
        assert_eq!(frame.event_name(), "dm:typing:start");
    }

    #[test]
    fn connect_frame_round_trip() {
        let frame = ClientFrame::Connect {
            token: "abc.def.ghi".into(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""event":"connect""#));
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn unit_variant_needs_no_data() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"event":"presence:list"}"#).unwrap();
        assert_eq!(frame, ClientFrame::PresenceList);
    }

    #[test]
    fn server_event_names_mirror_inbound_scopes() {
        let event = ServerEvent::CallIceCandidate {
            from: Uuid::new_v4(),
            candidate: serde_json::json!({"candidate": "candidate:0 1 UDP ..."}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"call:ice-candidate""#));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = serde_json::from_str::<ClientFrame>(
            r#"{"event":"dm:unknown","data":{}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn error_event_omits_absent_frame_name() {
        let event = ServerEvent::Error {
            code: "forbidden".into(),
            message: "not a participant".into(),
            event: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains(r#""event":null"#));
    }
}
