//! Frame dispatcher.
//!
//! A single routing point from inbound frames to the owning service, with a
//! uniform `(context, frame) -> Result<Option<reply>, error>` shape. The
//! optional reply and any error go only to the originating connection; every
//! other delivery happens inside the services through the registry. The
//! concurrency model (one task per connection) is a detail of `socket.rs`
//! and never leaks in here.

use uuid::Uuid;

use crate::backend::error::GatewayError;
use crate::backend::server::state::AppState;
use crate::shared::{ClientFrame, Identity, ServerEvent};

/// Per-connection context handed to every dispatched frame.
#[derive(Debug, Clone)]
pub struct ConnContext {
    /// The connection handle this frame arrived on.
    pub conn_id: Uuid,
    /// The authenticated owner of the connection.
    pub identity: Identity,
}

/// Route one authenticated frame to its owning service.
///
/// Returns the reply event for the originating connection, if the operation
/// has one.
pub async fn dispatch(
    state: &AppState,
    ctx: &ConnContext,
    frame: ClientFrame,
) -> Result<Option<ServerEvent>, GatewayError> {
    let user_id = ctx.identity.id;
    let origin = Some(ctx.conn_id);

    match frame {
        // The socket layer consumes the first `connect`; a second one on a
        // live connection is a protocol violation.
        ClientFrame::Connect { .. } => Err(GatewayError::invalid_argument(
            "connection is already authenticated",
        )),

        ClientFrame::DmSend {
            conversation_id,
            content,
            media,
        } => {
            let message = state
                .messaging
                .send_message(conversation_id, user_id, content, media, origin)
                .await?;
            Ok(Some(ServerEvent::DmMessageNew { message }))
        }

        ClientFrame::DmTypingStart { conversation_id } => {
            state.messaging.typing(conversation_id, user_id, true).await?;
            Ok(None)
        }

        ClientFrame::DmTypingStop { conversation_id } => {
            state
                .messaging
                .typing(conversation_id, user_id, false)
                .await?;
            Ok(None)
        }

        ClientFrame::DmRead { conversation_id } => {
            state.messaging.mark_read(conversation_id, user_id).await?;
            Ok(None)
        }

        ClientFrame::DmDelete { message_id } => {
            let message = state
                .messaging
                .delete_message(message_id, user_id, origin)
                .await?;
            Ok(Some(ServerEvent::DmMessageDeleted {
                conversation_id: message.conversation_id,
                message_id: message.id,
            }))
        }

        ClientFrame::RoomJoin { group_id } => {
            let roster = state.rooms.join_room(group_id, &ctx.identity).await?;
            Ok(Some(ServerEvent::RoomJoined { group_id, roster }))
        }

        ClientFrame::RoomLeave { group_id } => {
            state.rooms.leave_room(group_id, user_id).await;
            Ok(None)
        }

        ClientFrame::RoomMessageSend { group_id, content } => {
            let message = state
                .rooms
                .send_message(group_id, user_id, content, origin)
                .await?;
            Ok(Some(ServerEvent::RoomMessageNew { message }))
        }

        ClientFrame::RoomTypingStart { group_id } => {
            state.rooms.typing(group_id, user_id, true).await?;
            Ok(None)
        }

        ClientFrame::RoomTypingStop { group_id } => {
            state.rooms.typing(group_id, user_id, false).await?;
            Ok(None)
        }

        ClientFrame::RoomMessageDelete {
            group_id,
            message_id,
        } => {
            state
                .rooms
                .delete_message(group_id, message_id, &ctx.identity, origin)
                .await?;
            Ok(Some(ServerEvent::RoomMessageDeleted {
                group_id,
                message_id,
            }))
        }

        ClientFrame::RoomHistory {
            group_id,
            before,
            limit,
        } => {
            let messages = state
                .rooms
                .history(group_id, user_id, before, limit)
                .await?;
            Ok(Some(ServerEvent::RoomHistory { group_id, messages }))
        }

        ClientFrame::CallInitiate { to } => {
            state.calls.initiate(&ctx.identity, to).await?;
            Ok(None)
        }

        ClientFrame::CallAccept { to } => {
            state.calls.accept(user_id, to).await;
            Ok(None)
        }

        ClientFrame::CallReject { to, reason } => {
            state.calls.reject(user_id, to, reason).await;
            Ok(None)
        }

        ClientFrame::CallEnd { to } => {
            state.calls.end(user_id, to).await;
            Ok(None)
        }

        ClientFrame::CallOffer { to, sdp } => {
            state.calls.offer(user_id, to, sdp).await;
            Ok(None)
        }

        ClientFrame::CallAnswer { to, sdp } => {
            state.calls.answer(user_id, to, sdp).await;
            Ok(None)
        }

        ClientFrame::CallIceCandidate { to, candidate } => {
            state.calls.ice_candidate(user_id, to, candidate).await;
            Ok(None)
        }

        ClientFrame::PresenceList => Ok(Some(ServerEvent::PresenceSnapshot {
            online: state.registry.list_online().await,
        })),
    }
}
