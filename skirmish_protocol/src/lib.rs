// skirmish_protocol — wire protocol for session hosting.
//
// This crate defines the message types, framing, and serialization used by
// the session host (`skirmish_net`) and game clients to communicate over
// TCP. It is shared between both sides and depends on `skirmish_core` only
// for the replicated payload types.
//
// Module overview:
// - `types.rs`:    Connection-scoped IDs — `PeerId` — and `PROTOCOL_VERSION`.
// - `message.rs`:  Client-to-host and host-to-client message enums.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Matches the core's existing serde_json usage and
//   keeps payloads inspectable on the wire. Binary framing can be swapped in
//   later if bandwidth matters.
// - **Typed sync payloads.** Sync messages carry whole state slices rather
//   than deltas; applying one is an idempotent overwrite, which makes
//   periodic rebroadcast a safe convergence mechanism.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing,
//   compatible with both blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_frame, recv_message, send_message, write_frame};
pub use message::{ClientRequest, HostMessage};
pub use types::{PROTOCOL_VERSION, PeerId};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use skirmish_core::combat::Reaction;
    use skirmish_core::data::GameData;
    use skirmish_core::prng::GameRng;
    use skirmish_core::state::{CombatEntity, SessionState};
    use skirmish_core::types::{EntityId, LocationId, PlayerId, Position, StatId, TeamId};

    use super::*;

    /// Serialize a ClientRequest to JSON, frame it, read it back, deserialize.
    fn client_roundtrip(msg: &ClientRequest) {
        let mut wire = Vec::new();
        send_message(&mut wire, msg).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered: ClientRequest = recv_message(&mut cursor).unwrap();
        assert_eq!(&recovered, msg);
    }

    /// Serialize a HostMessage to JSON, frame it, read it back, deserialize.
    fn host_roundtrip(msg: &HostMessage) {
        let mut wire = Vec::new();
        send_message(&mut wire, msg).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered: HostMessage = recv_message(&mut cursor).unwrap();
        assert_eq!(&recovered, msg);
    }

    fn rng() -> GameRng {
        GameRng::new(7)
    }

    #[test]
    fn roundtrip_join_session() {
        client_roundtrip(&ClientRequest::JoinSession {
            protocol_version: PROTOCOL_VERSION,
            player_name: "Wren".into(),
            data_hash: Some(0xCAFE_BABE),
        });
    }

    #[test]
    fn roundtrip_join_session_no_cache() {
        client_roundtrip(&ClientRequest::JoinSession {
            protocol_version: PROTOCOL_VERSION,
            player_name: "Wren".into(),
            data_hash: None,
        });
    }

    #[test]
    fn roundtrip_request_action() {
        let mut rng = rng();
        client_roundtrip(&ClientRequest::RequestAction {
            location: LocationId::new("keep"),
            source: EntityId::new(&mut rng),
            target: EntityId::new(&mut rng),
            stat: StatId::new("attack"),
        });
    }

    #[test]
    fn roundtrip_request_sub_action() {
        let mut rng = rng();
        client_roundtrip(&ClientRequest::RequestSubAction {
            location: LocationId::new("keep"),
            actor: EntityId::new(&mut rng),
            reaction: Reaction::Cover {
                ally: EntityId::new(&mut rng),
            },
        });
    }

    #[test]
    fn roundtrip_request_move_entity() {
        let mut rng = rng();
        client_roundtrip(&ClientRequest::RequestMoveEntity {
            entity: EntityId::new(&mut rng),
            position: Position::new(3.5, 8.25),
        });
    }

    #[test]
    fn roundtrip_request_entity_update() {
        let mut rng = rng();
        let entity = CombatEntity::with_defaults(
            &mut rng,
            &GameData::demo(),
            "Wren",
            TeamId(1),
            LocationId::new("keep"),
        );
        client_roundtrip(&ClientRequest::RequestEntityUpdate { entity });
    }

    #[test]
    fn roundtrip_request_add_entity() {
        client_roundtrip(&ClientRequest::RequestAddEntity {
            name: "Bandit".into(),
            team: TeamId(2),
            location: LocationId::new("woods"),
        });
    }

    #[test]
    fn roundtrip_request_chat() {
        client_roundtrip(&ClientRequest::RequestChat {
            text: "ready when you are".into(),
        });
    }

    #[test]
    fn roundtrip_leave() {
        client_roundtrip(&ClientRequest::Leave);
    }

    #[test]
    fn roundtrip_welcome() {
        let mut rng = rng();
        host_roundtrip(&HostMessage::Welcome {
            peer_id: PeerId(3),
            player_id: PlayerId::new(&mut rng),
            session_name: "thursday-skirmish".into(),
        });
    }

    #[test]
    fn roundtrip_rejected() {
        host_roundtrip(&HostMessage::Rejected {
            reason: "protocol version mismatch".into(),
        });
    }

    #[test]
    fn roundtrip_sync_state() {
        let mut state = SessionState::default();
        state
            .globals
            .insert("weather".into(), "rain".into());
        host_roundtrip(&HostMessage::SyncState { state });
    }

    #[test]
    fn roundtrip_sync_game_data() {
        host_roundtrip(&HostMessage::SyncGameData {
            data: GameData::demo(),
        });
    }

    #[test]
    fn roundtrip_sync_combat_state_cleared() {
        host_roundtrip(&HostMessage::SyncCombatState {
            location: LocationId::new("keep"),
            session: None,
        });
    }

    #[test]
    fn roundtrip_on_move_entity() {
        let mut rng = rng();
        host_roundtrip(&HostMessage::OnMoveEntity {
            entity: EntityId::new(&mut rng),
            position: Position::new(0.0, 19.5),
        });
    }

    #[test]
    fn roundtrip_admin_announcement() {
        host_roundtrip(&HostMessage::AdminAnnouncement {
            text: "session pausing in five minutes".into(),
        });
    }

    #[test]
    fn roundtrip_change_map() {
        host_roundtrip(&HostMessage::ChangeMap {
            location: LocationId::new("woods"),
        });
    }

    #[test]
    fn roundtrip_action_rejected() {
        host_roundtrip(&HostMessage::ActionRejected {
            reason: "not your turn".into(),
        });
    }

    #[test]
    fn roundtrip_player_left() {
        let mut rng = rng();
        host_roundtrip(&HostMessage::PlayerLeft {
            player_id: PlayerId::new(&mut rng),
            name: "Wren".into(),
        });
    }
}
